//! circaphase: circadian phase estimation from gene-expression matrices
//!
//! This crate fits a linear phase autoencoder to a gene-expression cohort:
//! the expression matrix is cleaned and standardized, SVD picks the genes
//! that carry the most structure, and a small autoencoder with a unit-circle
//! bottleneck assigns every sample a phase on the 24-hour cycle. Fitted
//! phases can then be rotated onto the biological reference frame of core
//! clock gene acrophases and scored against known collection times.
//!
//! # Example
//!
//! ```ignore
//! use circaphase::prelude::*;
//!
//! let config = FitConfig::default();
//! config.validate()?;
//!
//! let (expression, metadata) = read_expression_csv("expression.csv", &config)?;
//! let dataset = PhaseDataSet::new(expression, metadata)?;
//!
//! let fit = run_fit(dataset, None, &config)?;
//! println!("{:?}", fit.results.summary());
//! ```

pub mod align;
pub mod cli;
pub mod config;
pub mod crossval;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod phase;
pub mod preprocess;
pub mod rng;
pub mod stats;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::align::{align_phases, Alignment, GeneAcrophase};
    pub use crate::config::FitConfig;
    pub use crate::crossval::{run_cross_validation, CrossValReport};
    pub use crate::data::{ExpressionMatrix, PhaseDataSet, SampleMetadata};
    pub use crate::error::{CircaError, Result};
    pub use crate::io::{read_expression_csv, read_seed_genes, PhaseResults, PhaseSummary};
    pub use crate::model::{train_ensemble, ModelBundle, PhaseAutoEncoder};
    pub use crate::preprocess::{run_gene_selection, run_preprocessing, StandardScaler};
    pub use crate::{reapply_fit, run_fit, FitOutput};
}

use error::Result;

/// Output of a full fitting run
#[derive(Debug, Clone)]
pub struct FitOutput {
    /// The dataset with all fitted stage results filled in
    pub dataset: data::PhaseDataSet,
    /// Everything needed to apply the model to new cohorts
    pub bundle: model::ModelBundle,
    /// Per-sample phase predictions with accuracy annotations
    pub results: io::PhaseResults,
    /// Per-epoch loss of the winning ensemble member
    pub loss_trace: Vec<f64>,
}

/// Run the complete fitting pipeline on a raw dataset.
///
/// Stages: optional seeded sample cap, optional seed-gene restriction,
/// preprocessing (clipping / CV filter / log / standardization), SVD gene
/// selection, ensemble training, and phase prediction for every sample.
pub fn run_fit(
    dataset: data::PhaseDataSet,
    seed_genes: Option<&[String]>,
    config: &config::FitConfig,
) -> Result<FitOutput> {
    config.validate()?;
    let mut dataset = dataset;

    // Cap the cohort to max_samples with a seeded random subset
    if config.max_samples > 0 && dataset.n_samples() > config.max_samples {
        let mut rng = rng::Mt19937::new(config.random_seed);
        let keep = rng.choose_indices(dataset.n_samples(), config.max_samples);
        log::info!(
            "Capping cohort from {} to {} samples",
            dataset.n_samples(),
            config.max_samples
        );
        dataset = dataset.subset_samples(&keep)?;
    }

    // Restrict to a seed gene list before any statistics are computed
    if let Some(genes) = seed_genes {
        let expression = dataset.expression().subset_by_symbols(genes)?;
        let metadata = dataset.sample_metadata().clone();
        dataset = data::PhaseDataSet::new(expression, metadata)?;
    }

    let mut dataset = preprocess::run_preprocessing(dataset, config)?;
    preprocess::run_gene_selection(&mut dataset, config)?;

    let outcome = model::train_ensemble(
        dataset.model_input()?,
        dataset.sample_metadata(),
        config,
    )?;

    let phases = outcome.model.predict_phases(dataset.model_input()?)?;
    dataset.set_phases(phases.clone());
    dataset.set_model(outcome.model.clone(), outcome.loss_trace.clone());

    // Scaler restricted to the selected genes, in selection order, so the
    // bundle can be reapplied to matrices holding just those genes
    let selected = dataset.selected_genes()?.to_vec();
    let scaler_indices: Vec<usize> = selected
        .iter()
        .filter_map(|symbol| dataset.expression().gene_index(symbol))
        .collect();
    let bundle = model::ModelBundle {
        model: outcome.model,
        scaler: dataset.scaler()?.subset_genes(&scaler_indices)?,
        selected_genes: selected,
        period_hours: config.period_hours,
        config: config.clone(),
    };

    let results = io::PhaseResults::from_phases(
        &phases,
        dataset.sample_metadata(),
        config.period_hours,
    )?;

    Ok(FitOutput {
        dataset,
        bundle,
        results,
        loss_trace: outcome.loss_trace,
    })
}

/// Apply a previously fitted model to a new cohort
pub fn reapply_fit(
    bundle: &model::ModelBundle,
    expression: &data::ExpressionMatrix,
    metadata: &data::SampleMetadata,
) -> Result<io::PhaseResults> {
    let phases = bundle.predict(expression)?;
    io::PhaseResults::from_phases(&phases, metadata, bundle.period_hours)
}
