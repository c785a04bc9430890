//! Seeded k-fold cross-validation of the full fitting pipeline
//!
//! Each fold re-runs preprocessing, gene selection, and training on the
//! training split alone, then scores the held-out samples against their
//! known collection times. Only timed samples are scored.

use serde::Serialize;

use crate::config::FitConfig;
use crate::data::PhaseDataSet;
use crate::error::{CircaError, Result};
use crate::model::{train_ensemble, ModelBundle};
use crate::phase;
use crate::preprocess::{run_gene_selection, run_preprocessing};
use crate::rng::Mt19937;
use crate::stats;

/// Held-out accuracy of one fold
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub fold: usize,
    pub n_train: usize,
    pub n_test: usize,
    /// Held-out samples with a known collection time
    pub n_scored: usize,
    pub mean_error_hours: f64,
    pub median_error_hours: f64,
}

/// Full cross-validation record
#[derive(Debug, Clone, Serialize)]
pub struct CrossValReport {
    pub n_folds: usize,
    pub folds: Vec<FoldReport>,
    /// Mean held-out error over all scored samples, pooled across folds
    pub pooled_mean_error_hours: f64,
}

/// Split sample indices into k folds, optionally shuffled with the seed
fn make_folds(n_samples: usize, k: usize, shuffle: bool, seed: u64) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n_samples).collect();
    if shuffle {
        let mut rng = Mt19937::new(seed);
        rng.shuffle(&mut order);
    }

    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (position, sample) in order.into_iter().enumerate() {
        folds[position % k].push(sample);
    }
    folds
}

/// Run k-fold cross-validation on a raw (unpreprocessed) dataset
pub fn run_cross_validation(dataset: &PhaseDataSet, config: &FitConfig) -> Result<CrossValReport> {
    let k = config.cv_folds;
    if k < 2 {
        return Err(CircaError::InvalidConfig {
            reason: format!("cv_folds must be at least 2, got {}", k),
        });
    }
    if dataset.n_samples() < 2 * k {
        return Err(CircaError::InvalidInput {
            reason: format!(
                "Cross-validation with {} folds needs at least {} samples, got {}",
                k,
                2 * k,
                dataset.n_samples()
            ),
        });
    }
    if dataset.sample_metadata().n_timed() == 0 {
        return Err(CircaError::InvalidInput {
            reason: "Cross-validation requires samples with known collection times".to_string(),
        });
    }

    let folds = make_folds(
        dataset.n_samples(),
        k,
        config.cv_shuffle,
        config.random_seed,
    );

    let mut reports = Vec::with_capacity(k);
    let mut pooled_errors: Vec<f64> = Vec::new();

    for (fold_idx, test_idx) in folds.iter().enumerate() {
        let train_idx: Vec<usize> = (0..dataset.n_samples())
            .filter(|s| !test_idx.contains(s))
            .collect();

        log::info!(
            "Fold {}/{}: {} train / {} test samples",
            fold_idx + 1,
            k,
            train_idx.len(),
            test_idx.len()
        );

        let train_ds = dataset.subset_samples(&train_idx)?;
        let mut train_ds = run_preprocessing(train_ds, config)?;
        run_gene_selection(&mut train_ds, config)?;

        let outcome = train_ensemble(
            train_ds.model_input()?,
            train_ds.sample_metadata(),
            config,
        )?;

        // scaler restricted to the selected genes, in selection order
        let selected = train_ds.selected_genes()?.to_vec();
        let scaler_indices: Vec<usize> = selected
            .iter()
            .filter_map(|symbol| train_ds.expression().gene_index(symbol))
            .collect();
        let bundle = ModelBundle {
            model: outcome.model,
            scaler: train_ds.scaler()?.subset_genes(&scaler_indices)?,
            selected_genes: selected,
            period_hours: config.period_hours,
            config: config.clone(),
        };

        let test_ds = dataset.subset_samples(test_idx)?;
        let phases = bundle.predict(test_ds.expression())?;

        let mut errors_hours: Vec<f64> = Vec::new();
        for (s, &phi) in phases.iter().enumerate() {
            if let Some(t) = test_ds.sample_metadata().collection_time(s) {
                let known = phase::time_to_phase(t, config.period_hours);
                let err = phase::wrapped_distance(phi, known) * config.period_hours
                    / std::f64::consts::TAU;
                errors_hours.push(err);
            }
        }

        reports.push(FoldReport {
            fold: fold_idx + 1,
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            n_scored: errors_hours.len(),
            mean_error_hours: if errors_hours.is_empty() {
                f64::NAN
            } else {
                stats::mean(&errors_hours)
            },
            median_error_hours: stats::percentile(&errors_hours, 50.0),
        });
        pooled_errors.extend_from_slice(&errors_hours);
    }

    if pooled_errors.is_empty() {
        return Err(CircaError::InvalidInput {
            reason: "No held-out samples carried collection times".to_string(),
        });
    }

    let report = CrossValReport {
        n_folds: k,
        folds: reports,
        pooled_mean_error_hours: stats::mean(&pooled_errors),
    };
    log::info!(
        "Cross-validation pooled mean error: {:.2} h",
        report.pooled_mean_error_hours
    );
    Ok(report)
}

/// Write the per-fold report as JSON
pub fn write_report_json<P: AsRef<std::path::Path>>(
    path: P,
    report: &CrossValReport,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}
