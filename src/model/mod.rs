//! Phase autoencoder, cosinor prior, and training loop

mod autoencoder;
mod sine;
mod train;

pub use autoencoder::{ForwardPass, PhaseAutoEncoder};
pub use sine::SinePrior;
pub use train::{train_ensemble, EpochLoss, TrainOutcome};

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::FitConfig;
use crate::data::ExpressionMatrix;
use crate::error::{CircaError, Result};
use crate::preprocess::{self, StandardScaler};

/// Everything needed to apply a fitted model to a new cohort: the trained
/// autoencoder, the scaler restricted to the selected genes, the gene order
/// the model expects, and the training configuration for the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: PhaseAutoEncoder,
    pub scaler: StandardScaler,
    pub selected_genes: Vec<String>,
    pub period_hours: f64,
    pub config: FitConfig,
}

impl ModelBundle {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let bundle: ModelBundle = serde_json::from_reader(reader)?;
        Ok(bundle)
    }

    /// Predict phases for a new cohort. The selected genes are looked up by
    /// symbol; genes missing from the matrix are zero-filled, and the training
    /// scaler and transform are reapplied so the cohort lands in the training
    /// space.
    pub fn predict(&self, expression: &ExpressionMatrix) -> Result<Vec<f64>> {
        let mut raw = Array2::zeros((self.selected_genes.len(), expression.n_samples()));
        let mut n_found = 0;
        for (row, symbol) in self.selected_genes.iter().enumerate() {
            if let Some(idx) = expression.gene_index(symbol) {
                raw.row_mut(row).assign(&expression.values().row(idx));
                n_found += 1;
            } else {
                log::debug!("Model gene '{}' not in cohort, zero-filled", symbol);
            }
        }
        if n_found == 0 {
            return Err(CircaError::InvalidInput {
                reason: format!(
                    "None of the {} model genes are present in the cohort",
                    self.selected_genes.len()
                ),
            });
        }
        if n_found < self.selected_genes.len() {
            log::warn!(
                "Found {} of {} model genes; {} zero-filled",
                n_found,
                self.selected_genes.len(),
                self.selected_genes.len() - n_found
            );
        }

        let transformed = preprocess::apply_preprocessing(&raw, &self.scaler, &self.config)?;
        let x = transformed.t().to_owned();
        self.model.predict_phases(&x)
    }
}
