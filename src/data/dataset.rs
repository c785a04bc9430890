//! PhaseDataSet - Main data structure for circadian phase estimation

use ndarray::Array2;

use super::{ExpressionMatrix, SampleMetadata};
use crate::error::{CircaError, Result};
use crate::model::PhaseAutoEncoder;
use crate::preprocess::StandardScaler;

/// Main data structure carried through the fitting pipeline.
/// Holds the raw expression matrix and sample metadata, plus the artifacts
/// each stage produces. Stage results start as None and are filled in order:
/// preprocessing, gene selection, eigengene projection, model training.
#[derive(Debug, Clone)]
pub struct PhaseDataSet {
    /// Raw expression matrix (genes x samples)
    expression: ExpressionMatrix,
    /// Per-sample annotations (collection times, cell types)
    sample_metadata: SampleMetadata,

    // Preprocessing results
    /// Fitted per-gene scaler, after standardization
    scaler: Option<StandardScaler>,
    /// Preprocessed expression (genes x samples), after clipping/scaling
    preprocessed: Option<Array2<f64>>,

    // Gene selection results
    /// Symbols of the genes retained by SVD importance ranking
    selected_genes: Option<Vec<String>>,
    /// Per-gene importance scores for the retained genes
    gene_importance: Option<Vec<f64>>,
    /// Reduced input matrix handed to the model (samples x selected genes)
    model_input: Option<Array2<f64>>,

    // Training results
    /// Trained phase autoencoder
    model: Option<PhaseAutoEncoder>,
    /// Per-epoch total loss of the winning ensemble member
    loss_trace: Option<Vec<f64>>,
    /// Predicted phase in radians for each sample
    phases: Option<Vec<f64>>,
}

impl PhaseDataSet {
    /// Create a new dataset from an expression matrix and matching metadata
    pub fn new(expression: ExpressionMatrix, sample_metadata: SampleMetadata) -> Result<Self> {
        if expression.sample_ids() != sample_metadata.sample_ids() {
            return Err(CircaError::InvalidMetadata {
                reason: "Sample IDs in expression matrix and metadata do not match".to_string(),
            });
        }

        if expression.n_samples() == 0 {
            return Err(CircaError::EmptyData {
                reason: "Expression matrix has no samples".to_string(),
            });
        }

        Ok(Self {
            expression,
            sample_metadata,
            scaler: None,
            preprocessed: None,
            selected_genes: None,
            gene_importance: None,
            model_input: None,
            model: None,
            loss_trace: None,
            phases: None,
        })
    }

    pub fn expression(&self) -> &ExpressionMatrix {
        &self.expression
    }

    pub fn sample_metadata(&self) -> &SampleMetadata {
        &self.sample_metadata
    }

    pub fn n_genes(&self) -> usize {
        self.expression.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.expression.n_samples()
    }

    /// Subset to specific samples, dropping all fitted stage results
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let expression = self.expression.subset_samples(sample_indices)?;
        let sample_metadata = self.sample_metadata.subset_samples(sample_indices)?;
        Self::new(expression, sample_metadata)
    }

    // -- stage setters ----------------------------------------------------

    pub fn set_preprocessed(&mut self, scaler: StandardScaler, values: Array2<f64>) {
        self.scaler = Some(scaler);
        self.preprocessed = Some(values);
    }

    pub fn set_selection(
        &mut self,
        genes: Vec<String>,
        importance: Vec<f64>,
        model_input: Array2<f64>,
    ) {
        self.selected_genes = Some(genes);
        self.gene_importance = Some(importance);
        self.model_input = Some(model_input);
    }

    pub fn set_model(&mut self, model: PhaseAutoEncoder, loss_trace: Vec<f64>) {
        self.model = Some(model);
        self.loss_trace = Some(loss_trace);
    }

    pub fn set_phases(&mut self, phases: Vec<f64>) {
        self.phases = Some(phases);
    }

    // -- stage getters; error when the stage has not run -------------------

    pub fn scaler(&self) -> Result<&StandardScaler> {
        self.scaler.as_ref().ok_or_else(|| CircaError::InvalidInput {
            reason: "Preprocessing has not been run".to_string(),
        })
    }

    pub fn preprocessed(&self) -> Result<&Array2<f64>> {
        self.preprocessed
            .as_ref()
            .ok_or_else(|| CircaError::InvalidInput {
                reason: "Preprocessing has not been run".to_string(),
            })
    }

    pub fn selected_genes(&self) -> Result<&[String]> {
        self.selected_genes
            .as_deref()
            .ok_or_else(|| CircaError::InvalidInput {
                reason: "Gene selection has not been run".to_string(),
            })
    }

    pub fn gene_importance(&self) -> Result<&[f64]> {
        self.gene_importance
            .as_deref()
            .ok_or_else(|| CircaError::InvalidInput {
                reason: "Gene selection has not been run".to_string(),
            })
    }

    pub fn model_input(&self) -> Result<&Array2<f64>> {
        self.model_input
            .as_ref()
            .ok_or_else(|| CircaError::InvalidInput {
                reason: "Gene selection has not been run".to_string(),
            })
    }

    pub fn model(&self) -> Result<&PhaseAutoEncoder> {
        self.model.as_ref().ok_or_else(|| CircaError::InvalidInput {
            reason: "Model has not been trained".to_string(),
        })
    }

    pub fn loss_trace(&self) -> Result<&[f64]> {
        self.loss_trace
            .as_deref()
            .ok_or_else(|| CircaError::InvalidInput {
                reason: "Model has not been trained".to_string(),
            })
    }

    pub fn phases(&self) -> Result<&[f64]> {
        self.phases.as_deref().ok_or_else(|| CircaError::InvalidInput {
            reason: "Phases have not been predicted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn example_dataset() -> PhaseDataSet {
        let values = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let expression = ExpressionMatrix::new(
            values,
            vec!["g1".to_string(), "g2".to_string()],
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
        )
        .unwrap();
        let metadata = SampleMetadata::unannotated(vec![
            "s1".to_string(),
            "s2".to_string(),
            "s3".to_string(),
        ]);
        PhaseDataSet::new(expression, metadata).unwrap()
    }

    #[test]
    fn test_dataset_creation() {
        let ds = example_dataset();
        assert_eq!(ds.n_genes(), 2);
        assert_eq!(ds.n_samples(), 3);
    }

    #[test]
    fn test_mismatched_sample_ids_rejected() {
        let values = array![[1.0, 2.0]];
        let expression = ExpressionMatrix::new(
            values,
            vec!["g1".to_string()],
            vec!["s1".to_string(), "s2".to_string()],
        )
        .unwrap();
        let metadata =
            SampleMetadata::unannotated(vec!["other1".to_string(), "other2".to_string()]);
        assert!(PhaseDataSet::new(expression, metadata).is_err());
    }

    #[test]
    fn test_stage_getters_error_before_stage() {
        let ds = example_dataset();
        assert!(ds.preprocessed().is_err());
        assert!(ds.selected_genes().is_err());
        assert!(ds.model().is_err());
        assert!(ds.phases().is_err());
    }

    #[test]
    fn test_subset_drops_stage_results() {
        let mut ds = example_dataset();
        ds.set_phases(vec![0.1, 0.2, 0.3]);
        let sub = ds.subset_samples(&[0, 1]).unwrap();
        assert_eq!(sub.n_samples(), 2);
        assert!(sub.phases().is_err());
    }
}
