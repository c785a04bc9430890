//! Preprocessing pipeline: outlier clipping, CV filtering, log transform,
//! standardization, and SVD-driven gene selection

mod eigengenes;
mod filter;
mod scaling;

pub use eigengenes::{jacobi_eigen, select_genes_by_svd, thin_svd, GeneSelection, SymmetricEigen, ThinSvd};
pub use filter::{clip_outliers, cv_filter_indices};
pub use scaling::{log_transform, StandardScaler};

use ndarray::{Array2, Axis};

use crate::config::FitConfig;
use crate::data::PhaseDataSet;
use crate::error::Result;

/// Run the preprocessing stage on a dataset: optional CV gene filter on the
/// raw values, outlier clipping, log transform, and standardization. The
/// fitted scaler is retained for prediction on new cohorts.
pub fn run_preprocessing(dataset: PhaseDataSet, config: &FitConfig) -> Result<PhaseDataSet> {
    let mut dataset = dataset;

    if config.cv_filter {
        let raw = dataset.expression().values().to_owned();
        let keep = cv_filter_indices(&raw, config.cv_min, config.cv_max)?;
        let expression = dataset.expression().subset_genes(&keep)?;
        let metadata = dataset.sample_metadata().clone();
        dataset = PhaseDataSet::new(expression, metadata)?;
    }

    let mut values = dataset.expression().values().to_owned();
    if config.clip_outliers {
        clip_outliers(&mut values, config.clip_percentile)?;
    }
    if config.log_transform {
        log_transform(&mut values, config.log_offset)?;
    }

    let (scaler, transformed) = if config.standardize {
        StandardScaler::fit_transform(&values)?
    } else {
        let scaler = StandardScaler::fit(&values)?;
        (scaler, values)
    };

    dataset.set_preprocessed(scaler, transformed);
    Ok(dataset)
}

/// Re-apply a fitted preprocessing stage to a new genes x samples matrix.
/// Clipping is a training-time step and is not repeated here; the new cohort
/// is transformed with the training scaler so it lands in the same space.
pub fn apply_preprocessing(
    values: &Array2<f64>,
    scaler: &StandardScaler,
    config: &FitConfig,
) -> Result<Array2<f64>> {
    let mut values = values.clone();
    if config.log_transform {
        log_transform(&mut values, config.log_offset)?;
    }
    if config.standardize {
        scaler.transform(&values)
    } else {
        Ok(values)
    }
}

/// Run SVD gene selection on a preprocessed dataset, producing the
/// samples x selected-genes matrix the model trains on.
pub fn run_gene_selection(dataset: &mut PhaseDataSet, config: &FitConfig) -> Result<()> {
    let preprocessed = dataset.preprocessed()?.clone();
    let selection = select_genes_by_svd(&preprocessed, config)?;

    let reduced = preprocessed.select(Axis(0), &selection.indices);
    let model_input = reduced.t().to_owned();

    let genes: Vec<String> = selection
        .indices
        .iter()
        .map(|&i| dataset.expression().gene_symbols()[i].clone())
        .collect();

    dataset.set_selection(genes, selection.importance, model_input);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExpressionMatrix, SampleMetadata};
    use ndarray::Array2;

    fn sinusoidal_dataset(n_genes: usize, n_samples: usize) -> PhaseDataSet {
        let mut values = Array2::zeros((n_genes, n_samples));
        for i in 0..n_genes {
            for j in 0..n_samples {
                let t = j as f64 / n_samples as f64 * std::f64::consts::TAU;
                values[[i, j]] = 10.0 + 3.0 * (t + i as f64).cos() + 0.1 * (i * j) as f64 % 1.0;
            }
        }
        let genes: Vec<String> = (0..n_genes).map(|i| format!("g{}", i)).collect();
        let samples: Vec<String> = (0..n_samples).map(|j| format!("s{}", j)).collect();
        let expression = ExpressionMatrix::new(values, genes, samples.clone()).unwrap();
        PhaseDataSet::new(expression, SampleMetadata::unannotated(samples)).unwrap()
    }

    #[test]
    fn test_run_preprocessing_standardizes() {
        let dataset = sinusoidal_dataset(5, 16);
        let config = FitConfig::default();
        let dataset = run_preprocessing(dataset, &config).unwrap();

        let pre = dataset.preprocessed().unwrap();
        for row in pre.axis_iter(ndarray::Axis(0)) {
            let mean: f64 = row.sum() / row.len() as f64;
            assert!(mean.abs() < 1e-9);
        }
        assert_eq!(dataset.scaler().unwrap().n_genes(), 5);
    }

    #[test]
    fn test_gene_selection_sets_model_input() {
        let dataset = sinusoidal_dataset(6, 16);
        let config = FitConfig {
            n_components: 4,
            ..FitConfig::default()
        };
        let mut dataset = run_preprocessing(dataset, &config).unwrap();
        run_gene_selection(&mut dataset, &config).unwrap();

        let input = dataset.model_input().unwrap();
        assert_eq!(input.dim(), (16, 4));
        assert_eq!(dataset.selected_genes().unwrap().len(), 4);
    }

    #[test]
    fn test_apply_preprocessing_matches_training_space() {
        let dataset = sinusoidal_dataset(4, 12);
        let config = FitConfig::default();
        let raw = dataset.expression().values().to_owned();
        let dataset = run_preprocessing(dataset, &config).unwrap();

        // clipping barely moves this data, so reapplication lands close
        let reapplied =
            apply_preprocessing(&raw, dataset.scaler().unwrap(), &config).unwrap();
        let trained = dataset.preprocessed().unwrap();
        for (a, b) in reapplied.iter().zip(trained.iter()) {
            assert!((a - b).abs() < 0.5);
        }
    }
}
