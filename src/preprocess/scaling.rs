//! Per-gene standardization with a persistable scaler

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{CircaError, Result};

/// Per-gene mean/std scaler, fitted on training data and reapplied to new
/// cohorts at prediction time. Genes with zero variance scale to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a genes x samples matrix
    pub fn fit(values: &Array2<f64>) -> Result<Self> {
        if values.ncols() == 0 {
            return Err(CircaError::EmptyData {
                reason: "Cannot fit scaler on a matrix with no samples".to_string(),
            });
        }

        let n = values.ncols() as f64;
        let mut means = Vec::with_capacity(values.nrows());
        let mut stds = Vec::with_capacity(values.nrows());
        for row in values.axis_iter(Axis(0)) {
            let mean = row.sum() / n;
            let var = row.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
            means.push(mean);
            stds.push(var.sqrt());
        }
        Ok(Self { means, stds })
    }

    pub fn n_genes(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Standardize a genes x samples matrix with the fitted parameters
    pub fn transform(&self, values: &Array2<f64>) -> Result<Array2<f64>> {
        if values.nrows() != self.n_genes() {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} genes", self.n_genes()),
                got: format!("{} genes", values.nrows()),
            });
        }

        let mut out = values.clone();
        for (i, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
            let mean = self.means[i];
            let std = self.stds[i];
            if std > 0.0 {
                row.mapv_inplace(|x| (x - mean) / std);
            } else {
                row.fill(0.0);
            }
        }
        Ok(out)
    }

    /// Fit and transform in one pass
    pub fn fit_transform(values: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(values)?;
        let transformed = scaler.transform(values)?;
        Ok((scaler, transformed))
    }

    /// Scaler parameters for a subset of genes, in the given order
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        if gene_indices.iter().any(|&i| i >= self.n_genes()) {
            return Err(CircaError::InvalidInput {
                reason: "Gene index out of bounds for scaler".to_string(),
            });
        }
        Ok(Self {
            means: gene_indices.iter().map(|&i| self.means[i]).collect(),
            stds: gene_indices.iter().map(|&i| self.stds[i]).collect(),
        })
    }
}

/// log(1 + x / offset), applied in place
pub fn log_transform(values: &mut Array2<f64>, offset: f64) -> Result<()> {
    if offset <= 0.0 {
        return Err(CircaError::InvalidConfig {
            reason: format!("log_offset must be positive, got {}", offset),
        });
    }
    if values.iter().any(|&x| x / offset < -1.0 + f64::EPSILON) {
        return Err(CircaError::NumericalInstability {
            operation: "log transform".to_string(),
            details: "Values below -offset would produce non-finite logarithms".to_string(),
        });
    }
    values.mapv_inplace(|x| (1.0 + x / offset).ln());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_transform_zero_mean_unit_std() {
        let values = array![[1.0, 2.0, 3.0], [10.0, 10.0, 10.0]];
        let (scaler, transformed) = StandardScaler::fit_transform(&values).unwrap();

        assert!((scaler.means()[0] - 2.0).abs() < 1e-12);
        let row0: Vec<f64> = transformed.row(0).to_vec();
        assert!((row0.iter().sum::<f64>()).abs() < 1e-12);
        // constant gene scales to zero rather than dividing by zero
        assert!(transformed.row(1).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_transform_reapplies_training_parameters() {
        let train = array![[0.0, 2.0], [5.0, 7.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let test = array![[1.0, 3.0], [6.0, 6.0]];
        let transformed = scaler.transform(&test).unwrap();

        // train row 0: mean 1, std 1
        assert!((transformed[[0, 0]] - 0.0).abs() < 1e-12);
        assert!((transformed[[0, 1]] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_gene_count_mismatch_rejected() {
        let train = array![[0.0, 2.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let test = array![[1.0, 3.0], [6.0, 6.0]];
        assert!(scaler.transform(&test).is_err());
    }

    #[test]
    fn test_log_transform() {
        let mut values = array![[0.0, std::f64::consts::E - 1.0]];
        log_transform(&mut values, 1.0).unwrap();
        assert!((values[[0, 0]]).abs() < 1e-12);
        assert!((values[[0, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scaler_subset() {
        let train = array![[0.0, 2.0], [5.0, 7.0], [1.0, 1.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let sub = scaler.subset_genes(&[2, 0]).unwrap();
        assert_eq!(sub.n_genes(), 2);
        assert!((sub.means()[0] - 1.0).abs() < 1e-12);
        assert!((sub.means()[1] - 1.0).abs() < 1e-12);
    }
}
