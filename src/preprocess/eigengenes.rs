//! Eigengene decomposition and SVD-based gene selection
//!
//! The singular value decomposition of the standardized expression matrix is
//! computed through the sample-space Gram matrix, which stays small even for
//! genome-wide input: with X (genes x samples), G = X'X is samples x samples
//! and a cyclic Jacobi sweep diagonalizes it directly. Left singular vectors
//! follow as U = X V / s, and each gene's importance is the singular-value
//! weighted sum of its loadings over the retained components.

use ndarray::{Array1, Array2};

use crate::config::FitConfig;
use crate::error::{CircaError, Result};

/// Eigendecomposition of a symmetric matrix, eigenvalues descending
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    pub eigenvalues: Vec<f64>,
    /// Eigenvectors as columns, matching eigenvalue order
    pub eigenvectors: Array2<f64>,
}

/// Cyclic Jacobi eigendecomposition of a symmetric matrix.
/// Converges when the off-diagonal Frobenius norm drops below `tolerance`.
pub fn jacobi_eigen(matrix: &Array2<f64>, max_sweeps: usize, tolerance: f64) -> Result<SymmetricEigen> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(CircaError::DecompositionFailed {
            reason: format!("Matrix must be square and non-empty, got {:?}", matrix.dim()),
        });
    }

    let mut a = matrix.clone();
    let mut v: Array2<f64> = Array2::eye(n);
    let mut converged = false;

    for _sweep in 0..max_sweeps {
        let off_norm: f64 = {
            let mut acc = 0.0;
            for p in 0..n {
                for q in (p + 1)..n {
                    acc += a[[p, q]] * a[[p, q]];
                }
            }
            (2.0 * acc).sqrt()
        };
        if off_norm <= tolerance {
            converged = true;
            break;
        }

        for p in 0..n.saturating_sub(1) {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }

                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                // signum() is 0 at theta == 0, which would stall the rotation
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                // A <- G' A G with G the (p, q) rotation
                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    if !converged {
        return Err(CircaError::DecompositionFailed {
            reason: format!("Jacobi iteration did not converge in {} sweeps", max_sweeps),
        });
    }

    // Sort descending, carrying eigenvectors along
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        a[[j, j]]
            .partial_cmp(&a[[i, i]])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let eigenvalues: Vec<f64> = order.iter().map(|&i| a[[i, i]]).collect();
    let mut eigenvectors = Array2::zeros((n, n));
    for (new_col, &old_col) in order.iter().enumerate() {
        for k in 0..n {
            eigenvectors[[k, new_col]] = v[[k, old_col]];
        }
    }

    Ok(SymmetricEigen {
        eigenvalues,
        eigenvectors,
    })
}

/// Thin SVD of a genes x samples matrix via the sample-space Gram matrix
#[derive(Debug, Clone)]
pub struct ThinSvd {
    /// Singular values, descending
    pub singular_values: Vec<f64>,
    /// Left singular vectors (genes x k)
    pub left_vectors: Array2<f64>,
    /// Right singular vectors (samples x k)
    pub right_vectors: Array2<f64>,
}

pub fn thin_svd(values: &Array2<f64>, max_sweeps: usize, tolerance: f64) -> Result<ThinSvd> {
    let (n_genes, n_samples) = values.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(CircaError::EmptyData {
            reason: "SVD input matrix is empty".to_string(),
        });
    }

    let gram = values.t().dot(values);
    let eigen = jacobi_eigen(&gram, max_sweeps, tolerance)?;

    // Negative eigenvalues are rounding noise on a Gram matrix
    let mut singular_values = Vec::new();
    let mut kept_cols = Vec::new();
    for (j, &lambda) in eigen.eigenvalues.iter().enumerate() {
        if lambda > tolerance.max(f64::EPSILON) {
            singular_values.push(lambda.sqrt());
            kept_cols.push(j);
        }
    }
    if singular_values.is_empty() {
        return Err(CircaError::DecompositionFailed {
            reason: "All singular values are numerically zero".to_string(),
        });
    }

    let k = singular_values.len();
    let mut right_vectors = Array2::zeros((n_samples, k));
    for (new_col, &old_col) in kept_cols.iter().enumerate() {
        for row in 0..n_samples {
            right_vectors[[row, new_col]] = eigen.eigenvectors[[row, old_col]];
        }
    }

    // U = X V / s
    let mut left_vectors = values.dot(&right_vectors);
    for (j, &s) in singular_values.iter().enumerate() {
        let mut col = left_vectors.column_mut(j);
        col.mapv_inplace(|x| x / s);
    }

    Ok(ThinSvd {
        singular_values,
        left_vectors,
        right_vectors,
    })
}

/// Genes retained by SVD importance ranking, highest first
#[derive(Debug, Clone)]
pub struct GeneSelection {
    /// Row indices of the selected genes in the input matrix
    pub indices: Vec<usize>,
    /// Importance score of each selected gene
    pub importance: Vec<f64>,
    /// Number of eigengene components that entered the scores
    pub n_components: usize,
    /// Fraction of total variance carried by the retained components
    pub variance_explained: f64,
}

/// Number of leading components to retain given the eigenvalue spectrum.
/// Components below the per-component variance floor are dropped, retention
/// stops once the cumulative fraction is reached, and at least two components
/// always survive so the phase plane stays two-dimensional.
fn retained_components(singular_values: &[f64], config: &FitConfig) -> usize {
    let total: f64 = singular_values.iter().map(|s| s * s).sum();
    if total <= 0.0 {
        return singular_values.len().min(2);
    }

    let mut cumulative = 0.0;
    let mut kept = 0;
    for &s in singular_values {
        let frac = s * s / total;
        if kept >= 2
            && (frac < config.eigen_min_variance_frac
                || cumulative >= config.eigen_total_variance_frac
                || kept >= config.eigen_max_components)
        {
            break;
        }
        cumulative += frac;
        kept += 1;
        if kept >= config.eigen_max_components && kept >= 2 {
            break;
        }
    }
    kept.clamp(2.min(singular_values.len()), singular_values.len())
}

/// Rank genes by singular-value weighted loadings and keep the strongest.
/// `values` is the preprocessed genes x samples matrix.
pub fn select_genes_by_svd(values: &Array2<f64>, config: &FitConfig) -> Result<GeneSelection> {
    let svd = thin_svd(values, config.svd_max_sweeps, config.svd_tolerance)?;
    let n_components = retained_components(&svd.singular_values, config);

    let total_var: f64 = svd.singular_values.iter().map(|s| s * s).sum();
    let retained_var: f64 = svd.singular_values[..n_components]
        .iter()
        .map(|s| s * s)
        .sum();

    let n_genes = values.nrows();
    let mut scores = Array1::<f64>::zeros(n_genes);
    for j in 0..n_components {
        let s = svd.singular_values[j];
        for i in 0..n_genes {
            scores[i] += svd.left_vectors[[i, j]].abs() * s;
        }
    }

    let mut order: Vec<usize> = (0..n_genes).collect();
    order.sort_by(|&i, &j| {
        scores[j]
            .partial_cmp(&scores[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(config.n_components.min(n_genes));

    let importance: Vec<f64> = order.iter().map(|&i| scores[i]).collect();

    log::info!(
        "SVD retained {} components ({:.1}% variance); selected {} genes",
        n_components,
        100.0 * retained_var / total_var.max(f64::EPSILON),
        order.len()
    );

    Ok(GeneSelection {
        indices: order,
        importance,
        n_components,
        variance_explained: retained_var / total_var.max(f64::EPSILON),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_jacobi_diagonal_matrix() {
        let m = array![[3.0, 0.0], [0.0, 1.0]];
        let eigen = jacobi_eigen(&m, 50, 1e-12).unwrap();
        assert!((eigen.eigenvalues[0] - 3.0).abs() < 1e-10);
        assert!((eigen.eigenvalues[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_jacobi_known_eigenvalues() {
        // eigenvalues of [[2,1],[1,2]] are 3 and 1
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let eigen = jacobi_eigen(&m, 50, 1e-12).unwrap();
        assert!((eigen.eigenvalues[0] - 3.0).abs() < 1e-10);
        assert!((eigen.eigenvalues[1] - 1.0).abs() < 1e-10);

        // eigenvector for lambda=3 is (1,1)/sqrt(2) up to sign
        let v0 = (eigen.eigenvectors[[0, 0]], eigen.eigenvectors[[1, 0]]);
        assert!((v0.0.abs() - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-10);
        assert!((v0.0 - v0.1).abs() < 1e-10);
    }

    #[test]
    fn test_jacobi_reconstruction() {
        let m = array![
            [4.0, 1.0, 0.5],
            [1.0, 3.0, -0.5],
            [0.5, -0.5, 2.0]
        ];
        let eigen = jacobi_eigen(&m, 100, 1e-12).unwrap();
        // V diag(lambda) V' reproduces the input
        let lambda = Array2::from_diag(&Array1::from(eigen.eigenvalues.clone()));
        let reconstructed = eigen
            .eigenvectors
            .dot(&lambda)
            .dot(&eigen.eigenvectors.t());
        for i in 0..3 {
            for j in 0..3 {
                assert!((reconstructed[[i, j]] - m[[i, j]]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_thin_svd_reconstruction() {
        // 4 genes x 3 samples
        let x = array![
            [1.0, 2.0, 3.0],
            [0.5, -1.0, 2.0],
            [2.0, 0.0, 1.0],
            [-1.0, 1.5, 0.0]
        ];
        let svd = thin_svd(&x, 100, 1e-12).unwrap();

        // U diag(s) V' reproduces the input
        let k = svd.singular_values.len();
        let mut s = Array2::zeros((k, k));
        for (j, &val) in svd.singular_values.iter().enumerate() {
            s[[j, j]] = val;
        }
        let reconstructed = svd.left_vectors.dot(&s).dot(&svd.right_vectors.t());
        for i in 0..4 {
            for j in 0..3 {
                assert!((reconstructed[[i, j]] - x[[i, j]]).abs() < 1e-8);
            }
        }

        // singular values descend
        for w in svd.singular_values.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn test_gene_selection_prefers_loud_genes() {
        // genes 0 and 1 carry strong sinusoidal structure, gene 2 is tiny noise
        let n = 12;
        let mut values = Array2::zeros((3, n));
        for j in 0..n {
            let t = j as f64 / n as f64 * std::f64::consts::TAU;
            values[[0, j]] = 5.0 * t.cos();
            values[[1, j]] = 5.0 * t.sin();
            values[[2, j]] = 0.01 * ((j * 7919) % 13) as f64 / 13.0;
        }

        let config = FitConfig {
            n_components: 2,
            ..FitConfig::default()
        };
        let selection = select_genes_by_svd(&values, &config).unwrap();
        assert_eq!(selection.indices.len(), 2);
        assert!(selection.indices.contains(&0));
        assert!(selection.indices.contains(&1));
        assert!(selection.n_components >= 2);
        // importance sorted descending
        assert!(selection.importance[0] >= selection.importance[1]);
    }
}
