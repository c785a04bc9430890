//! Outlier clipping and coefficient-of-variation gene filtering

use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::error::{CircaError, Result};
use crate::stats;

/// Clip each gene's values to its [100 - p, p] percentile range, in place
pub fn clip_outliers(values: &mut Array2<f64>, upper_percentile: f64) -> Result<()> {
    if !(50.0..100.0).contains(&upper_percentile) {
        return Err(CircaError::InvalidConfig {
            reason: format!(
                "clip percentile must be in [50, 100), got {}",
                upper_percentile
            ),
        });
    }
    let lower_percentile = 100.0 - upper_percentile;

    values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .for_each(|mut row| {
            let data: Vec<f64> = row.to_vec();
            let lo = stats::percentile(&data, lower_percentile);
            let hi = stats::percentile(&data, upper_percentile);
            row.mapv_inplace(|x| x.clamp(lo, hi));
        });
    Ok(())
}

/// Indices of genes whose coefficient of variation falls inside
/// [cv_min, cv_max]. Genes with a non-finite CV (zero mean) are dropped.
pub fn cv_filter_indices(values: &Array2<f64>, cv_min: f64, cv_max: f64) -> Result<Vec<usize>> {
    if cv_min < 0.0 || cv_min >= cv_max {
        return Err(CircaError::InvalidConfig {
            reason: format!(
                "cv bounds must satisfy 0 <= cv_min < cv_max, got [{}, {}]",
                cv_min, cv_max
            ),
        });
    }

    let keep: Vec<usize> = (0..values.nrows())
        .into_par_iter()
        .filter(|&i| {
            let row: Vec<f64> = values.row(i).to_vec();
            let cv = stats::coefficient_of_variation(&row);
            cv.is_finite() && cv >= cv_min && cv <= cv_max
        })
        .collect();

    if keep.is_empty() {
        return Err(CircaError::EmptyData {
            reason: "No genes passed the coefficient-of-variation filter".to_string(),
        });
    }

    log::info!(
        "CV filter kept {} of {} genes (bounds [{}, {}])",
        keep.len(),
        values.nrows(),
        cv_min,
        cv_max
    );
    Ok(keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clip_outliers_tames_extreme_value() {
        let mut values = Array2::from_shape_fn((1, 11), |(_, j)| j as f64);
        values[[0, 10]] = 1000.0;
        clip_outliers(&mut values, 90.0).unwrap();
        // 90th percentile of 0..9,1000 sits well below 1000
        assert!(values[[0, 10]] < 1000.0);
        // interior values untouched
        assert_eq!(values[[0, 5]], 5.0);
    }

    #[test]
    fn test_clip_rejects_bad_percentile() {
        let mut values = array![[1.0, 2.0]];
        assert!(clip_outliers(&mut values, 10.0).is_err());
    }

    #[test]
    fn test_cv_filter_bounds() {
        // gene 0: mean 10, std ~0 -> cv ~0 (below min)
        // gene 1: mean 10, std 5 -> cv 0.5 (inside)
        // gene 2: mean 0 -> cv infinite (dropped)
        let values = array![
            [10.0, 10.0, 10.0],
            [5.0, 10.0, 15.0],
            [-1.0, 0.0, 1.0]
        ];
        let keep = cv_filter_indices(&values, 0.14, 0.7).unwrap();
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn test_cv_filter_none_pass_fails() {
        let values = array![[10.0, 10.0], [20.0, 20.0]];
        assert!(cv_filter_indices(&values, 0.14, 0.7).is_err());
    }
}
