//! Statistical utility functions shared across modules
//!
//! Percentiles and coefficient of variation back the preprocessing filters;
//! the closed-form cosinor fit backs both the sine-prior training loss and
//! phase alignment; the circular statistics back the fit metrics.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{CircaError, Result};
use crate::phase::wrap_phase;

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0), matching the scaler convention
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Coefficient of variation: sd / |mean|. Infinite when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return f64::INFINITY;
    }
    population_std(values) / m.abs()
}

/// Linear-interpolated percentile, p in [0, 100]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    let frac = rank - low as f64;
    sorted[low] * (1.0 - frac) + sorted[high] * frac
}

/// Result of a least-squares cosinor fit y = a*sin(φ) + b*cos(φ) + mesor
#[derive(Debug, Clone)]
pub struct CosinorFit {
    pub a: f64,
    pub b: f64,
    pub mesor: f64,
    /// sqrt(a² + b²)
    pub amplitude: f64,
    /// Phase of peak expression, in [0, 2π)
    pub acrophase: f64,
    pub r_squared: f64,
}

/// Ridge-regularized cosinor fit of `values` against `phases`.
///
/// Solves the 3x3 normal equations (with `ridge` added to the diagonal)
/// by Gaussian elimination. Requires at least 4 observations so the fit
/// is overdetermined.
pub fn fit_cosinor(phases: &[f64], values: &[f64], ridge: f64) -> Result<CosinorFit> {
    if phases.len() != values.len() {
        return Err(CircaError::DimensionMismatch {
            expected: format!("{} values", phases.len()),
            got: format!("{} values", values.len()),
        });
    }
    let n = phases.len();
    if n < 4 {
        return Err(CircaError::InvalidInput {
            reason: format!("cosinor fit requires at least 4 observations, got {}", n),
        });
    }

    let mut ss = 0.0;
    let mut sc = 0.0;
    let mut s1 = 0.0;
    let mut cc = 0.0;
    let mut c1 = 0.0;
    let mut ys = 0.0;
    let mut yc = 0.0;
    let mut y1 = 0.0;
    for (&phi, &y) in phases.iter().zip(values.iter()) {
        let s = phi.sin();
        let c = phi.cos();
        ss += s * s;
        sc += s * c;
        s1 += s;
        cc += c * c;
        c1 += c;
        ys += y * s;
        yc += y * c;
        y1 += y;
    }

    let mat = [
        [ss + ridge, sc, s1],
        [sc, cc + ridge, c1],
        [s1, c1, n as f64 + ridge],
    ];
    let rhs = [ys, yc, y1];
    let coef = solve3(mat, rhs).ok_or_else(|| CircaError::NumericalInstability {
        operation: "cosinor fit".to_string(),
        details: "singular normal equations".to_string(),
    })?;
    let (a, b, mesor) = (coef[0], coef[1], coef[2]);

    let y_mean = y1 / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (&phi, &y) in phases.iter().zip(values.iter()) {
        let pred = a * phi.sin() + b * phi.cos() + mesor;
        ss_res += (y - pred).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    // a*sin(φ) + b*cos(φ) = A*sin(φ + θ) with θ = atan2(b, a); the peak
    // sits at φ = π/2 - θ.
    let amplitude = a.hypot(b);
    let acrophase = wrap_phase(std::f64::consts::FRAC_PI_2 - b.atan2(a));

    Ok(CosinorFit {
        a,
        b,
        mesor,
        amplitude,
        acrophase,
        r_squared,
    })
}

/// Solve a 3x3 linear system by Gaussian elimination with partial pivoting
fn solve3(mat: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    let mut a = mat;
    let mut b = rhs;

    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        for row in (col + 1)..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut acc = b[row];
        for k in (row + 1)..3 {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Some(x)
}

/// Circular mean of a set of phases, in [0, 2π)
pub fn circular_mean(phases: &[f64]) -> f64 {
    let sin_sum: f64 = phases.iter().map(|p| p.sin()).sum();
    let cos_sum: f64 = phases.iter().map(|p| p.cos()).sum();
    wrap_phase(sin_sum.atan2(cos_sum))
}

/// Circular-circular correlation with a large-sample p-value
#[derive(Debug, Clone, Copy)]
pub struct CircularCorrelation {
    pub rho: f64,
    pub p_value: f64,
}

/// Fisher-Lee circular correlation between two phase samples.
///
/// The pairwise form ρ = Σ_{i<j} sin(aᵢ-aⱼ) sin(bᵢ-bⱼ) /
/// sqrt(Σ sin²(aᵢ-aⱼ) Σ sin²(bᵢ-bⱼ)) stays exact for a pure rotation
/// b = a + c even when the phases cover the circle uniformly, where
/// mean-centered variants lose their reference direction. The p-value
/// comes from the asymptotic normal test statistic
/// z = sqrt(n λ20 λ02 / λ22) ρ.
pub fn circular_correlation(a: &[f64], b: &[f64]) -> Result<CircularCorrelation> {
    if a.len() != b.len() {
        return Err(CircaError::DimensionMismatch {
            expected: format!("{} phases", a.len()),
            got: format!("{} phases", b.len()),
        });
    }
    let n = a.len();
    if n < 3 {
        return Err(CircaError::InvalidInput {
            reason: "circular correlation requires at least 3 observations".to_string(),
        });
    }

    let mut num = 0.0;
    let mut den_a = 0.0;
    let mut den_b = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let sa = (a[i] - a[j]).sin();
            let sb = (b[i] - b[j]).sin();
            num += sa * sb;
            den_a += sa * sa;
            den_b += sb * sb;
        }
    }

    if den_a <= 0.0 || den_b <= 0.0 {
        return Err(CircaError::NumericalInstability {
            operation: "circular correlation".to_string(),
            details: "zero angular variance".to_string(),
        });
    }

    let rho = num / (den_a * den_b).sqrt();

    // Moments of the mean-centered sines for the test statistic; these stay
    // well-behaved under uniform coverage even though a mean-centered rho
    // would not
    let mean_a = circular_mean(a);
    let mean_b = circular_mean(b);
    let nf = n as f64;
    let mut l20 = 0.0;
    let mut l02 = 0.0;
    let mut l22 = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let sa = (x - mean_a).sin();
        let sb = (y - mean_b).sin();
        l20 += sa * sa;
        l02 += sb * sb;
        l22 += sa * sa * sb * sb;
    }
    let l20 = l20 / nf;
    let l02 = l02 / nf;
    let l22 = l22 / nf;

    let p_value = if l22 > 0.0 {
        let z = (nf * l20 * l02 / l22).sqrt() * rho;
        let normal = Normal::new(0.0, 1.0).map_err(|e| CircaError::NumericalInstability {
            operation: "circular correlation".to_string(),
            details: e.to_string(),
        })?;
        2.0 * (1.0 - normal.cdf(z.abs()))
    } else {
        f64::NAN
    };

    Ok(CircularCorrelation { rho, p_value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    #[test]
    fn test_mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&v) - 5.0).abs() < 1e-12);
        assert!((population_std(&v) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&v, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_cosinor_recovers_sinusoid() {
        let n = 48;
        let phases: Vec<f64> = (0..n).map(|i| TAU * i as f64 / n as f64).collect();
        // y = 2.5*sin(φ + 1.0) + 3.0
        let values: Vec<f64> = phases.iter().map(|p| 2.5 * (p + 1.0).sin() + 3.0).collect();

        let fit = fit_cosinor(&phases, &values, 0.0).unwrap();
        assert!((fit.amplitude - 2.5).abs() < 1e-6);
        assert!((fit.mesor - 3.0).abs() < 1e-6);
        assert!(fit.r_squared > 0.999);
        // peak of sin(φ + 1.0) is at φ = π/2 - 1.0
        let expected = wrap_phase(std::f64::consts::FRAC_PI_2 - 1.0);
        assert!(crate::phase::wrapped_distance(fit.acrophase, expected) < 1e-6);
    }

    #[test]
    fn test_cosinor_flat_signal() {
        let phases: Vec<f64> = (0..24).map(|i| TAU * i as f64 / 24.0).collect();
        let values = vec![1.0; 24];
        let fit = fit_cosinor(&phases, &values, 0.0).unwrap();
        assert!(fit.amplitude < 1e-9);
        assert!((fit.mesor - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosinor_too_few_points() {
        assert!(fit_cosinor(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 0.0).is_err());
    }

    #[test]
    fn test_circular_correlation_perfect() {
        let a: Vec<f64> = (0..36).map(|i| TAU * i as f64 / 36.0).collect();
        let b: Vec<f64> = a.iter().map(|p| wrap_phase(p + 1.3)).collect();
        let cc = circular_correlation(&a, &b).unwrap();
        assert!(cc.rho > 0.99, "rho = {}", cc.rho);
        assert!(cc.p_value < 0.01);
    }

    #[test]
    fn test_circular_correlation_reflected() {
        let a: Vec<f64> = (0..36).map(|i| TAU * i as f64 / 36.0).collect();
        let b: Vec<f64> = a.iter().map(|p| wrap_phase(-p)).collect();
        let cc = circular_correlation(&a, &b).unwrap();
        assert!(cc.rho < -0.99, "rho = {}", cc.rho);
    }
}
