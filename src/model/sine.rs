//! Cosinor prior over predicted phases
//!
//! Each gene's expression should trace a sinusoid over the predicted phase
//! ordering. The prior fits a ridge cosinor per gene within each cell-type
//! group, scores the residuals, and differentiates the residual loss with
//! respect to the phases (holding the fitted sinusoid coefficients fixed).

use ndarray::Array2;

use crate::data::SampleMetadata;
use crate::error::{CircaError, Result};
use crate::stats;

/// Sample groups the cosinor prior is evaluated over
#[derive(Debug, Clone)]
pub struct SinePrior {
    groups: Vec<Vec<usize>>,
}

impl SinePrior {
    /// Group samples by cell type. Groups smaller than `min_samples_per_group`
    /// are skipped entirely, so a cell type without enough samples for a
    /// stable cosinor contributes nothing to the prior.
    pub fn new(metadata: &SampleMetadata, min_samples_per_group: usize) -> Self {
        let by_celltype = metadata.celltype_groups();
        let mut groups: Vec<Vec<usize>> = Vec::new();

        let mut keys: Vec<&String> = by_celltype.keys().collect();
        keys.sort();
        for key in keys {
            let members = &by_celltype[key];
            if members.len() >= min_samples_per_group {
                groups.push(members.clone());
            } else {
                log::debug!(
                    "Cell type '{}' has {} samples, below {}; skipped by the cosinor prior",
                    key,
                    members.len(),
                    min_samples_per_group
                );
            }
        }

        Self { groups }
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Prior loss and its gradient with respect to each sample's phase.
    ///
    /// `x` is the samples x genes model input and `phases` the current
    /// predictions. Genes whose cosinor fit is degenerate (too few samples
    /// in a group) contribute nothing.
    pub fn loss_and_phase_grad(
        &self,
        x: &Array2<f64>,
        phases: &[f64],
        ridge: f64,
    ) -> Result<(f64, Vec<f64>)> {
        let (n_samples, n_genes) = x.dim();
        if phases.len() != n_samples {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} phases", n_samples),
                got: format!("{} phases", phases.len()),
            });
        }

        let mut loss = 0.0;
        let mut grad = vec![0.0; n_samples];
        let mut n_terms = 0usize;

        for group in &self.groups {
            let group_phases: Vec<f64> = group.iter().map(|&s| phases[s]).collect();
            for j in 0..n_genes {
                let values: Vec<f64> = group.iter().map(|&s| x[[s, j]]).collect();
                let fit = match stats::fit_cosinor(&group_phases, &values, ridge) {
                    Ok(fit) => fit,
                    Err(_) => continue,
                };

                for (&s, (&phi, &y)) in group.iter().zip(group_phases.iter().zip(&values)) {
                    let predicted = fit.a * phi.sin() + fit.b * phi.cos() + fit.mesor;
                    let residual = y - predicted;
                    loss += residual * residual;
                    // d(predicted)/d(phi) = a*cos(phi) - b*sin(phi)
                    grad[s] += -2.0 * residual * (fit.a * phi.cos() - fit.b * phi.sin());
                    n_terms += 1;
                }
            }
        }

        if n_terms == 0 {
            return Ok((0.0, grad));
        }

        let scale = 1.0 / n_terms as f64;
        for g in grad.iter_mut() {
            *g *= scale;
        }
        Ok((loss * scale, grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn unannotated(n: usize) -> SampleMetadata {
        SampleMetadata::unannotated((0..n).map(|i| format!("s{}", i)).collect())
    }

    #[test]
    fn test_perfect_sinusoid_has_near_zero_loss() {
        let n = 24;
        let phases: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * TAU).collect();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                phases[i].sin() * 2.0 + 1.0
            } else {
                phases[i].cos() * 0.5 - 3.0
            }
        });

        let prior = SinePrior::new(&unannotated(n), 5);
        let (loss, grad) = prior.loss_and_phase_grad(&x, &phases, 0.0).unwrap();
        assert!(loss < 1e-10);
        assert!(grad.iter().all(|g| g.abs() < 1e-5));
    }

    #[test]
    fn test_noise_has_positive_loss() {
        let n = 24;
        let phases: Vec<f64> = (0..n).map(|i| i as f64 / n as f64 * TAU).collect();
        let x = Array2::from_shape_fn((n, 1), |(i, _)| ((i * 7919) % 13) as f64 - 6.0);

        let prior = SinePrior::new(&unannotated(n), 5);
        let (loss, _) = prior.loss_and_phase_grad(&x, &phases, 0.01).unwrap();
        assert!(loss > 0.1);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let n = 16;
        let phases: Vec<f64> = (0..n)
            .map(|i| (i as f64 / n as f64 * TAU + 0.3) % TAU)
            .collect();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            (phases[i] + j as f64).sin() + 0.3 * ((i * 31) % 7) as f64
        });

        let prior = SinePrior::new(&unannotated(n), 5);
        let ridge = 0.01;
        let (_, grad) = prior.loss_and_phase_grad(&x, &phases, ridge).unwrap();

        // numerical gradient for one phase, refitting excluded: perturb and
        // re-evaluate with coefficients refit, which dominates only at
        // second order, so a loose tolerance is enough
        let h = 1e-6;
        for s in [0usize, 7] {
            let mut plus = phases.clone();
            plus[s] += h;
            let mut minus = phases.clone();
            minus[s] -= h;
            let (lp, _) = prior.loss_and_phase_grad(&x, &plus, ridge).unwrap();
            let (lm, _) = prior.loss_and_phase_grad(&x, &minus, ridge).unwrap();
            let numeric = (lp - lm) / (2.0 * h);
            assert!(
                (numeric - grad[s]).abs() < 1e-3,
                "sample {}: numeric {} vs analytic {}",
                s,
                numeric,
                grad[s]
            );
        }
    }

    #[test]
    fn test_small_groups_skipped() {
        let metadata = SampleMetadata::new(
            (0..6).map(|i| format!("s{}", i)).collect(),
            vec![None; 6],
            vec![
                Some("a".to_string()),
                Some("a".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
                Some("b".to_string()),
                Some("c".to_string()),
            ],
        )
        .unwrap();

        // min group size 3: only "b" qualifies; "a" and "c" are skipped
        let prior = SinePrior::new(&metadata, 3);
        assert_eq!(prior.n_groups(), 1);
    }

    #[test]
    fn test_all_groups_below_threshold_contribute_nothing() {
        let metadata = SampleMetadata::new(
            (0..6).map(|i| format!("s{}", i)).collect(),
            vec![None; 6],
            (0..6)
                .map(|i| Some(if i < 3 { "a" } else { "b" }.to_string()))
                .collect(),
        )
        .unwrap();
        let prior = SinePrior::new(&metadata, 5);
        assert_eq!(prior.n_groups(), 0);

        let phases: Vec<f64> = (0..6).map(|i| i as f64 / 6.0 * TAU).collect();
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i * 3 + j) as f64);
        let (loss, grad) = prior.loss_and_phase_grad(&x, &phases, 0.01).unwrap();
        assert_eq!(loss, 0.0);
        assert!(grad.iter().all(|&g| g == 0.0));
    }
}
