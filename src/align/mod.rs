//! Rotation of fitted phases onto a biological reference frame
//!
//! The autoencoder's phase is only defined up to rotation and reflection of
//! the circle. This module anchors it: core clock genes have well-known
//! acrophases, so fitting a cosinor per reference gene against the predicted
//! phases and grid-searching the rotation (and optionally a reflection) that
//! best matches the published acrophases pins the absolute direction. When
//! the configuration instead carries known collection times for specific
//! samples, those pairs drive the same search directly.

use std::path::Path;

use serde::Serialize;

use crate::config::FitConfig;
use crate::data::ExpressionMatrix;
use crate::error::{CircaError, Result};
use crate::phase;
use crate::stats;

/// Published acrophases of core clock genes, in radians on a 24h cycle
/// (circadian-time hour times pi/12)
pub const REFERENCE_ACROPHASES: &[(&str, f64)] = &[
    ("ARNTL", 6.021386),
    ("CLOCK", 5.759587),
    ("NPAS2", 0.0),
    ("CRY1", 4.188790),
    ("CRY2", 3.141593),
    ("PER1", 2.617994),
    ("PER2", 3.141593),
    ("PER3", 2.356194),
    ("NR1D1", 1.308997),
    ("NR1D2", 1.570796),
    ("DBP", 2.617994),
    ("TEF", 2.748894),
    ("HLF", 2.879793),
    ("CIART", 1.570796),
    ("RORC", 4.450590),
    ("NFIL3", 5.235988),
    ("BHLHE41", 2.879793),
];

/// Cosinor fit of one reference gene against the predicted phases
#[derive(Debug, Clone, Serialize)]
pub struct GeneAcrophase {
    pub symbol: String,
    /// Published acrophase, radians
    pub reference: f64,
    /// Acrophase fitted on the predicted phases, radians
    pub fitted: f64,
    pub amplitude: f64,
    pub r_squared: f64,
}

/// A fitted circle transform: optional reflection followed by a rotation
#[derive(Debug, Clone)]
pub struct Alignment {
    pub offset: f64,
    pub reflect: bool,
    /// Mean wrapped distance to the targets at the chosen transform
    pub mean_error: f64,
    /// Reference genes that entered the search (empty for sample-driven runs)
    pub genes: Vec<GeneAcrophase>,
}

impl Alignment {
    /// Apply the transform to one phase
    pub fn apply(&self, phi: f64) -> f64 {
        let base = if self.reflect { -phi } else { phi };
        phase::wrap_phase(base + self.offset)
    }

    /// Apply the transform to every phase
    pub fn apply_all(&self, phases: &[f64]) -> Vec<f64> {
        phases.iter().map(|&phi| self.apply(phi)).collect()
    }
}

/// Mean wrapped error of `(source, target)` pairs under a candidate transform
fn transform_error(pairs: &[(f64, f64)], offset: f64, reflect: bool) -> f64 {
    let total: f64 = pairs
        .iter()
        .map(|&(source, target)| {
            let base = if reflect { -source } else { source };
            phase::wrapped_distance(phase::wrap_phase(base + offset), target)
        })
        .sum();
    total / pairs.len() as f64
}

/// Grid search for the rotation (and optional reflection) minimizing the
/// mean wrapped error over the pairs
fn best_transform(pairs: &[(f64, f64)], grid_points: usize, allow_reflection: bool) -> (f64, bool, f64) {
    let mut best = (0.0, false, f64::INFINITY);
    let reflections: &[bool] = if allow_reflection {
        &[false, true]
    } else {
        &[false]
    };

    for &reflect in reflections {
        for step in 0..grid_points {
            let offset = step as f64 / grid_points as f64 * std::f64::consts::TAU;
            let error = transform_error(pairs, offset, reflect);
            if error < best.2 {
                best = (offset, reflect, error);
            }
        }
    }
    best
}

/// Fit cosinors for the reference genes present in the matrix. Genes under
/// the R² floor or named by `align_exclude_gene` are left out.
fn reference_gene_fits(
    expression: &ExpressionMatrix,
    phases: &[f64],
    config: &FitConfig,
) -> Result<Vec<GeneAcrophase>> {
    let mut fits = Vec::new();
    for &(symbol, reference) in REFERENCE_ACROPHASES {
        if symbol == config.align_exclude_gene {
            continue;
        }
        let Some(gene_idx) = expression.gene_index(symbol) else {
            continue;
        };

        let values: Vec<f64> = expression.gene_values(gene_idx).to_vec();
        let fit = match stats::fit_cosinor(phases, &values, config.sine_ridge) {
            Ok(fit) => fit,
            Err(e) => {
                log::debug!("Cosinor fit failed for reference gene {}: {}", symbol, e);
                continue;
            }
        };

        if fit.r_squared < config.align_min_r_squared {
            log::debug!(
                "Reference gene {} below R-squared floor ({:.3} < {:.3})",
                symbol,
                fit.r_squared,
                config.align_min_r_squared
            );
            continue;
        }

        fits.push(GeneAcrophase {
            symbol: symbol.to_string(),
            reference,
            fitted: fit.acrophase,
            amplitude: fit.amplitude,
            r_squared: fit.r_squared,
        });
    }
    Ok(fits)
}

/// Align fitted phases to the biological reference frame.
///
/// `expression` is the raw matrix the phases were fitted on and `phases`
/// the per-sample predictions, in matrix column order.
pub fn align_phases(
    expression: &ExpressionMatrix,
    phases: &[f64],
    config: &FitConfig,
) -> Result<Alignment> {
    if phases.len() != expression.n_samples() {
        return Err(CircaError::DimensionMismatch {
            expected: format!("{} phases", expression.n_samples()),
            got: format!("{} phases", phases.len()),
        });
    }

    // Sample-driven alignment takes precedence when the config carries it
    if !config.align_sample_ids.is_empty() {
        let mut pairs = Vec::new();
        for (id, &target) in config
            .align_sample_ids
            .iter()
            .zip(&config.align_collection_times)
        {
            match expression.sample_index(id) {
                Some(s) => pairs.push((phases[s], phase::wrap_phase(target))),
                None => log::warn!("Alignment sample '{}' not found in cohort", id),
            }
        }
        if pairs.is_empty() {
            return Err(CircaError::AlignmentFailed {
                reason: "None of the alignment samples are present in the cohort".to_string(),
            });
        }

        let (offset, reflect, mean_error) =
            best_transform(&pairs, config.align_grid_points, config.align_allow_reflection);
        log::info!(
            "Sample-driven alignment: offset {:.4} rad, reflect {}, mean error {:.4} rad",
            offset,
            reflect,
            mean_error
        );
        return Ok(Alignment {
            offset,
            reflect,
            mean_error,
            genes: Vec::new(),
        });
    }

    let fits = reference_gene_fits(expression, phases, config)?;
    if fits.len() < 2 {
        return Err(CircaError::AlignmentFailed {
            reason: format!(
                "Only {} reference gene(s) usable for alignment; at least 2 required",
                fits.len()
            ),
        });
    }

    let pairs: Vec<(f64, f64)> = fits.iter().map(|f| (f.fitted, f.reference)).collect();
    let (offset, reflect, mean_error) =
        best_transform(&pairs, config.align_grid_points, config.align_allow_reflection);

    log::info!(
        "Gene-driven alignment over {} reference genes: offset {:.4} rad, reflect {}, mean error {:.4} rad",
        fits.len(),
        offset,
        reflect,
        mean_error
    );

    Ok(Alignment {
        offset,
        reflect,
        mean_error,
        genes: fits,
    })
}

/// Write the per-gene alignment table
pub fn write_gene_stats_csv<P: AsRef<Path>>(path: P, genes: &[GeneAcrophase]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for gene in genes {
        writer.serialize(gene)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::f64::consts::TAU;

    /// Build a cohort whose reference genes peak exactly at their published
    /// acrophases, observed through phases rotated by `rotation`
    fn rotated_cohort(rotation: f64, reflect: bool) -> (ExpressionMatrix, Vec<f64>) {
        let n = 48;
        let true_phases: Vec<f64> = (0..n).map(|s| s as f64 / n as f64 * TAU).collect();
        let observed: Vec<f64> = true_phases
            .iter()
            .map(|&phi| {
                let base = if reflect { -phi } else { phi };
                phase::wrap_phase(base - rotation)
            })
            .collect();

        let symbols: Vec<String> = REFERENCE_ACROPHASES
            .iter()
            .map(|&(s, _)| s.to_string())
            .collect();
        let values = Array2::from_shape_fn((symbols.len(), n), |(g, s)| {
            let acro = REFERENCE_ACROPHASES[g].1;
            (true_phases[s] - acro).cos() * 2.0 + 5.0
        });
        let sample_ids: Vec<String> = (0..n).map(|s| format!("s{}", s)).collect();
        let expression = ExpressionMatrix::new(values, symbols, sample_ids).unwrap();
        (expression, observed)
    }

    #[test]
    fn test_alignment_recovers_rotation() {
        let rotation = 1.3;
        let (expression, observed) = rotated_cohort(rotation, false);
        let config = FitConfig::default();

        let alignment = align_phases(&expression, &observed, &config).unwrap();
        assert!(!alignment.reflect);
        assert!(alignment.mean_error < 0.05);

        // applying the alignment restores the true phases
        let restored = alignment.apply_all(&observed);
        for (s, &phi) in restored.iter().enumerate() {
            let truth = s as f64 / 48.0 * TAU;
            assert!(
                phase::wrapped_distance(phi, truth) < 0.05,
                "sample {}: {} vs {}",
                s,
                phi,
                truth
            );
        }
    }

    #[test]
    fn test_alignment_detects_reflection() {
        let (expression, observed) = rotated_cohort(0.4, true);
        let config = FitConfig::default();

        let alignment = align_phases(&expression, &observed, &config).unwrap();
        assert!(alignment.reflect);
        assert!(alignment.mean_error < 0.05);
    }

    #[test]
    fn test_excluded_gene_left_out() {
        let (expression, observed) = rotated_cohort(0.0, false);
        let config = FitConfig::default();

        let alignment = align_phases(&expression, &observed, &config).unwrap();
        assert!(alignment.genes.iter().all(|g| g.symbol != "RORC"));
        assert!(!alignment.genes.is_empty());
    }

    #[test]
    fn test_sample_driven_alignment() {
        let (expression, observed) = rotated_cohort(0.9, false);
        let true_phase = |s: usize| s as f64 / 48.0 * TAU;
        let config = FitConfig {
            align_sample_ids: vec!["s0".to_string(), "s12".to_string(), "s24".to_string()],
            align_collection_times: vec![true_phase(0), true_phase(12), true_phase(24)],
            ..FitConfig::default()
        };

        let alignment = align_phases(&expression, &observed, &config).unwrap();
        assert!(alignment.genes.is_empty());
        assert!(alignment.mean_error < 0.05);
        let restored = alignment.apply(observed[12]);
        assert!(phase::wrapped_distance(restored, true_phase(12)) < 0.05);
    }

    #[test]
    fn test_too_few_reference_genes_fails() {
        let values = Array2::from_shape_fn((1, 10), |(_, s)| s as f64);
        let expression = ExpressionMatrix::new(
            values,
            vec!["NOT_A_CLOCK_GENE".to_string()],
            (0..10).map(|s| format!("s{}", s)).collect(),
        )
        .unwrap();
        let phases: Vec<f64> = (0..10).map(|s| s as f64 / 10.0 * TAU).collect();
        let config = FitConfig::default();
        assert!(align_phases(&expression, &phases, &config).is_err());
    }
}
