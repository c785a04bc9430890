//! Result containers and CSV/JSON writers for fitted phases

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::SampleMetadata;
use crate::error::{CircaError, Result};
use crate::phase;
use crate::stats;

/// One row of the detailed predictions table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhasePrediction {
    pub sample_id: String,
    /// Predicted phase in radians, [0, 2*pi)
    pub phase_radians: f64,
    /// Predicted phase converted to hours on the configured period
    pub phase_hours: f64,
    /// Known collection time in hours, when present in the metadata
    pub collection_time_hours: Option<f64>,
    /// Absolute wrapped error in hours, when a collection time is known
    pub error_hours: Option<f64>,
    pub celltype: Option<String>,
}

/// Accuracy summary over the samples with known collection times
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub n_samples: usize,
    pub n_evaluated: usize,
    pub mean_error_hours: f64,
    pub median_error_hours: f64,
    /// Circular correlation between predicted and known phases
    pub circular_rho: f64,
    pub circular_p_value: f64,
    pub frac_within_1h: f64,
    pub frac_within_2h: f64,
    pub frac_within_3h: f64,
    pub frac_within_6h: f64,
}

/// Fitted phases for a cohort, with everything needed to report accuracy
#[derive(Debug, Clone)]
pub struct PhaseResults {
    predictions: Vec<PhasePrediction>,
    period_hours: f64,
}

impl PhaseResults {
    /// Assemble per-sample predictions from fitted phases and metadata
    pub fn from_phases(
        phases: &[f64],
        metadata: &SampleMetadata,
        period_hours: f64,
    ) -> Result<Self> {
        if phases.len() != metadata.n_samples() {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} phases", metadata.n_samples()),
                got: format!("{} phases", phases.len()),
            });
        }

        let predictions = phases
            .iter()
            .enumerate()
            .map(|(i, &phi)| {
                let collection_time = metadata.collection_time(i);
                let error_hours = collection_time.map(|t| {
                    let known = phase::time_to_phase(t, period_hours);
                    phase::wrapped_distance(phi, known) * period_hours
                        / (2.0 * std::f64::consts::PI)
                });
                PhasePrediction {
                    sample_id: metadata.sample_ids()[i].clone(),
                    phase_radians: phi,
                    phase_hours: phase::phase_to_hours(phi, period_hours),
                    collection_time_hours: collection_time,
                    error_hours,
                    celltype: metadata.celltype(i).map(str::to_string),
                }
            })
            .collect();

        Ok(Self {
            predictions,
            period_hours,
        })
    }

    pub fn predictions(&self) -> &[PhasePrediction] {
        &self.predictions
    }

    pub fn phases(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.phase_radians).collect()
    }

    /// Accuracy summary; error stats are NaN when no sample carries a time
    pub fn summary(&self) -> PhaseSummary {
        let errors: Vec<f64> = self
            .predictions
            .iter()
            .filter_map(|p| p.error_hours)
            .collect();
        let n_evaluated = errors.len();

        let frac_within = |threshold: f64| {
            if n_evaluated == 0 {
                return f64::NAN;
            }
            errors.iter().filter(|&&e| e <= threshold).count() as f64 / n_evaluated as f64
        };

        let (rho, p_value) = {
            let pairs: Vec<(f64, f64)> = self
                .predictions
                .iter()
                .filter_map(|p| {
                    p.collection_time_hours.map(|t| {
                        (p.phase_radians, phase::time_to_phase(t, self.period_hours))
                    })
                })
                .collect();
            if pairs.len() >= 3 {
                let predicted: Vec<f64> = pairs.iter().map(|&(a, _)| a).collect();
                let known: Vec<f64> = pairs.iter().map(|&(_, b)| b).collect();
                match stats::circular_correlation(&predicted, &known) {
                    Ok(corr) => (corr.rho, corr.p_value),
                    Err(_) => (f64::NAN, f64::NAN),
                }
            } else {
                (f64::NAN, f64::NAN)
            }
        };

        PhaseSummary {
            n_samples: self.predictions.len(),
            n_evaluated,
            mean_error_hours: if n_evaluated > 0 {
                stats::mean(&errors)
            } else {
                f64::NAN
            },
            median_error_hours: stats::percentile(&errors, 50.0),
            circular_rho: rho,
            circular_p_value: p_value,
            frac_within_1h: frac_within(1.0),
            frac_within_2h: frac_within(2.0),
            frac_within_3h: frac_within(3.0),
            frac_within_6h: frac_within(6.0),
        }
    }

    /// Write the detailed predictions table
    pub fn write_detailed_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for prediction in &self.predictions {
            writer.serialize(prediction)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the two-column sample_id / phase table
    pub fn write_simple_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["sample_id", "phase_radians"])?;
        for prediction in &self.predictions {
            writer.write_record([
                prediction.sample_id.as_str(),
                &format!("{:.6}", prediction.phase_radians),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the accuracy summary as JSON
    pub fn write_summary_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.summary())?;
        Ok(())
    }
}

/// Write the per-epoch training loss trace
pub fn write_loss_trace_csv<P: AsRef<Path>>(path: P, losses: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["epoch", "total_loss"])?;
    for (epoch, loss) in losses.iter().enumerate() {
        writer.write_record([&epoch.to_string(), &format!("{:.8}", loss)])?;
    }
    writer.flush()?;
    Ok(())
}
