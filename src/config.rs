//! Flat configuration record for the fitting pipeline
//!
//! `FitConfig` is the single option surface consumed by every stage: CSV
//! parsing, preprocessing, eigengene extraction, training, prediction,
//! alignment and cross-validation. It deserializes from JSON with per-field
//! defaults so partial config files work, and `validate()` is called before
//! any file is touched.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::check_alignment_lengths;
use crate::error::{CircaError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    // -- input conventions -------------------------------------------------
    /// Name of the first (gene symbol) column in expression CSVs
    pub gene_symbol_column: String,
    /// Regex for rows carrying continuous covariates (e.g. "time_C")
    pub continuous_covariate_pattern: String,
    /// Regex for rows carrying discontinuous covariates (e.g. "celltype_D")
    pub discontinuous_covariate_pattern: String,
    /// Covariate row holding per-sample collection times, in hours
    pub time_covariate_row: String,
    /// Covariate row holding per-sample cell types
    pub celltype_covariate_row: String,

    // -- preprocessing -----------------------------------------------------
    /// Clip each gene's expression at the outlier percentiles
    pub clip_outliers: bool,
    /// Upper clipping percentile; the lower bound is (100 - p)
    pub clip_percentile: f64,
    /// Drop genes whose coefficient of variation falls outside bounds
    pub cv_filter: bool,
    /// Minimum coefficient of variation for gene inclusion
    pub cv_min: f64,
    /// Maximum coefficient of variation for gene inclusion
    pub cv_max: f64,
    /// log(1 + x / offset) transform before scaling
    pub log_transform: bool,
    /// Offset for the log transform
    pub log_offset: f64,
    /// Per-gene standardization to zero mean / unit variance
    pub standardize: bool,

    // -- eigengene extraction ----------------------------------------------
    /// Number of genes kept by SVD importance ranking
    pub n_components: usize,
    /// Minimum fraction of total variance for a retained eigengene
    pub eigen_min_variance_frac: f64,
    /// Cumulative variance fraction after which no more eigengenes are kept
    pub eigen_total_variance_frac: f64,
    /// Hard cap on the number of retained eigengenes
    pub eigen_max_components: usize,
    /// Maximum Jacobi sweeps for the eigendecomposition
    pub svd_max_sweeps: usize,
    /// Off-diagonal convergence tolerance for the eigendecomposition
    pub svd_tolerance: f64,

    // -- sample balancing --------------------------------------------------
    /// Cap the cohort to this many samples with a seeded random subset.
    /// 0 or any value at or above the cohort size leaves it unchanged.
    pub max_samples: usize,
    /// Seed for all randomized steps
    pub random_seed: u64,

    // -- training ----------------------------------------------------------
    /// Number of training epochs per ensemble member
    pub num_epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Adam first-moment decay
    pub adam_beta1: f64,
    /// Adam second-moment decay
    pub adam_beta2: f64,
    /// Adam epsilon
    pub adam_epsilon: f64,
    /// Epochs between learning-rate decays
    pub lr_step_size: usize,
    /// Multiplicative learning-rate decay factor
    pub lr_gamma: f64,
    /// Weight of the reconstruction loss
    pub lambda_recon: f64,
    /// Weight of the collection-time supervision loss
    pub lambda_time: f64,
    /// Weight of the sine (cosinor) prior loss
    pub lambda_sine: f64,
    /// Ridge term for the cosinor prior fit
    pub sine_ridge: f64,
    /// Minimum samples per (cell type) group for the cosinor prior
    pub min_samples_per_group: usize,
    /// Number of independently seeded models; the best survives
    pub ensemble_size: usize,
    /// Standard deviation of the normal weight initialization
    pub weight_init_std: f64,
    /// Expected cycle length in hours
    pub period_hours: f64,

    // -- alignment ---------------------------------------------------------
    /// Rotation offsets tried during the alignment grid search
    pub align_grid_points: usize,
    /// Whether the search may also reflect the phase direction
    pub align_allow_reflection: bool,
    /// Reference gene excluded from the acrophase arrays
    pub align_exclude_gene: String,
    /// Minimum cosinor R² for a reference gene to enter alignment
    pub align_min_r_squared: f64,
    /// Optional alignment sample ids (parallel to align_collection_times)
    pub align_sample_ids: Vec<String>,
    /// Optional alignment collection times, in radians
    pub align_collection_times: Vec<f64>,

    // -- cross-validation --------------------------------------------------
    /// Run k-fold cross-validation after fitting
    pub cv_enabled: bool,
    /// Number of folds
    pub cv_folds: usize,
    /// Shuffle samples (seeded) before splitting into folds
    pub cv_shuffle: bool,

    // -- output / runtime --------------------------------------------------
    /// Directory for all written artifacts. Populated just before the final
    /// calls when driven from the CLI.
    pub output_dir: String,
    /// Path of the persisted model bundle. Populated alongside output_dir.
    pub model_path: String,
    /// Worker threads for the rayon pool; 0 sizes it to the CPU count
    pub threads: usize,
    /// Decimal places in written matrices
    pub out_precision: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            gene_symbol_column: "Gene_Symbol".to_string(),
            continuous_covariate_pattern: "_C$".to_string(),
            discontinuous_covariate_pattern: "_D$".to_string(),
            time_covariate_row: "time_C".to_string(),
            celltype_covariate_row: "celltype_D".to_string(),

            clip_outliers: true,
            clip_percentile: 97.5,
            cv_filter: false,
            cv_min: 0.14,
            cv_max: 0.7,
            log_transform: false,
            log_offset: 1.0,
            standardize: true,

            n_components: 50,
            eigen_min_variance_frac: 0.03,
            eigen_total_variance_frac: 0.97,
            eigen_max_components: 30,
            svd_max_sweeps: 100,
            svd_tolerance: 1e-10,

            max_samples: 0,
            random_seed: 42,

            num_epochs: 100,
            learning_rate: 1e-3,
            adam_beta1: 0.9,
            adam_beta2: 0.999,
            adam_epsilon: 1e-8,
            lr_step_size: 500,
            lr_gamma: 0.5,
            lambda_recon: 1.0,
            lambda_time: 0.5,
            lambda_sine: 0.5,
            sine_ridge: 0.01,
            min_samples_per_group: 5,
            ensemble_size: 5,
            weight_init_std: 0.1,
            period_hours: 24.0,

            align_grid_points: 720,
            align_allow_reflection: true,
            align_exclude_gene: "RORC".to_string(),
            align_min_r_squared: 0.1,
            align_sample_ids: Vec::new(),
            align_collection_times: Vec::new(),

            cv_enabled: false,
            cv_folds: 5,
            cv_shuffle: true,

            output_dir: "./results".to_string(),
            model_path: String::new(),
            threads: 0,
            out_precision: 6,
        }
    }
}

impl FitConfig {
    /// Load a config from a JSON file; missing keys fall back to defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: FitConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Write the full config (defaults included) to a JSON file
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Check option ranges and cross-field invariants.
    ///
    /// Must run before any file-dependent work: the alignment metadata
    /// length check in particular is a fatal configuration error.
    pub fn validate(&self) -> Result<()> {
        check_alignment_lengths(&self.align_sample_ids, &self.align_collection_times)?;

        if !(50.0..100.0).contains(&self.clip_percentile) {
            return Err(CircaError::InvalidConfig {
                reason: format!(
                    "clip_percentile must be in [50, 100), got {}",
                    self.clip_percentile
                ),
            });
        }
        if self.cv_filter && (self.cv_min < 0.0 || self.cv_min >= self.cv_max) {
            return Err(CircaError::InvalidConfig {
                reason: format!(
                    "cv bounds must satisfy 0 <= cv_min < cv_max, got [{}, {}]",
                    self.cv_min, self.cv_max
                ),
            });
        }
        if self.n_components < 2 {
            return Err(CircaError::InvalidConfig {
                reason: "n_components must be at least 2".to_string(),
            });
        }
        if self.eigen_max_components < 2 {
            return Err(CircaError::InvalidConfig {
                reason: "eigen_max_components must be at least 2".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.eigen_min_variance_frac)
            || !(0.0..=1.0).contains(&self.eigen_total_variance_frac)
        {
            return Err(CircaError::InvalidConfig {
                reason: "eigen variance fractions must lie in [0, 1]".to_string(),
            });
        }
        if self.learning_rate <= 0.0 {
            return Err(CircaError::InvalidConfig {
                reason: format!("learning_rate must be positive, got {}", self.learning_rate),
            });
        }
        for (name, beta) in [("adam_beta1", self.adam_beta1), ("adam_beta2", self.adam_beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(CircaError::InvalidConfig {
                    reason: format!("{} must lie in [0, 1), got {}", name, beta),
                });
            }
        }
        if self.lr_step_size == 0 || self.lr_gamma <= 0.0 || self.lr_gamma > 1.0 {
            return Err(CircaError::InvalidConfig {
                reason: "lr_step_size must be > 0 and lr_gamma in (0, 1]".to_string(),
            });
        }
        if self.lambda_recon < 0.0 || self.lambda_time < 0.0 || self.lambda_sine < 0.0 {
            return Err(CircaError::InvalidConfig {
                reason: "loss weights must be non-negative".to_string(),
            });
        }
        if self.ensemble_size == 0 {
            return Err(CircaError::InvalidConfig {
                reason: "ensemble_size must be at least 1".to_string(),
            });
        }
        if self.weight_init_std <= 0.0 {
            return Err(CircaError::InvalidConfig {
                reason: "weight_init_std must be positive".to_string(),
            });
        }
        if self.period_hours <= 0.0 {
            return Err(CircaError::InvalidConfig {
                reason: format!("period_hours must be positive, got {}", self.period_hours),
            });
        }
        if self.align_grid_points == 0 {
            return Err(CircaError::InvalidConfig {
                reason: "align_grid_points must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.align_min_r_squared) {
            return Err(CircaError::InvalidConfig {
                reason: "align_min_r_squared must lie in [0, 1]".to_string(),
            });
        }
        if self.cv_enabled && self.cv_folds < 2 {
            return Err(CircaError::InvalidConfig {
                reason: format!("cv_folds must be at least 2, got {}", self.cv_folds),
            });
        }

        // Compile early so pattern errors surface as config errors
        regex::Regex::new(&self.continuous_covariate_pattern)?;
        regex::Regex::new(&self.discontinuous_covariate_pattern)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        assert!(FitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_alignment_guard_both_empty_passes() {
        let config = FitConfig::default();
        assert!(config.align_sample_ids.is_empty());
        assert!(config.align_collection_times.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_alignment_guard_matched_lengths_pass() {
        let config = FitConfig {
            align_sample_ids: vec!["s1".to_string(), "s2".to_string()],
            align_collection_times: vec![1.0, 2.0],
            ..FitConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_alignment_guard_ids_without_times_fails() {
        let config = FitConfig {
            align_sample_ids: vec!["s1".to_string()],
            align_collection_times: vec![],
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_alignment_guard_mismatched_lengths_fails() {
        let config = FitConfig {
            align_sample_ids: vec!["s1".to_string(), "s2".to_string()],
            align_collection_times: vec![1.0],
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_percentile_rejected() {
        let config = FitConfig {
            clip_percentile: 30.0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_regex_rejected() {
        let config = FitConfig {
            continuous_covariate_pattern: "[".to_string(),
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ensemble_rejected() {
        let config = FitConfig {
            ensemble_size: 0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_lr_gamma_rejected() {
        let config = FitConfig {
            lr_gamma: 0.0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FitConfig {
            lr_gamma: 1.0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cv_single_fold_rejected() {
        let config = FitConfig {
            cv_enabled: true,
            cv_folds: 1,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"n_components": 20, "lambda_sine": 0.1}}"#).unwrap();
        let config = FitConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.n_components, 20);
        assert!((config.lambda_sine - 0.1).abs() < 1e-12);
        assert_eq!(config.num_epochs, 100);
        assert!((config.period_hours - 24.0).abs() < 1e-12);
        assert_eq!(config.align_exclude_gene, "RORC");
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = FitConfig::default();
        config.random_seed = 7;
        config.align_sample_ids = vec!["a".to_string()];
        config.align_collection_times = vec![0.5];
        let file = NamedTempFile::new().unwrap();
        config.to_json_file(file.path()).unwrap();
        let reread = FitConfig::from_json_file(file.path()).unwrap();
        assert_eq!(reread.random_seed, 7);
        assert_eq!(reread.align_sample_ids, vec!["a".to_string()]);
        assert!((reread.align_collection_times[0] - 0.5).abs() < 1e-12);
    }
}
