//! Per-sample metadata: collection times and discontinuous covariates

use std::collections::HashMap;

use crate::error::{CircaError, Result};

/// Check that alignment sample ids and collection times agree in length.
///
/// Both lists empty means "no alignment metadata" and passes. If either is
/// non-empty the lengths must match exactly; anything else is a fatal
/// configuration error, raised before any data is read.
pub fn check_alignment_lengths(sample_ids: &[String], collection_times: &[f64]) -> Result<()> {
    if sample_ids.len() + collection_times.len() > 0 && sample_ids.len() != collection_times.len() {
        return Err(CircaError::InvalidConfig {
            reason: format!(
                "align_sample_ids ({}) and align_collection_times ({}) must have equal lengths",
                sample_ids.len(),
                collection_times.len()
            ),
        });
    }
    Ok(())
}

/// Sample-level annotations parsed from covariate rows of the expression CSV.
///
/// Collection times are stored in hours and may be missing per sample;
/// a fully supervised dataset has a time for every sample.
#[derive(Debug, Clone, Default)]
pub struct SampleMetadata {
    /// Sample identifiers, in matrix column order
    sample_ids: Vec<String>,
    /// Collection time in hours for each sample, where known
    collection_times: Vec<Option<f64>>,
    /// Cell type (or other discontinuous group label) for each sample
    celltypes: Vec<Option<String>>,
}

impl SampleMetadata {
    pub fn new(
        sample_ids: Vec<String>,
        collection_times: Vec<Option<f64>>,
        celltypes: Vec<Option<String>>,
    ) -> Result<Self> {
        let n = sample_ids.len();
        if collection_times.len() != n {
            return Err(CircaError::InvalidMetadata {
                reason: format!(
                    "{} collection times for {} samples",
                    collection_times.len(),
                    n
                ),
            });
        }
        if celltypes.len() != n {
            return Err(CircaError::InvalidMetadata {
                reason: format!("{} cell type labels for {} samples", celltypes.len(), n),
            });
        }
        for (id, t) in sample_ids.iter().zip(&collection_times) {
            if let Some(t) = t {
                if !t.is_finite() {
                    return Err(CircaError::InvalidMetadata {
                        reason: format!("Non-finite collection time for sample '{}'", id),
                    });
                }
            }
        }
        Ok(Self {
            sample_ids,
            collection_times,
            celltypes,
        })
    }

    /// Metadata with no annotations for the given samples
    pub fn unannotated(sample_ids: Vec<String>) -> Self {
        let n = sample_ids.len();
        Self {
            sample_ids,
            collection_times: vec![None; n],
            celltypes: vec![None; n],
        }
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Collection time in hours for one sample
    pub fn collection_time(&self, sample_idx: usize) -> Option<f64> {
        self.collection_times.get(sample_idx).copied().flatten()
    }

    pub fn collection_times(&self) -> &[Option<f64>] {
        &self.collection_times
    }

    pub fn celltype(&self, sample_idx: usize) -> Option<&str> {
        self.celltypes
            .get(sample_idx)
            .and_then(|c| c.as_deref())
    }

    /// True when every sample carries a collection time
    pub fn fully_timed(&self) -> bool {
        !self.collection_times.is_empty() && self.collection_times.iter().all(|t| t.is_some())
    }

    /// Number of samples with a known collection time
    pub fn n_timed(&self) -> usize {
        self.collection_times.iter().filter(|t| t.is_some()).count()
    }

    /// Distinct cell type labels, in first-seen order
    pub fn celltype_levels(&self) -> Vec<String> {
        let mut levels = Vec::new();
        for c in self.celltypes.iter().flatten() {
            if !levels.contains(c) {
                levels.push(c.clone());
            }
        }
        levels
    }

    /// Sample indices per cell type level. Samples without a label go under
    /// the empty-string key.
    pub fn celltype_groups(&self) -> HashMap<String, Vec<usize>> {
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, c) in self.celltypes.iter().enumerate() {
            let key = c.clone().unwrap_or_default();
            groups.entry(key).or_default().push(idx);
        }
        groups
    }

    /// Subset to specific samples, preserving order
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        if sample_indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(CircaError::InvalidInput {
                reason: "Sample index out of bounds".to_string(),
            });
        }
        Ok(Self {
            sample_ids: sample_indices
                .iter()
                .map(|&i| self.sample_ids[i].clone())
                .collect(),
            collection_times: sample_indices
                .iter()
                .map(|&i| self.collection_times[i])
                .collect(),
            celltypes: sample_indices
                .iter()
                .map(|&i| self.celltypes[i].clone())
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_lengths_both_empty_passes() {
        assert!(check_alignment_lengths(&[], &[]).is_ok());
    }

    #[test]
    fn test_alignment_lengths_matched_passes() {
        let ids = vec!["s1".to_string(), "s2".to_string()];
        assert!(check_alignment_lengths(&ids, &[0.0, 1.5]).is_ok());
    }

    #[test]
    fn test_alignment_lengths_ids_only_fails() {
        let ids = vec!["s1".to_string()];
        assert!(check_alignment_lengths(&ids, &[]).is_err());
    }

    #[test]
    fn test_alignment_lengths_times_only_fails() {
        assert!(check_alignment_lengths(&[], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_alignment_lengths_mismatched_fails() {
        let ids = vec!["s1".to_string(), "s2".to_string(), "s3".to_string()];
        assert!(check_alignment_lengths(&ids, &[1.0, 2.0]).is_err());
    }

    fn example_metadata() -> SampleMetadata {
        SampleMetadata::new(
            vec!["s1".to_string(), "s2".to_string(), "s3".to_string()],
            vec![Some(0.0), Some(6.0), None],
            vec![
                Some("neuron".to_string()),
                Some("glia".to_string()),
                Some("neuron".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_timed_counts() {
        let meta = example_metadata();
        assert_eq!(meta.n_timed(), 2);
        assert!(!meta.fully_timed());
    }

    #[test]
    fn test_celltype_groups() {
        let meta = example_metadata();
        let groups = meta.celltype_groups();
        assert_eq!(groups["neuron"], vec![0, 2]);
        assert_eq!(groups["glia"], vec![1]);
    }

    #[test]
    fn test_subset_preserves_annotations() {
        let meta = example_metadata();
        let sub = meta.subset_samples(&[2, 0]).unwrap();
        assert_eq!(sub.sample_ids(), &["s3".to_string(), "s1".to_string()]);
        assert_eq!(sub.collection_time(0), None);
        assert_eq!(sub.collection_time(1), Some(0.0));
        assert_eq!(sub.celltype(0), Some("neuron"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = SampleMetadata::new(
            vec!["s1".to_string(), "s2".to_string()],
            vec![Some(0.0)],
            vec![None, None],
        );
        assert!(result.is_err());
    }
}
