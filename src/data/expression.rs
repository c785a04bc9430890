//! Expression matrix representation for transcriptomic data

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{CircaError, Result};

/// Deduplicate names by appending _1, _2, etc. to duplicates
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());
    for name in &names {
        *seen.entry(name.clone()).or_insert(0) += 1;
    }
    // Only process if there are duplicates
    let has_dups = seen.values().any(|&c| c > 1);
    if !has_dups {
        return names;
    }
    seen.clear();
    for name in names {
        let count = seen.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            result.push(name);
        } else {
            let new_name = format!("{}_{}", name, *count - 1);
            log::warn!("Duplicate gene symbol '{}' renamed to '{}'", name, new_name);
            result.push(new_name);
        }
    }
    result
}

/// A gene expression matrix.
/// Rows are genes, columns are samples.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// Expression values (genes x samples)
    values: Array2<f64>,
    /// Gene symbols
    gene_symbols: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new expression matrix from raw data
    pub fn new(
        values: Array2<f64>,
        gene_symbols: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_genes, n_samples) = values.dim();

        if gene_symbols.len() != n_genes {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} gene symbols", n_genes),
                got: format!("{} gene symbols", gene_symbols.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(CircaError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if values.iter().any(|&x| x.is_nan() || x.is_infinite()) {
            return Err(CircaError::InvalidExpressionMatrix {
                reason: "Expression values must be finite".to_string(),
            });
        }

        let gene_symbols = deduplicate_names(gene_symbols);

        Ok(Self {
            values,
            gene_symbols,
            sample_ids,
        })
    }

    /// Get the number of genes
    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    /// Get the expression values as a view
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    /// Get mutable reference to the expression values
    pub fn values_mut(&mut self) -> &mut Array2<f64> {
        &mut self.values
    }

    /// Consume and return the underlying array
    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Get gene symbols
    pub fn gene_symbols(&self) -> &[String] {
        &self.gene_symbols
    }

    /// Get sample IDs
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get expression for a specific gene
    pub fn gene_values(&self, gene_idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(gene_idx)
    }

    /// Get expression for a specific sample
    pub fn sample_values(&self, sample_idx: usize) -> ArrayView1<'_, f64> {
        self.values.column(sample_idx)
    }

    /// Get gene index by symbol
    pub fn gene_index(&self, gene_symbol: &str) -> Option<usize> {
        self.gene_symbols.iter().position(|id| id == gene_symbol)
    }

    /// Get sample index by ID
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Subset to specific samples
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        if sample_indices.iter().any(|&i| i >= self.n_samples()) {
            return Err(CircaError::InvalidInput {
                reason: "Sample index out of bounds".to_string(),
            });
        }
        let new_values = self.values.select(Axis(1), sample_indices);
        let new_sample_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        Self::new(new_values, self.gene_symbols.clone(), new_sample_ids)
    }

    /// Subset to specific genes
    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        if gene_indices.is_empty() {
            return Err(CircaError::EmptyData {
                reason: "Gene subset is empty".to_string(),
            });
        }
        if gene_indices.iter().any(|&i| i >= self.n_genes()) {
            return Err(CircaError::InvalidInput {
                reason: "Gene index out of bounds".to_string(),
            });
        }
        let new_values = self.values.select(Axis(0), gene_indices);
        let new_gene_symbols: Vec<String> = gene_indices
            .iter()
            .map(|&i| self.gene_symbols[i].clone())
            .collect();

        Self::new(new_values, new_gene_symbols, self.sample_ids.clone())
    }

    /// Subset to the named genes, in the given order, skipping symbols that
    /// are absent from the matrix. Errors only when none match.
    pub fn subset_by_symbols(&self, symbols: &[String]) -> Result<Self> {
        let mut indices = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.gene_index(symbol) {
                Some(idx) => indices.push(idx),
                None => log::debug!("Gene '{}' not found in expression matrix", symbol),
            }
        }
        if indices.is_empty() {
            return Err(CircaError::EmptyData {
                reason: "None of the requested genes are present in the matrix".to_string(),
            });
        }
        if indices.len() < symbols.len() {
            log::warn!(
                "{} of {} requested genes found in expression matrix",
                indices.len(),
                symbols.len()
            );
        }
        self.subset_genes(&indices)
    }
}
