//! CSV reading and writing for expression matrices and gene lists

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use ndarray::Array2;
use regex::Regex;

use crate::config::FitConfig;
use crate::data::{ExpressionMatrix, SampleMetadata};
use crate::error::{CircaError, Result};

/// Strip surrounding quotes from a string
fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn parse_optional_time(field: &str) -> Result<Option<f64>> {
    let field = strip_quotes(field);
    if field.is_empty() || field.eq_ignore_ascii_case("na") || field.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let value = field
        .parse::<f64>()
        .map_err(|_| CircaError::InvalidMetadata {
            reason: format!("Invalid collection time: {}", field),
        })?;
    Ok(Some(value))
}

/// Read an expression CSV with embedded covariate rows.
///
/// Expected format: the first column holds gene symbols (header named by
/// `gene_symbol_column`), remaining columns are samples. Rows whose symbol
/// matches the continuous or discontinuous covariate pattern are split off
/// into sample metadata instead of the matrix; the collection-time row
/// (hours) and the cell-type row are recognized by name.
pub fn read_expression_csv<P: AsRef<Path>>(
    path: P,
    config: &FitConfig,
) -> Result<(ExpressionMatrix, SampleMetadata)> {
    let continuous_re = Regex::new(&config.continuous_covariate_pattern)?;
    let discontinuous_re = Regex::new(&config.discontinuous_covariate_pattern)?;

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header_line = lines.next().ok_or_else(|| CircaError::EmptyData {
        reason: "Empty expression CSV".to_string(),
    })??;

    // Detect delimiter
    let delimiter = if header_line.contains('\t') { '\t' } else { ',' };

    let header: Vec<&str> = header_line.split(delimiter).collect();
    if header.len() < 2 {
        return Err(CircaError::InvalidExpressionMatrix {
            reason: "Not enough columns in header".to_string(),
        });
    }
    let first_column = strip_quotes(header[0]);
    if !first_column.is_empty() && first_column != config.gene_symbol_column {
        log::warn!(
            "First column is '{}', expected '{}'",
            first_column,
            config.gene_symbol_column
        );
    }

    let sample_ids: Vec<String> = header[1..].iter().map(|s| strip_quotes(s)).collect();
    let n_samples = sample_ids.len();

    let mut gene_symbols: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut collection_times: Option<Vec<Option<f64>>> = None;
    let mut celltypes: Option<Vec<Option<String>>> = None;

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != n_samples + 1 {
            return Err(CircaError::InvalidExpressionMatrix {
                reason: format!(
                    "Row has {} columns, expected {}",
                    fields.len(),
                    n_samples + 1
                ),
            });
        }

        let symbol = strip_quotes(fields[0]);

        if continuous_re.is_match(&symbol) {
            if symbol == config.time_covariate_row {
                let times: Result<Vec<Option<f64>>> =
                    fields[1..].iter().map(|f| parse_optional_time(f)).collect();
                collection_times = Some(times?);
            } else {
                log::debug!("Skipping unrecognized continuous covariate row '{}'", symbol);
            }
            continue;
        }

        if discontinuous_re.is_match(&symbol) {
            if symbol == config.celltype_covariate_row {
                let labels: Vec<Option<String>> = fields[1..]
                    .iter()
                    .map(|f| {
                        let value = strip_quotes(f);
                        if value.is_empty() || value.eq_ignore_ascii_case("na") {
                            None
                        } else {
                            Some(value)
                        }
                    })
                    .collect();
                celltypes = Some(labels);
            } else {
                log::debug!(
                    "Skipping unrecognized discontinuous covariate row '{}'",
                    symbol
                );
            }
            continue;
        }

        let row: Result<Vec<f64>> = fields[1..]
            .iter()
            .map(|s| {
                let val = strip_quotes(s);
                val.parse::<f64>()
                    .map_err(|_| CircaError::InvalidExpressionMatrix {
                        reason: format!("Invalid expression value for gene '{}': {}", symbol, val),
                    })
            })
            .collect();

        gene_symbols.push(symbol);
        rows.push(row?);
    }

    if gene_symbols.is_empty() {
        return Err(CircaError::EmptyData {
            reason: "No genes found in expression CSV".to_string(),
        });
    }

    let n_genes = gene_symbols.len();
    let mut values = Array2::zeros((n_genes, n_samples));
    for (i, row) in rows.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            values[[i, j]] = val;
        }
    }

    let metadata = SampleMetadata::new(
        sample_ids.clone(),
        collection_times.unwrap_or_else(|| vec![None; n_samples]),
        celltypes.unwrap_or_else(|| vec![None; n_samples]),
    )?;

    let expression = ExpressionMatrix::new(values, gene_symbols, sample_ids)?;
    log::info!(
        "Read {} genes x {} samples ({} timed)",
        expression.n_genes(),
        expression.n_samples(),
        metadata.n_timed()
    );

    Ok((expression, metadata))
}

/// Read a seed gene list: one symbol per line, or the first column of a
/// delimited file. A header row named like the gene symbol column is skipped.
pub fn read_seed_genes<P: AsRef<Path>>(path: P, config: &FitConfig) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut genes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let delimiter = if trimmed.contains('\t') { '\t' } else { ',' };
        let symbol = strip_quotes(trimmed.split(delimiter).next().unwrap_or(trimmed));
        if symbol.is_empty() || symbol == config.gene_symbol_column {
            continue;
        }
        genes.push(symbol);
    }

    if genes.is_empty() {
        return Err(CircaError::EmptyData {
            reason: "Seed gene list is empty".to_string(),
        });
    }
    Ok(genes)
}

/// Read a two-column sample_id / phase (radians) CSV, as written by the
/// simple predictions writer
pub fn read_phases_csv<P: AsRef<Path>>(path: P) -> Result<Vec<(String, f64)>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut phases = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let delimiter = if trimmed.contains('\t') { '\t' } else { ',' };
        let mut fields = trimmed.split(delimiter);
        let id = strip_quotes(fields.next().unwrap_or(""));
        let value = fields.next().map(strip_quotes).unwrap_or_default();

        if line_no == 0 && value.parse::<f64>().is_err() {
            // header row
            continue;
        }
        let phi = value.parse::<f64>().map_err(|_| CircaError::InvalidInput {
            reason: format!("Invalid phase value for sample '{}': {}", id, value),
        })?;
        phases.push((id, phi));
    }

    if phases.is_empty() {
        return Err(CircaError::EmptyData {
            reason: "Phase CSV contains no samples".to_string(),
        });
    }
    Ok(phases)
}

/// Write a genes x samples matrix to CSV, with a symbol column first
pub fn write_matrix_csv<P: AsRef<Path>>(
    path: P,
    values: &Array2<f64>,
    gene_symbols: &[String],
    sample_ids: &[String],
    symbol_header: &str,
    precision: usize,
) -> Result<()> {
    if values.nrows() != gene_symbols.len() || values.ncols() != sample_ids.len() {
        return Err(CircaError::DimensionMismatch {
            expected: format!("{} x {} labels", values.nrows(), values.ncols()),
            got: format!("{} x {} labels", gene_symbols.len(), sample_ids.len()),
        });
    }

    let mut file = File::create(path)?;
    writeln!(file, "{},{}", symbol_header, sample_ids.join(","))?;
    for (i, symbol) in gene_symbols.iter().enumerate() {
        let row: Vec<String> = values
            .row(i)
            .iter()
            .map(|v| format!("{:.*}", precision, v))
            .collect();
        writeln!(file, "{},{}", symbol, row.join(","))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_expression_with_covariate_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gene_Symbol,s1,s2,s3").unwrap();
        writeln!(file, "time_C,0,6,12").unwrap();
        writeln!(file, "celltype_D,neuron,glia,neuron").unwrap();
        writeln!(file, "ARNTL,1.5,2.5,3.5").unwrap();
        writeln!(file, "PER1,0.5,1.0,1.5").unwrap();

        let config = FitConfig::default();
        let (matrix, metadata) = read_expression_csv(file.path(), &config).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.gene_symbols(), &["ARNTL".to_string(), "PER1".to_string()]);
        assert_eq!(metadata.collection_time(1), Some(6.0));
        assert_eq!(metadata.celltype(1), Some("glia"));
        assert!(metadata.fully_timed());
    }

    #[test]
    fn test_read_expression_missing_times() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gene_Symbol,s1,s2").unwrap();
        writeln!(file, "time_C,3.5,NA").unwrap();
        writeln!(file, "CRY1,1.0,2.0").unwrap();

        let config = FitConfig::default();
        let (_, metadata) = read_expression_csv(file.path(), &config).unwrap();
        assert_eq!(metadata.collection_time(0), Some(3.5));
        assert_eq!(metadata.collection_time(1), None);
        assert!(!metadata.fully_timed());
    }

    #[test]
    fn test_read_expression_tab_delimited() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gene_Symbol\ts1\ts2").unwrap();
        writeln!(file, "NR1D1\t5.0\t6.0").unwrap();

        let config = FitConfig::default();
        let (matrix, metadata) = read_expression_csv(file.path(), &config).unwrap();
        assert_eq!(matrix.n_genes(), 1);
        assert_eq!(metadata.n_timed(), 0);
    }

    #[test]
    fn test_read_expression_ragged_row_fails() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gene_Symbol,s1,s2").unwrap();
        writeln!(file, "PER2,1.0").unwrap();

        let config = FitConfig::default();
        assert!(read_expression_csv(file.path(), &config).is_err());
    }

    #[test]
    fn test_read_seed_genes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Gene_Symbol").unwrap();
        writeln!(file, "ARNTL").unwrap();
        writeln!(file, "PER1,extra_column").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "CRY2").unwrap();

        let config = FitConfig::default();
        let genes = read_seed_genes(file.path(), &config).unwrap();
        assert_eq!(
            genes,
            vec!["ARNTL".to_string(), "PER1".to_string(), "CRY2".to_string()]
        );
    }

    #[test]
    fn test_read_phases_csv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id,phase_radians").unwrap();
        writeln!(file, "s1,0.500000").unwrap();
        writeln!(file, "s2,3.141593").unwrap();

        let phases = read_phases_csv(file.path()).unwrap();
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].0, "s1");
        assert!((phases[1].1 - 3.141593).abs() < 1e-9);
    }

    #[test]
    fn test_write_matrix_roundtrip() {
        use ndarray::array;

        let file = NamedTempFile::new().unwrap();
        let values = array![[1.25, 2.5], [3.0, 4.75]];
        write_matrix_csv(
            file.path(),
            &values,
            &["g1".to_string(), "g2".to_string()],
            &["s1".to_string(), "s2".to_string()],
            "Gene_Symbol",
            4,
        )
        .unwrap();

        let config = FitConfig::default();
        let (matrix, _) = read_expression_csv(file.path(), &config).unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert!((matrix.values()[[1, 1]] - 4.75).abs() < 1e-12);
    }
}
