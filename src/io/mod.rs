//! Input/output: expression CSV parsing, gene lists, and result writers

pub mod csv;
pub mod results;

pub use csv::{read_expression_csv, read_phases_csv, read_seed_genes, write_matrix_csv};
pub use results::{write_loss_trace_csv, PhasePrediction, PhaseResults, PhaseSummary};
