//! Error types for circaphase

use thiserror::Error;

/// Main error type for phase-estimation operations
#[derive(Error, Debug)]
pub enum CircaError {
    #[error("Invalid expression matrix: {reason}")]
    InvalidExpressionMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Eigengene decomposition failed: {reason}")]
    DecompositionFailed { reason: String },

    #[error("Training failed: {reason}")]
    TrainingFailed { reason: String },

    #[error("Phase alignment failed: {reason}")]
    AlignmentFailed { reason: String },

    #[error("Numerical instability in {operation}: {details}")]
    NumericalInstability { operation: String, details: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

/// Result type alias for phase-estimation operations
pub type Result<T> = std::result::Result<T, CircaError>;
