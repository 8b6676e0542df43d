//! Error types for the abcausal library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}' in dataset")]
    MissingColumn(String),

    #[error("Invalid variable type for column '{column}': {reason}")]
    InvalidVariableType { column: String, reason: String },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Text generation failed: {0}")]
    Generation(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExperimentError {
    /// Wrap a distribution construction failure from `statrs` or `rand_distr`.
    pub(crate) fn distribution<E: std::fmt::Display>(err: E) -> Self {
        ExperimentError::Numerical(format!("invalid distribution parameters: {}", err))
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ExperimentError>;
