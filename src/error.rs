// src/error.rs

use std::path::PathBuf;

pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that abort an export run.
///
/// Per-row write failures are not represented here; they are reported as
/// `RowOutcome`s inside a `BatchReport`.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to load model from {path:?}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Layer '{layer}' not found in model (available: {available:?})")]
    LayerNotFound {
        layer: String,
        available: Vec<String>,
    },

    #[error("Data file error for {path:?}: {message}")]
    DataFile { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Vector dimension mismatch for column {column}: expected {expected}, got {actual}")]
    DimensionMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl ExportError {
    pub fn data_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ExportError::DataFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ExportError::Load {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<tokio_postgres::Error> for ExportError {
    fn from(err: tokio_postgres::Error) -> Self {
        ExportError::Database(err.to_string())
    }
}
