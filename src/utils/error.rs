//! Error Handling Module
//!
//! Defines the error types for the plate OCR library.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for plate OCR operations
#[derive(Error, Debug)]
pub enum PlateOcrError {
    /// Invalid model configuration (caught before any layer is built)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tensor does not have the shape the model was built for
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Failure turning class probabilities into plate text
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PlateOcrError {
    fn from(err: serde_json::Error) -> Self {
        PlateOcrError::Serialization(err.to_string())
    }
}

/// Convenience Result type for plate OCR operations
pub type Result<T> = std::result::Result<T, PlateOcrError>;
