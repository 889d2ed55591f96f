//! Error types for the IntelliInspect service

use thiserror::Error;

/// Result type alias for IntelliInspect operations
pub type Result<T> = std::result::Result<T, InspectError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum InspectError {
    /// Malformed CSV, JSON or date input
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No trained model found at {0}")]
    ModelNotFound(String),

    #[error("Stored model is corrupt: {0}")]
    CorruptModel(String),

    #[error("Cannot coerce feature '{field}' to a number: {value}")]
    FeatureCoercion { field: String, value: String },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Chart rendering error: {0}")]
    ChartError(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: {0}")]
    ShapeError(String),
}

impl From<polars::error::PolarsError> for InspectError {
    fn from(err: polars::error::PolarsError) -> Self {
        InspectError::ParseError(err.to_string())
    }
}

impl From<serde_json::Error> for InspectError {
    fn from(err: serde_json::Error) -> Self {
        InspectError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for InspectError {
    fn from(err: ndarray::ShapeError) -> Self {
        InspectError::ShapeError(err.to_string())
    }
}
