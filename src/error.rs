//! Error types for the logsentinel pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, LogSentinelError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum LogSentinelError {
    /// Malformed or degenerate training table
    #[error("Schema error: {0}")]
    Schema(String),

    /// Preprocessor misuse or irreconcilable input shape
    #[error("Transform error: {0}")]
    Transform(String),

    /// An operation a given detector variant does not support
    #[error("Unsupported operation '{operation}' for {detector}: {reason}")]
    UnsupportedOperation {
        detector: String,
        operation: String,
        reason: String,
    },

    /// Missing or mismatched ground truth
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Missing or corrupt persisted schema/preprocessor/detector
    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Detector not fitted")]
    NotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<polars::error::PolarsError> for LogSentinelError {
    fn from(err: polars::error::PolarsError) -> Self {
        LogSentinelError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for LogSentinelError {
    fn from(err: serde_json::Error) -> Self {
        LogSentinelError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for LogSentinelError {
    fn from(err: ndarray::ShapeError) -> Self {
        LogSentinelError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

impl LogSentinelError {
    /// Convenience constructor for unsupported detector operations
    pub fn unsupported(
        detector: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        LogSentinelError::UnsupportedOperation {
            detector: detector.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LogSentinelError::Schema("no usable columns".to_string());
        assert_eq!(err.to_string(), "Schema error: no usable columns");
    }

    #[test]
    fn test_unsupported_display() {
        let err = LogSentinelError::unsupported("dbscan", "score", "no incremental scoring");
        let msg = err.to_string();
        assert!(msg.contains("dbscan"));
        assert!(msg.contains("score"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LogSentinelError = io_err.into();
        assert!(matches!(err, LogSentinelError::Io(_)));
    }
}
