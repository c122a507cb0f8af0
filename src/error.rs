//! Error types for Cadence
//!
//! Centralized error handling using thiserror. A tick error is logged and
//! counted at the worker boundary and never stops the dispatcher.

use thiserror::Error;

use crate::reasoning::ReasoningError;

/// All error types that can occur in Cadence
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Operation not valid in the current dispatcher or agent state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Base priority outside the accepted range (finite, >= 0)
    #[error("Invalid priority for {identity}: {value}")]
    InvalidPriority { identity: String, value: f64 },

    /// Configuration rejected by validation
    #[error("Config error: {0}")]
    Config(String),

    /// No async runtime available to host the dispatcher
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Reasoning collaborator failure that ended a tick
    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),

    /// IO error, e.g. reading or writing an agent snapshot
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, CadenceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_invalid_state_error() {
        let err = CadenceError::InvalidState("dispatcher already running".to_string());
        assert_eq!(err.to_string(), "Invalid state: dispatcher already running");
    }

    #[test]
    fn test_invalid_priority_error() {
        let err = CadenceError::InvalidPriority {
            identity: "scout".to_string(),
            value: -1.0,
        };
        assert_eq!(err.to_string(), "Invalid priority for scout: -1");
    }

    #[test]
    fn test_runtime_error() {
        let err = CadenceError::Runtime("no tokio runtime".to_string());
        assert_eq!(err.to_string(), "Runtime error: no tokio runtime");
    }

    #[test]
    fn test_reasoning_error_conversion() {
        let err: CadenceError = ReasoningError::Timeout(Duration::from_secs(3)).into();
        assert!(matches!(err, CadenceError::Reasoning(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CadenceError = io_err.into();
        assert!(matches!(err, CadenceError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: CadenceError = json_err.into();
        assert!(matches!(err, CadenceError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(CadenceError::InvalidState("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
