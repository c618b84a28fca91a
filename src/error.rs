//! Error types for statecache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the caching and pooling engine
///
/// A cache miss is never an error; these variants are reserved for
/// configuration mistakes and failures of pluggable collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, raised at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A background task could not be started
    #[error("Runtime error: {0}")]
    Runtime(String),

    // =========================================================================
    // Tiered Cache Errors
    // =========================================================================
    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// L2 backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// An operation exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    // =========================================================================
    // Warmer Errors
    // =========================================================================
    /// A registered loader failed
    #[error("Loader for key {key} failed: {reason}")]
    Loader { key: String, reason: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("max_size must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: max_size must be at least 1"
        );

        let err = Error::Timeout {
            operation: "L2 get".to_string(),
            after: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "L2 get timed out after 50ms");
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
