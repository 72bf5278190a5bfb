//! Error types for Watch Pro
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Watch Pro operations
///
/// This enum encompasses the failure classes the service distinguishes:
/// configuration problems, model invocation failures, upstream search API
/// failures, store connectivity failures, and workflow step failures.
#[derive(Error, Debug)]
pub enum WatchProError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing credentials for a provider or upstream API
    #[error("Missing credentials for: {0}")]
    MissingCredentials(String),

    /// Provider-related errors (API calls, malformed completions, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool execution errors
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Upstream search or extraction API errors
    #[error("Search error: {0}")]
    Search(String),

    /// Key-value store errors (connectivity, command failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A model returned output that does not match the expected structure
    #[error("Invalid model output from {step}: {message}")]
    InvalidModelOutput {
        /// Workflow step that produced the output
        step: String,
        /// What was wrong with it
        message: String,
    },

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to act on the record
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for Watch Pro operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = WatchProError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_provider_error_display() {
        let error = WatchProError::Provider("API timeout".to_string());
        assert_eq!(error.to_string(), "Provider error: API timeout");
    }

    #[test]
    fn test_missing_credentials_error_display() {
        let error = WatchProError::MissingCredentials("search.api_key".to_string());
        assert_eq!(error.to_string(), "Missing credentials for: search.api_key");
    }

    #[test]
    fn test_search_error_display() {
        let error = WatchProError::Search("502 Bad Gateway".to_string());
        assert_eq!(error.to_string(), "Search error: 502 Bad Gateway");
    }

    #[test]
    fn test_storage_error_display() {
        let error = WatchProError::Storage("connection refused".to_string());
        assert_eq!(error.to_string(), "Storage error: connection refused");
    }

    #[test]
    fn test_invalid_model_output_display() {
        let error = WatchProError::InvalidModelOutput {
            step: "query_suggestor".to_string(),
            message: "expected 3 items, got 1".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("query_suggestor"));
        assert!(s.contains("expected 3 items"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: WatchProError = io_error.into();
        assert!(matches!(error, WatchProError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: WatchProError = json_error.into();
        assert!(matches!(error, WatchProError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: WatchProError = yaml_error.into();
        assert!(matches!(error, WatchProError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WatchProError>();
    }
}
