//! Error types for the client cache
//!
//! Provides structured error types for argument validation, storage backends,
//! compression codecs, configuration, and read-through fetches.

use thiserror::Error;

/// Unified error type for the client cache
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Argument Errors
    // =========================================================================
    #[error("Argument null exception. Parameter name: {parameter}. Function called: {function}")]
    MissingArgument {
        parameter: &'static str,
        function: &'static str,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Backend unavailable: {backend} - {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("Quota exceeded on {backend}: requested {requested} bytes, available {available} bytes")]
    QuotaExceeded {
        backend: String,
        requested: u64,
        available: u64,
    },

    // =========================================================================
    // Codec Errors
    // =========================================================================
    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    // =========================================================================
    // Read-through Errors
    // =========================================================================
    #[error("Fetch failed for key {key}: {reason}")]
    Fetch { key: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a missing argument
    pub fn missing(parameter: &'static str, function: &'static str) -> Self {
        Error::MissingArgument {
            parameter,
            function,
        }
    }

    /// Shorthand for an unavailable backend
    pub fn unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        Error::BackendUnavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error means a storage backend could not serve the call
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::QuotaExceeded { .. } | Error::Io(_)
        )
    }

    /// Check if this error is an argument error raised before any work began
    pub fn is_argument_error(&self) -> bool {
        matches!(self, Error::MissingArgument { .. })
    }

    /// Check if this error is transient
    ///
    /// Nothing in the crate retries; this only tells callers which failures
    /// might succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable { .. } | Error::Fetch { .. } | Error::Io(_)
        )
    }
}

/// Result type alias for the client cache
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_argument_message() {
        let err = Error::missing("key", "set");
        assert_eq!(
            err.to_string(),
            "Argument null exception. Parameter name: key. Function called: set"
        );
        assert!(err.is_argument_error());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_backend_classification() {
        let unavailable = Error::unavailable("durable", "storage disabled");
        assert!(unavailable.is_backend_unavailable());
        assert!(unavailable.is_transient());

        let quota = Error::QuotaExceeded {
            backend: "volatile".into(),
            requested: 10,
            available: 2,
        };
        assert!(quota.is_backend_unavailable());
        assert!(!quota.is_transient());

        let config_err = Error::Configuration("invalid".into());
        assert!(!config_err.is_backend_unavailable());
        assert!(!config_err.is_transient());
    }
}
