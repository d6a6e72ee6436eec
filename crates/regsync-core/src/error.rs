//! Error types for sync engine operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use regsync_types::{ParseError, ResourceType};
use std::io;
use thiserror::Error;

/// Result type alias for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while validating, applying or running sync tasks.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A document failed validation; the running configuration is kept.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The offending field path (e.g. "tasks[orders].source.addresses").
        field: String,
        /// Error message.
        message: String,
    },

    /// No adapter is registered for an endpoint's backend type.
    #[error("Unsupported backend type '{resource_type}' for endpoint '{endpoint}'")]
    UnsupportedBackend {
        /// Endpoint name.
        endpoint: String,
        /// The backend type without an adapter.
        resource_type: ResourceType,
    },

    /// A backend call failed or returned a non-success status.
    #[error("Backend operation failed: {operation}: {message}")]
    Backend {
        /// The operation that failed (e.g. "list_instances").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The configured provider name has no registered implementation.
    #[error("Config provider '{name}' not found")]
    ProviderNotFound {
        /// The requested provider name.
        name: String,
    },

    /// A config provider failed to initialize or read its source.
    #[error("Config provider error: {message}")]
    Provider {
        /// Error message.
        message: String,
    },

    /// Filesystem error (backup file, watched file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Document parse failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl SyncError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported backend error.
    pub fn unsupported_backend(endpoint: impl Into<String>, resource_type: ResourceType) -> Self {
        Self::UnsupportedBackend {
            endpoint: endpoint.into(),
            resource_type,
        }
    }

    /// Creates a backend error.
    pub fn backend(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error is a transient condition that the next
    /// pull run or watch retry may clear.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Backend { .. } | SyncError::Io(_) | SyncError::Provider { .. }
        )
    }

    /// Returns true if this error rejects a configuration revision.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig { .. } | SyncError::UnsupportedBackend { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::invalid_config("tasks[0].name", "must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for tasks[0].name: must not be empty"
        );
    }

    #[test]
    fn test_unsupported_backend_display() {
        let err = SyncError::unsupported_backend("zk-east", ResourceType::Zookeeper);
        assert_eq!(
            err.to_string(),
            "Unsupported backend type 'zookeeper' for endpoint 'zk-east'"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(SyncError::backend("list_instances", "timeout").is_retryable());
        assert!(!SyncError::invalid_config("methods", "empty").is_retryable());
        assert!(!SyncError::internal("bug").is_retryable());
    }

    #[test]
    fn test_is_config_error() {
        assert!(SyncError::unsupported_backend("x", ResourceType::Kong).is_config_error());
        assert!(!SyncError::backend("watch", "refused").is_config_error());
    }
}
