//! Error types for regsyncd

use regsync_core::SyncError;
use thiserror::Error;

/// Daemon errors
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Bootstrap configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Neither the provider nor the backup produced a document
    #[error("No sync document available from provider '{provider}' or its backup")]
    NoDocument { provider: String },

    /// Engine, provider or backend error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn configuration(message: impl Into<String>) -> Self {
        DaemonError::Configuration(message.into())
    }
}

/// Result type for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
