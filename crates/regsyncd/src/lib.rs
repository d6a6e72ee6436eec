//! Registry and config-center synchronization daemon.
//!
//! - [`SyncServer`]: wires a config provider to the registry and config
//!   engines, health probing and stat reporting
//! - [`RegsyncConfig`]: bootstrap settings read from TOML
//! - [`FileConfigProvider`]: sync document from a polled local file
//! - [`FileReportHandler`]: stat batches rendered to the log

pub mod config_file;
pub mod error;
pub mod provider;
pub mod reporter;
mod server;

pub use config_file::{RegsyncConfig, DEFAULT_CONFIG_PATH};
pub use error::{DaemonError, Result};
pub use provider::FileConfigProvider;
pub use reporter::FileReportHandler;
pub use server::{ServerSettings, SyncServer, SyncServerBuilder};
