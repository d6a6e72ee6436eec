//! Config provider implementations shipped with the daemon.

pub mod file;

pub use file::FileConfigProvider;
