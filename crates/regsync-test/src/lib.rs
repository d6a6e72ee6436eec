//! Test infrastructure for regsync.
//!
//! In-memory registry and config backends whose state is shared between
//! every center the engine creates, a reporter that records its batches, a
//! provider pushed by hand, and fixtures for building documents.

mod config;
mod provider;
mod registry;
mod reporter;

pub mod fixtures;

pub use config::{ConfigCall, MockConfigCenter};
pub use provider::ManualProvider;
pub use registry::{MockRegistry, MockRegistryCenter, RegistryCall, WriteMark};
pub use reporter::RecordingReporter;
