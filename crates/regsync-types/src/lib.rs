//! Shared data model for regsync.
//!
//! This crate provides the types exchanged between the sync engine, backend
//! adapters and config providers:
//!
//! - [`SyncTask`], [`ResourceEndpoint`], [`Match`], [`Group`]: declared rules
//! - [`Service`], [`ConfigGroup`]: entity identities used as map keys
//! - [`Instance`], [`ConfigFile`]: synchronized payloads
//! - [`Health`], [`Dimension`], [`StatInfo`]: self-monitoring readings
//! - [`SyncDocument`]: the whole desired state

pub mod duration;

mod document;
mod endpoint;
mod matching;
mod resource;

pub use document::{
    HealthCheckConfig, Method, MethodType, ReportConfig, ReportTarget, SyncDocument, SyncTask,
    TargetType,
};
pub use endpoint::{
    Authorization, Database, ResourceEndpoint, ResourceType, OPTION_DEFAULT_NAMESPACE,
};
pub use matching::{ConfigGroup, Group, Match, Service, DEFAULT_GROUP, MATCH_ALL};
pub use resource::{ConfigFile, Dimension, Health, HealthRecord, Instance, StatInfo};

/// Default intervals, in milliseconds.
pub mod defaults {
    /// Health probe period.
    pub const HEALTH_CHECK_INTERVAL_MS: u64 = 5_000;

    /// Pull period when a pull method carries no interval.
    pub const PULL_INTERVAL_MS: u64 = 300_000;

    /// Stat flush period.
    pub const REPORT_INTERVAL_MS: u64 = 60_000;

    /// Poll period of file-backed config providers.
    pub const FILE_POLL_INTERVAL_MS: u64 = 30_000;

    /// Delay before a watch worker's first subscription attempt.
    pub const WATCH_INITIAL_DELAY_MS: u64 = 1_000;

    /// Backoff between failed subscription attempts.
    pub const WATCH_RETRY_DELAY_MS: u64 = 10_000;
}

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("invalid sync document: {0}")]
    InvalidDocument(String),
}
