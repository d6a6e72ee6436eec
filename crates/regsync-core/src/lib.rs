//! Reconciliation engine for regsync.
//!
//! This crate turns declared sync tasks into running workers that keep a
//! destination backend in step with a source backend:
//!
//! - [`RegistryCenter`] / [`ConfigCenter`]: capability traits implemented by
//!   backend adapters
//! - [`TaskEngine`]: owns the pull/watch workers and diff-reconciles them
//!   against each new revision
//! - [`HealthCheckScheduler`]: probes the backends of every running task
//! - [`StatReportAggregator`]: accumulates health readings and flushes them
//!   to [`ReportHandler`]s
//! - [`ConfigProviderManager`]: delivers revisions with backup and rollback
//!
//! # Data flow
//!
//! 1. A [`ConfigProvider`] produces a [`SyncDocument`](regsync_types::SyncDocument)
//! 2. The manager backs it up and hands it to each listener
//! 3. Engines validate and apply it, creating backends through their
//!    [`PluginTable`] and spawning workers
//! 4. Workers read the source and write full state to the wrapped destination
//! 5. Health probes feed the aggregator, which flushes to reporters

mod alias;
mod center;
mod engine;
mod error;
mod health;
mod kind;
mod plugin;
mod provider;
mod stat;
mod validate;
mod worker;
mod wrapper;

pub mod tasks;

pub use alias::NamespaceAlias;
pub use center::{
    ConfigCenter, ConfigFilesResult, ConfigWatchEvent, ConfigWatchListener, DiscoverResult,
    HealthCounter, InitRequest, Listing, NamedResourceCenter, NamespacesResult, RegistryCenter,
    ResourceCenter, ResourceSet, ResultCode, ServicesResult, WatchEvent, WatchListener,
};
pub use engine::{MethodPlan, ReloadSummary, TaskEngine, WatchTiming};
pub use error::{SyncError, SyncResult};
pub use health::{HealthCheckScheduler, HealthSource};
pub use kind::{ConfigKind, RegistryKind, SyncKind};
pub use plugin::{Factory, PluginTable};
pub use provider::{
    BackupStore, ConfigListener, ConfigProvider, ConfigProviderManager, ProviderSettings,
    Providers,
};
pub use stat::{ReportHandler, Reporters, StatReportAggregator};
pub use validate::{verify_methods, verify_report, verify_tasks, MatchRules};
pub use worker::{fixed_delay, WorkerHandle};
pub use wrapper::{ConfigCenterWrapper, RegistryCenterWrapper};

use regsync_types::ResourceType;

/// Registry engine.
pub type RegistryEngine = TaskEngine<RegistryKind>;

/// Config-center engine.
pub type ConfigEngine = TaskEngine<ConfigKind>;

/// Registration table of registry adapters.
pub type RegistryBackends = PluginTable<ResourceType, dyn RegistryCenter>;

/// Registration table of config-center adapters.
pub type ConfigBackends = PluginTable<ResourceType, dyn ConfigCenter>;
