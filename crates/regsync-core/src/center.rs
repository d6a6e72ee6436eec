//! Backend capability interfaces.
//!
//! Every backend adapter implements [`ResourceCenter`] plus exactly one of
//! [`RegistryCenter`] (service discovery backends) or [`ConfigCenter`]
//! (configuration stores). The engine only ever talks to adapters through
//! these traits.
//!
//! Adapter contract:
//! - `update_*` calls carry full state for their scope; the adapter is
//!   responsible for add/remove bookkeeping against what it holds.
//! - `health_check` is read-and-reset: it returns counts accumulated since
//!   the previous call. [`HealthCounter`] implements that for adapters.
//! - `watch` returns false when the subscription could not be established;
//!   the engine retries.

use crate::alias::NamespaceAlias;
use crate::error::SyncResult;
use async_trait::async_trait;
use regsync_types::{
    ConfigFile, ConfigGroup, Dimension, Group, Health, HealthRecord, Instance, ResourceEndpoint,
    ResourceType, Service,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Parameters handed to an adapter's `init`.
///
/// Destinations learn which source feeds them so they can tag what they
/// write; sources get an empty source name and [`ResourceType::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitRequest {
    pub source_name: String,
    pub source_type: ResourceType,
    pub endpoint: ResourceEndpoint,
}

impl InitRequest {
    pub fn for_source(endpoint: &ResourceEndpoint) -> Self {
        Self {
            source_name: String::new(),
            source_type: ResourceType::Unknown,
            endpoint: endpoint.clone(),
        }
    }

    pub fn for_destination(source: &ResourceEndpoint, endpoint: &ResourceEndpoint) -> Self {
        Self {
            source_name: source.name.clone(),
            source_type: source.resource_type,
            endpoint: endpoint.clone(),
        }
    }
}

/// Outcome class of a backend read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    NotFound,
    ClientError,
    ServerError,
}

impl ResultCode {
    pub const fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Success => "success",
            ResultCode::NotFound => "not_found",
            ResultCode::ClientError => "client_error",
            ResultCode::ServerError => "server_error",
        };
        write!(f, "{}", s)
    }
}

/// A backend read: status plus payload (empty unless successful).
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub code: ResultCode,
    pub items: Vec<T>,
}

impl<T> Listing<T> {
    pub fn success(items: Vec<T>) -> Self {
        Self {
            code: ResultCode::Success,
            items,
        }
    }

    pub fn failure(code: ResultCode) -> Self {
        Self {
            code,
            items: Vec::new(),
        }
    }
}

pub type DiscoverResult = Listing<Instance>;
pub type ServicesResult = Listing<Service>;
pub type NamespacesResult = Listing<String>;
pub type ConfigFilesResult = Listing<ConfigFile>;

/// Change notification from a registry source.
///
/// The payload is informational only; the engine re-reads the source.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub service: Service,
    pub instances: Vec<Instance>,
}

/// Change notification from a config source.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWatchEvent {
    pub group: ConfigGroup,
    pub files: Vec<ConfigFile>,
}

/// Callback registered with a registry source's `watch`.
///
/// Invoked on the adapter's own thread; implementations must return quickly.
pub trait WatchListener: Send + Sync {
    fn on_event(&self, event: WatchEvent);
}

/// Callback registered with a config source's `watch`.
pub trait ConfigWatchListener: Send + Sync {
    fn on_event(&self, event: ConfigWatchEvent);
}

/// Capabilities shared by every backend.
#[async_trait]
pub trait ResourceCenter: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Connects to the backend. Called once, before any other call.
    async fn init(&mut self, request: &InitRequest) -> SyncResult<()>;

    /// Releases backend connections. Called exactly once.
    async fn destroy(&self);

    async fn list_namespaces(&self) -> NamespacesResult;

    /// Returns and resets call counters.
    async fn health_check(&self) -> Health;
}

/// A service registry backend.
#[async_trait]
pub trait RegistryCenter: ResourceCenter {
    async fn list_services(&self, namespace: &str) -> ServicesResult;

    async fn list_instances(&self, service: &Service, group: &Group) -> DiscoverResult;

    async fn watch(&self, service: &Service, listener: Arc<dyn WatchListener>) -> bool;

    async fn unwatch(&self, service: &Service);

    /// Full set of services this task owns on the destination.
    async fn update_services(&self, services: &BTreeSet<Service>) -> SyncResult<()>;

    /// Full group list of one service.
    async fn update_groups(&self, service: &Service, groups: &[Group]) -> SyncResult<()>;

    /// Full instance list of one service group.
    async fn update_instances(
        &self,
        service: &Service,
        group: &Group,
        instances: Vec<Instance>,
    ) -> SyncResult<()>;
}

/// A configuration store backend.
#[async_trait]
pub trait ConfigCenter: ResourceCenter {
    async fn list_config_files(&self, group: &ConfigGroup) -> ConfigFilesResult;

    async fn watch(&self, group: &ConfigGroup, listener: Arc<dyn ConfigWatchListener>) -> bool;

    async fn unwatch(&self, group: &ConfigGroup);

    /// Full set of config groups this task owns on the destination.
    async fn update_groups(&self, groups: &BTreeSet<ConfigGroup>) -> SyncResult<()>;

    /// Full file list of one config group.
    async fn update_config_files(&self, group: &ConfigGroup, files: Vec<ConfigFile>)
        -> SyncResult<()>;
}

/// Read-and-reset call counters for adapters.
#[derive(Debug, Default)]
pub struct HealthCounter {
    total: AtomicU64,
    errors: AtomicU64,
}

impl HealthCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one backend call.
    pub fn record(&self, ok: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the counts since the previous call and resets them.
    pub fn take(&self) -> Health {
        Health::new(
            self.total.swap(0, Ordering::Relaxed),
            self.errors.swap(0, Ordering::Relaxed),
        )
    }
}

/// A live backend bound to the endpoint it was created for.
pub struct NamedResourceCenter<C: ?Sized> {
    endpoint: ResourceEndpoint,
    center: Arc<C>,
}

impl<C: ?Sized> NamedResourceCenter<C> {
    pub fn new(endpoint: ResourceEndpoint, center: Arc<C>) -> Self {
        Self { endpoint, center }
    }

    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn product_name(&self) -> &str {
        &self.endpoint.product_name
    }

    pub fn resource_type(&self) -> ResourceType {
        self.endpoint.resource_type
    }

    pub fn endpoint(&self) -> &ResourceEndpoint {
        &self.endpoint
    }

    pub fn center(&self) -> &C {
        &self.center
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(
            self.endpoint.name.clone(),
            self.endpoint.resource_type,
            self.endpoint.product_name.clone(),
        )
    }
}

impl<C: ?Sized + ResourceCenter> NamedResourceCenter<C> {
    /// Reads (and resets) the backend's health counters.
    pub async fn health_record(&self) -> HealthRecord {
        let health = self.center.health_check().await;
        HealthRecord {
            dimension: self.dimension(),
            total: health.total,
            errors: health.errors,
        }
    }
}

impl<C: ?Sized> fmt::Debug for NamedResourceCenter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedResourceCenter")
            .field("name", &self.endpoint.name)
            .field("type", &self.endpoint.resource_type)
            .finish()
    }
}

/// Source and destination of one task.
pub struct ResourceSet<C: ?Sized> {
    pub source: Arc<NamedResourceCenter<C>>,
    pub destination: Arc<NamedResourceCenter<C>>,
    pub alias: NamespaceAlias,
}

impl<C: ?Sized> ResourceSet<C> {
    pub fn new(
        source: Arc<NamedResourceCenter<C>>,
        destination: Arc<NamedResourceCenter<C>>,
    ) -> Self {
        let alias = NamespaceAlias::between(source.endpoint(), destination.endpoint());
        Self {
            source,
            destination,
            alias,
        }
    }
}

impl<C: ?Sized> Clone for ResourceSet<C> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            destination: Arc::clone(&self.destination),
            alias: self.alias.clone(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for ResourceSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSet")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_counter_read_resets() {
        let counter = HealthCounter::new();
        counter.record(true);
        counter.record(false);
        counter.record(true);
        assert_eq!(counter.take(), Health::new(3, 1));
        assert_eq!(counter.take(), Health::new(0, 0));
    }

    #[test]
    fn test_init_request_roles() {
        let src = ResourceEndpoint::new("nacos", ResourceType::Nacos, "127.0.0.1:8848");
        let dst = ResourceEndpoint::new("polaris", ResourceType::Polaris, "127.0.0.1:8090");
        let source = InitRequest::for_source(&src);
        assert_eq!(source.source_name, "");
        assert_eq!(source.source_type, ResourceType::Unknown);
        let destination = InitRequest::for_destination(&src, &dst);
        assert_eq!(destination.source_name, "nacos");
        assert_eq!(destination.source_type, ResourceType::Nacos);
        assert_eq!(destination.endpoint, dst);
    }

    #[test]
    fn test_listing_failure_is_empty() {
        let listing: DiscoverResult = Listing::failure(ResultCode::ServerError);
        assert!(!listing.code.is_success());
        assert!(listing.items.is_empty());
    }
}
