//! Per-entity write serialization for destination backends.
//!
//! Pull runs and watch callbacks for the same entity may overlap. Each
//! destination is wrapped so that writes to the same logical scope never
//! interleave:
//!
//! - registry: one lock for the service list, one per service for its
//!   groups, one per (service, group name) for its instances
//! - config: one lock for the group list, one per config group for its files
//!
//! Locks are created on first use and never removed. Reads, `watch`,
//! `unwatch` and the lifecycle calls pass straight through.

use crate::center::{
    ConfigCenter, ConfigFilesResult, ConfigWatchListener, DiscoverResult, InitRequest,
    NamespacesResult, RegistryCenter, ResourceCenter, ServicesResult, WatchListener,
};
use crate::error::SyncResult;
use async_trait::async_trait;
use dashmap::DashMap;
use regsync_types::{ConfigFile, ConfigGroup, Group, Health, Instance, ResourceType, Service};
use std::collections::BTreeSet;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;

type LockTable<K> = DashMap<K, Arc<Mutex<()>>>;

/// Returns the lock for `key`, creating it on first use.
fn lock_for<K: Eq + Hash>(table: &LockTable<K>, key: K) -> Arc<Mutex<()>> {
    Arc::clone(table.entry(key).or_default().value())
}

/// Registry decorator holding the service/group/instance write locks.
pub struct RegistryCenterWrapper {
    inner: Box<dyn RegistryCenter>,
    services_lock: Mutex<()>,
    group_locks: LockTable<Service>,
    instance_locks: LockTable<(Service, String)>,
}

impl RegistryCenterWrapper {
    pub fn new(inner: Box<dyn RegistryCenter>) -> Self {
        Self {
            inner,
            services_lock: Mutex::new(()),
            group_locks: DashMap::new(),
            instance_locks: DashMap::new(),
        }
    }
}

#[async_trait]
impl ResourceCenter for RegistryCenterWrapper {
    fn resource_type(&self) -> ResourceType {
        self.inner.resource_type()
    }

    async fn init(&mut self, request: &InitRequest) -> SyncResult<()> {
        self.inner.init(request).await
    }

    async fn destroy(&self) {
        self.inner.destroy().await
    }

    async fn list_namespaces(&self) -> NamespacesResult {
        self.inner.list_namespaces().await
    }

    async fn health_check(&self) -> Health {
        self.inner.health_check().await
    }
}

#[async_trait]
impl RegistryCenter for RegistryCenterWrapper {
    async fn list_services(&self, namespace: &str) -> ServicesResult {
        self.inner.list_services(namespace).await
    }

    async fn list_instances(&self, service: &Service, group: &Group) -> DiscoverResult {
        self.inner.list_instances(service, group).await
    }

    async fn watch(&self, service: &Service, listener: Arc<dyn WatchListener>) -> bool {
        self.inner.watch(service, listener).await
    }

    async fn unwatch(&self, service: &Service) {
        self.inner.unwatch(service).await
    }

    async fn update_services(&self, services: &BTreeSet<Service>) -> SyncResult<()> {
        let _guard = self.services_lock.lock().await;
        self.inner.update_services(services).await
    }

    async fn update_groups(&self, service: &Service, groups: &[Group]) -> SyncResult<()> {
        let lock = lock_for(&self.group_locks, service.clone());
        let _guard = lock.lock().await;
        self.inner.update_groups(service, groups).await
    }

    async fn update_instances(
        &self,
        service: &Service,
        group: &Group,
        instances: Vec<Instance>,
    ) -> SyncResult<()> {
        let lock = lock_for(&self.instance_locks, (service.clone(), group.name.clone()));
        let _guard = lock.lock().await;
        self.inner.update_instances(service, group, instances).await
    }
}

/// Config-center decorator holding the group/file write locks.
pub struct ConfigCenterWrapper {
    inner: Box<dyn ConfigCenter>,
    groups_lock: Mutex<()>,
    file_locks: LockTable<ConfigGroup>,
}

impl ConfigCenterWrapper {
    pub fn new(inner: Box<dyn ConfigCenter>) -> Self {
        Self {
            inner,
            groups_lock: Mutex::new(()),
            file_locks: DashMap::new(),
        }
    }
}

#[async_trait]
impl ResourceCenter for ConfigCenterWrapper {
    fn resource_type(&self) -> ResourceType {
        self.inner.resource_type()
    }

    async fn init(&mut self, request: &InitRequest) -> SyncResult<()> {
        self.inner.init(request).await
    }

    async fn destroy(&self) {
        self.inner.destroy().await
    }

    async fn list_namespaces(&self) -> NamespacesResult {
        self.inner.list_namespaces().await
    }

    async fn health_check(&self) -> Health {
        self.inner.health_check().await
    }
}

#[async_trait]
impl ConfigCenter for ConfigCenterWrapper {
    async fn list_config_files(&self, group: &ConfigGroup) -> ConfigFilesResult {
        self.inner.list_config_files(group).await
    }

    async fn watch(&self, group: &ConfigGroup, listener: Arc<dyn ConfigWatchListener>) -> bool {
        self.inner.watch(group, listener).await
    }

    async fn unwatch(&self, group: &ConfigGroup) {
        self.inner.unwatch(group).await
    }

    async fn update_groups(&self, groups: &BTreeSet<ConfigGroup>) -> SyncResult<()> {
        let _guard = self.groups_lock.lock().await;
        self.inner.update_groups(groups).await
    }

    async fn update_config_files(
        &self,
        group: &ConfigGroup,
        files: Vec<ConfigFile>,
    ) -> SyncResult<()> {
        let lock = lock_for(&self.file_locks, group.clone());
        let _guard = lock.lock().await;
        self.inner.update_config_files(group, files).await
    }
}
