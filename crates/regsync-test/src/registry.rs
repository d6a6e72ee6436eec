//! In-memory registry backend.
//!
//! One [`MockRegistry`] holds the shared state behind every center its
//! factory creates, so a test can seed source data, drive events and inspect
//! destination writes after the engine has built its own instances.

use async_trait::async_trait;
use parking_lot::Mutex;
use regsync_core::{
    DiscoverResult, HealthCounter, InitRequest, Listing, NamespacesResult, RegistryBackends,
    RegistryCenter, ResourceCenter, ResultCode, ServicesResult, SyncError, SyncResult, WatchEvent,
    WatchListener,
};
use regsync_types::{Group, Health, Instance, ResourceType, Service};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryCall {
    Init(InitRequest),
    Destroy,
    ListServices(String),
    ListInstances(Service, String),
    Watch(Service),
    Unwatch(Service),
    UpdateServices(BTreeSet<Service>),
    UpdateGroups(Service, Vec<String>),
    UpdateInstances(Service, String, usize),
}

/// Entry/exit marks of `update_instances`, for overlap checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMark {
    Enter(Service, String),
    Exit(Service, String),
}

#[derive(Default)]
struct RegistryState {
    services: Mutex<BTreeMap<String, BTreeSet<Service>>>,
    instances: Mutex<HashMap<(Service, String), Vec<Instance>>>,
    written_services: Mutex<BTreeSet<Service>>,
    written_groups: Mutex<HashMap<Service, Vec<Group>>>,
    written_instances: Mutex<HashMap<(Service, String), Vec<Instance>>>,
    calls: Mutex<Vec<RegistryCall>>,
    write_marks: Mutex<Vec<WriteMark>>,
    listeners: Mutex<HashMap<Service, Arc<dyn WatchListener>>>,
    failing_watches: AtomicUsize,
    failing_inits: AtomicUsize,
    list_failure: Mutex<Option<ResultCode>>,
    write_delay: Mutex<Option<Duration>>,
    health: HealthCounter,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl RegistryState {
    fn record(&self, call: RegistryCall) {
        self.calls.lock().push(call);
    }
}

/// Handle to a shared in-memory registry.
#[derive(Clone, Default)]
pub struct MockRegistry {
    state: Arc<RegistryState>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers this registry's factory under `resource_type`.
    pub fn register(&self, backends: &mut RegistryBackends, resource_type: ResourceType) {
        let state = Arc::clone(&self.state);
        backends.register(resource_type, move || {
            state.created.fetch_add(1, Ordering::SeqCst);
            Box::new(MockRegistryCenter {
                state: Arc::clone(&state),
                resource_type,
            }) as Box<dyn RegistryCenter>
        });
    }

    /// A standalone center over this registry's state.
    pub fn center(&self, resource_type: ResourceType) -> Box<dyn RegistryCenter> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockRegistryCenter {
            state: Arc::clone(&self.state),
            resource_type,
        })
    }

    // Seeding (source side)

    pub fn set_instances(&self, service: &Service, group: &str, instances: Vec<Instance>) {
        self.state
            .services
            .lock()
            .entry(service.namespace.clone())
            .or_default()
            .insert(service.clone());
        self.state
            .instances
            .lock()
            .insert((service.clone(), group.to_string()), instances);
    }

    /// Makes the next `count` watch calls fail.
    pub fn fail_next_watches(&self, count: usize) {
        self.state.failing_watches.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` init calls fail.
    pub fn fail_next_inits(&self, count: usize) {
        self.state.failing_inits.store(count, Ordering::SeqCst);
    }

    /// Makes every list call return `code` (or succeed again with `None`).
    pub fn set_list_failure(&self, code: Option<ResultCode>) {
        *self.state.list_failure.lock() = code;
    }

    /// Holds every `update_instances` call open for `delay`.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.state.write_delay.lock() = Some(delay);
    }

    /// Delivers a change event to the listener watching `service`.
    ///
    /// Returns false if nothing is watching it.
    pub fn emit(&self, service: &Service) -> bool {
        let listener = self.state.listeners.lock().get(service).cloned();
        let Some(listener) = listener else {
            return false;
        };
        let instances = self
            .state
            .instances
            .lock()
            .iter()
            .filter(|((s, _), _)| s == service)
            .flat_map(|(_, v)| v.clone())
            .collect();
        listener.on_event(WatchEvent {
            service: service.clone(),
            instances,
        });
        true
    }

    // Inspection (destination side)

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.state.calls.lock().clone()
    }

    pub fn count_calls<F: Fn(&RegistryCall) -> bool>(&self, predicate: F) -> usize {
        self.state.calls.lock().iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    pub fn written_services(&self) -> BTreeSet<Service> {
        self.state.written_services.lock().clone()
    }

    pub fn written_groups(&self, service: &Service) -> Option<Vec<Group>> {
        self.state.written_groups.lock().get(service).cloned()
    }

    pub fn written_instances(&self, service: &Service, group: &str) -> Option<Vec<Instance>> {
        self.state
            .written_instances
            .lock()
            .get(&(service.clone(), group.to_string()))
            .cloned()
    }

    pub fn write_marks(&self) -> Vec<WriteMark> {
        self.state.write_marks.lock().clone()
    }

    pub fn is_watched(&self, service: &Service) -> bool {
        self.state.listeners.lock().contains_key(service)
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }
}

/// One center instance created by a [`MockRegistry`] factory.
pub struct MockRegistryCenter {
    state: Arc<RegistryState>,
    resource_type: ResourceType,
}

impl MockRegistryCenter {
    fn list_failure(&self) -> Option<ResultCode> {
        *self.state.list_failure.lock()
    }
}

#[async_trait]
impl ResourceCenter for MockRegistryCenter {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    async fn init(&mut self, request: &InitRequest) -> SyncResult<()> {
        self.state.record(RegistryCall::Init(request.clone()));
        let failing = self.state.failing_inits.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_inits.store(failing - 1, Ordering::SeqCst);
            return Err(SyncError::backend("init", "refused by mock"));
        }
        Ok(())
    }

    async fn destroy(&self) {
        self.state.record(RegistryCall::Destroy);
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn list_namespaces(&self) -> NamespacesResult {
        Listing::success(self.state.services.lock().keys().cloned().collect())
    }

    async fn health_check(&self) -> Health {
        self.state.health.take()
    }
}

#[async_trait]
impl RegistryCenter for MockRegistryCenter {
    async fn list_services(&self, namespace: &str) -> ServicesResult {
        self.state
            .record(RegistryCall::ListServices(namespace.to_string()));
        if let Some(code) = self.list_failure() {
            self.state.health.record(false);
            return Listing::failure(code);
        }
        self.state.health.record(true);
        Listing::success(
            self.state
                .services
                .lock()
                .get(namespace)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
        )
    }

    async fn list_instances(&self, service: &Service, group: &Group) -> DiscoverResult {
        self.state.record(RegistryCall::ListInstances(
            service.clone(),
            group.name.clone(),
        ));
        if let Some(code) = self.list_failure() {
            self.state.health.record(false);
            return Listing::failure(code);
        }
        self.state.health.record(true);
        Listing::success(
            self.state
                .instances
                .lock()
                .get(&(service.clone(), group.name.clone()))
                .cloned()
                .unwrap_or_default(),
        )
    }

    async fn watch(&self, service: &Service, listener: Arc<dyn WatchListener>) -> bool {
        self.state.record(RegistryCall::Watch(service.clone()));
        let failing = self.state.failing_watches.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_watches.store(failing - 1, Ordering::SeqCst);
            self.state.health.record(false);
            return false;
        }
        self.state.health.record(true);
        self.state.listeners.lock().insert(service.clone(), listener);
        true
    }

    async fn unwatch(&self, service: &Service) {
        self.state.record(RegistryCall::Unwatch(service.clone()));
        self.state.listeners.lock().remove(service);
    }

    async fn update_services(&self, services: &BTreeSet<Service>) -> SyncResult<()> {
        self.state
            .record(RegistryCall::UpdateServices(services.clone()));
        self.state.health.record(true);
        *self.state.written_services.lock() = services.clone();
        Ok(())
    }

    async fn update_groups(&self, service: &Service, groups: &[Group]) -> SyncResult<()> {
        self.state.record(RegistryCall::UpdateGroups(
            service.clone(),
            groups.iter().map(|g| g.name.clone()).collect(),
        ));
        self.state.health.record(true);
        self.state
            .written_groups
            .lock()
            .insert(service.clone(), groups.to_vec());
        Ok(())
    }

    async fn update_instances(
        &self,
        service: &Service,
        group: &Group,
        instances: Vec<Instance>,
    ) -> SyncResult<()> {
        self.state.record(RegistryCall::UpdateInstances(
            service.clone(),
            group.name.clone(),
            instances.len(),
        ));
        self.state
            .write_marks
            .lock()
            .push(WriteMark::Enter(service.clone(), group.name.clone()));

        let delay = *self.state.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.health.record(true);
        self.state
            .written_instances
            .lock()
            .insert((service.clone(), group.name.clone()), instances);
        self.state
            .write_marks
            .lock()
            .push(WriteMark::Exit(service.clone(), group.name.clone()));
        Ok(())
    }
}
