//! In-memory config-center backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use regsync_core::{
    ConfigBackends, ConfigCenter, ConfigFilesResult, ConfigWatchEvent, ConfigWatchListener,
    HealthCounter, InitRequest, Listing, NamespacesResult, ResourceCenter, ResultCode, SyncResult,
};
use regsync_types::{ConfigFile, ConfigGroup, Health, ResourceType};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigCall {
    Init(InitRequest),
    Destroy,
    ListConfigFiles(ConfigGroup),
    Watch(ConfigGroup),
    Unwatch(ConfigGroup),
    UpdateGroups(BTreeSet<ConfigGroup>),
    UpdateConfigFiles(ConfigGroup, usize),
}

#[derive(Default)]
struct ConfigState {
    files: Mutex<HashMap<ConfigGroup, Vec<ConfigFile>>>,
    written_groups: Mutex<BTreeSet<ConfigGroup>>,
    written_files: Mutex<HashMap<ConfigGroup, Vec<ConfigFile>>>,
    calls: Mutex<Vec<ConfigCall>>,
    listeners: Mutex<HashMap<ConfigGroup, Arc<dyn ConfigWatchListener>>>,
    list_failure: Mutex<Option<ResultCode>>,
    health: HealthCounter,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

/// Handle to a shared in-memory config center.
#[derive(Clone, Default)]
pub struct MockConfigCenter {
    state: Arc<ConfigState>,
}

impl MockConfigCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, backends: &mut ConfigBackends, resource_type: ResourceType) {
        let state = Arc::clone(&self.state);
        backends.register(resource_type, move || {
            state.created.fetch_add(1, Ordering::SeqCst);
            Box::new(MockConfigInstance {
                state: Arc::clone(&state),
                resource_type,
            }) as Box<dyn ConfigCenter>
        });
    }

    pub fn set_files(&self, group: &ConfigGroup, files: Vec<ConfigFile>) {
        self.state.files.lock().insert(group.clone(), files);
    }

    pub fn set_list_failure(&self, code: Option<ResultCode>) {
        *self.state.list_failure.lock() = code;
    }

    /// Delivers a change event for `group`; false if nothing watches it.
    pub fn emit(&self, group: &ConfigGroup) -> bool {
        let listener = self.state.listeners.lock().get(group).cloned();
        let Some(listener) = listener else {
            return false;
        };
        let files = self
            .state
            .files
            .lock()
            .get(group)
            .cloned()
            .unwrap_or_default();
        listener.on_event(ConfigWatchEvent {
            group: group.clone(),
            files,
        });
        true
    }

    pub fn calls(&self) -> Vec<ConfigCall> {
        self.state.calls.lock().clone()
    }

    pub fn written_groups(&self) -> BTreeSet<ConfigGroup> {
        self.state.written_groups.lock().clone()
    }

    pub fn written_files(&self, group: &ConfigGroup) -> Option<Vec<ConfigFile>> {
        self.state.written_files.lock().get(group).cloned()
    }

    pub fn is_watched(&self, group: &ConfigGroup) -> bool {
        self.state.listeners.lock().contains_key(group)
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.state.destroyed.load(Ordering::SeqCst)
    }
}

struct MockConfigInstance {
    state: Arc<ConfigState>,
    resource_type: ResourceType,
}

impl MockConfigInstance {
    fn record(&self, call: ConfigCall) {
        self.state.calls.lock().push(call);
    }
}

#[async_trait]
impl ResourceCenter for MockConfigInstance {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    async fn init(&mut self, request: &InitRequest) -> SyncResult<()> {
        self.record(ConfigCall::Init(request.clone()));
        Ok(())
    }

    async fn destroy(&self) {
        self.record(ConfigCall::Destroy);
        self.state.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn list_namespaces(&self) -> NamespacesResult {
        let namespaces: BTreeSet<String> = self
            .state
            .files
            .lock()
            .keys()
            .map(|g| g.namespace.clone())
            .collect();
        Listing::success(namespaces.into_iter().collect())
    }

    async fn health_check(&self) -> Health {
        self.state.health.take()
    }
}

#[async_trait]
impl ConfigCenter for MockConfigInstance {
    async fn list_config_files(&self, group: &ConfigGroup) -> ConfigFilesResult {
        self.record(ConfigCall::ListConfigFiles(group.clone()));
        if let Some(code) = *self.state.list_failure.lock() {
            self.state.health.record(false);
            return Listing::failure(code);
        }
        self.state.health.record(true);
        Listing::success(
            self.state
                .files
                .lock()
                .get(group)
                .cloned()
                .unwrap_or_default(),
        )
    }

    async fn watch(&self, group: &ConfigGroup, listener: Arc<dyn ConfigWatchListener>) -> bool {
        self.record(ConfigCall::Watch(group.clone()));
        self.state.health.record(true);
        self.state.listeners.lock().insert(group.clone(), listener);
        true
    }

    async fn unwatch(&self, group: &ConfigGroup) {
        self.record(ConfigCall::Unwatch(group.clone()));
        self.state.listeners.lock().remove(group);
    }

    async fn update_groups(&self, groups: &BTreeSet<ConfigGroup>) -> SyncResult<()> {
        self.record(ConfigCall::UpdateGroups(groups.clone()));
        self.state.health.record(true);
        *self.state.written_groups.lock() = groups.clone();
        Ok(())
    }

    async fn update_config_files(
        &self,
        group: &ConfigGroup,
        files: Vec<ConfigFile>,
    ) -> SyncResult<()> {
        self.record(ConfigCall::UpdateConfigFiles(group.clone(), files.len()));
        self.state.health.record(true);
        self.state.written_files.lock().insert(group.clone(), files);
        Ok(())
    }
}
