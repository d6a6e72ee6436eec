//! The sync task engine.
//!
//! Turns a list of [`SyncTask`]s plus a method list into running workers and
//! keeps them in step with later revisions:
//!
//! - if the enabled methods changed, everything is torn down and rebuilt
//! - otherwise tasks are diffed by name: removed tasks are deleted, new tasks
//!   are created, changed tasks are deleted then created, equal tasks are
//!   left alone (their workers keep running untouched)
//!
//! Reloads are serialized by the engine lock. Backends are created once per
//! distinct (endpoint, role) and shared between tasks; the last task to let
//! go of one destroys it. Source subscriptions are shared the same way
//! through the kind's watch hub.
//!
//! A task whose backends fail to initialize gets no workers and is left out
//! of the recorded revision, so the next reload tries it again.

use crate::center::{InitRequest, NamedResourceCenter, ResourceCenter, ResourceSet};
use crate::error::{SyncError, SyncResult};
use crate::health::HealthSource;
use crate::kind::SyncKind;
use crate::plugin::PluginTable;
use crate::tasks::{UnwatchTask, WatchKey, WatchState, WatchWorker};
use crate::tasks::watch::{WatchEntry, WatchTable};
use crate::validate::{verify_methods, verify_tasks};
use crate::worker::{fixed_delay, WorkerHandle};
use async_trait::async_trait;
use regsync_types::{defaults, HealthRecord, Method, MethodType, ResourceType, SyncTask};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The enabled methods of a revision, reduced to what drives workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodPlan {
    /// Pull period, if pull is enabled.
    pub pull: Option<Duration>,
    pub watch: bool,
}

impl MethodPlan {
    pub fn from_methods(methods: &[Method]) -> Self {
        let mut plan = Self::default();
        for method in methods.iter().filter(|m| m.enable) {
            match method.method_type {
                MethodType::Pull => plan.pull = Some(method.pull_interval()),
                MethodType::Watch => plan.watch = true,
                MethodType::Unknown => {}
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.pull.is_none() && !self.watch
    }
}

/// Worker changes made by one reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub pull_added: usize,
    pub pull_deleted: usize,
    pub watch_added: usize,
    pub watch_deleted: usize,
    /// Tasks skipped because a backend failed to initialize.
    pub failed: usize,
}

impl ReloadSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Delays used by watch workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    pub initial_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(defaults::WATCH_INITIAL_DELAY_MS),
            retry_delay: Duration::from_millis(defaults::WATCH_RETRY_DELAY_MS),
        }
    }
}

struct PooledCenter<C: ?Sized> {
    center: Arc<NamedResourceCenter<C>>,
    refs: usize,
}

struct TaskResources<C: ?Sized> {
    set: ResourceSet<C>,
    source_key: InitRequest,
    destination_key: InitRequest,
}

struct EngineState<K: SyncKind> {
    tasks: Vec<SyncTask>,
    plan: MethodPlan,
    resources: HashMap<String, TaskResources<K::Center>>,
    centers: HashMap<InitRequest, PooledCenter<K::Center>>,
    pulls: HashMap<String, WorkerHandle>,
}

impl<K: SyncKind> Default for EngineState<K> {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            plan: MethodPlan::default(),
            resources: HashMap::new(),
            centers: HashMap::new(),
            pulls: HashMap::new(),
        }
    }
}

/// Owns the live pull/watch workers of one [`SyncKind`].
pub struct TaskEngine<K: SyncKind> {
    backends: PluginTable<ResourceType, K::Center>,
    state: Mutex<EngineState<K>>,
    watches: Arc<WatchTable>,
    hub: Arc<K::Hub>,
    root: CancellationToken,
    timing: WatchTiming,
}

impl<K: SyncKind> TaskEngine<K> {
    pub fn new(backends: PluginTable<ResourceType, K::Center>) -> Self {
        Self {
            backends,
            state: Mutex::new(EngineState::default()),
            watches: Arc::new(WatchTable::new()),
            hub: Arc::new(K::Hub::default()),
            root: CancellationToken::new(),
            timing: WatchTiming::default(),
        }
    }

    pub fn with_watch_timing(mut self, timing: WatchTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Returns true if an adapter is registered for `resource_type`.
    pub fn supports(&self, resource_type: ResourceType) -> bool {
        self.backends.supports(&resource_type)
    }

    /// Checks a revision without applying it.
    pub fn validate(&self, tasks: &[SyncTask], methods: &[Method]) -> SyncResult<()> {
        verify_tasks(tasks, K::MATCH_RULES, |ty| self.supports(ty))?;
        verify_methods(methods, tasks)
    }

    /// Installs the first revision.
    pub async fn init(&self, tasks: &[SyncTask], methods: &[Method]) -> SyncResult<ReloadSummary> {
        self.reload(tasks, methods).await
    }

    /// Applies a revision, changing only the workers that must change.
    ///
    /// An invalid revision is rejected before anything is touched.
    pub async fn reload(
        &self,
        tasks: &[SyncTask],
        methods: &[Method],
    ) -> SyncResult<ReloadSummary> {
        self.validate(tasks, methods)?;
        let plan = MethodPlan::from_methods(methods);

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut summary = ReloadSummary::default();
        let mut failed = HashSet::new();
        let previous = std::mem::take(&mut state.tasks);

        if plan != state.plan {
            if !previous.is_empty() {
                info!(kind = K::LABEL, "sync methods changed, rebuilding every task");
            }
            for task in &previous {
                self.delete_task(state, task, &mut summary).await;
            }
            for task in tasks {
                if !self.add_task(state, task, plan, &mut summary).await {
                    failed.insert(task.name.as_str());
                }
            }
        } else {
            let incoming: HashMap<&str, &SyncTask> =
                tasks.iter().map(|t| (t.name.as_str(), t)).collect();
            let existing: HashSet<&str> = previous.iter().map(|t| t.name.as_str()).collect();

            for old in &previous {
                match incoming.get(old.name.as_str()) {
                    None => self.delete_task(state, old, &mut summary).await,
                    Some(new) if *new != old => {
                        self.delete_task(state, old, &mut summary).await;
                        if !self.add_task(state, new, plan, &mut summary).await {
                            failed.insert(new.name.as_str());
                        }
                    }
                    Some(_) => {}
                }
            }
            for task in tasks.iter().filter(|t| !existing.contains(t.name.as_str())) {
                if !self.add_task(state, task, plan, &mut summary).await {
                    failed.insert(task.name.as_str());
                }
            }
        }

        summary.failed = failed.len();
        state.tasks = tasks
            .iter()
            .filter(|t| !failed.contains(t.name.as_str()))
            .cloned()
            .collect();
        state.plan = plan;
        info!(
            kind = K::LABEL,
            tasks = tasks.len(),
            pull_added = summary.pull_added,
            pull_deleted = summary.pull_deleted,
            watch_added = summary.watch_added,
            watch_deleted = summary.watch_deleted,
            failed = summary.failed,
            "sync tasks reloaded"
        );
        Ok(summary)
    }

    /// Stops every worker and destroys every backend.
    pub async fn destroy(&self) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let mut summary = ReloadSummary::default();
        let tasks = std::mem::take(&mut state.tasks);
        for task in &tasks {
            self.delete_task(state, task, &mut summary).await;
        }
        self.root.cancel();

        let leftovers: Vec<_> = state.centers.drain().map(|(_, p)| p.center).collect();
        for center in leftovers {
            center.center().destroy().await;
        }
        info!(kind = K::LABEL, tasks = tasks.len(), "sync engine destroyed");
    }

    /// Starts a task's workers. Returns false if its backends could not be
    /// initialized.
    async fn add_task(
        &self,
        state: &mut EngineState<K>,
        task: &SyncTask,
        plan: MethodPlan,
        summary: &mut ReloadSummary,
    ) -> bool {
        if !task.enable || plan.is_empty() {
            return true;
        }
        let resources = match self.acquire_resources(state, task).await {
            Ok(resources) => resources,
            Err(e) => {
                error!(
                    kind = K::LABEL,
                    task = %task.name,
                    error = %e,
                    "failed to initialize task backends, will retry on next reload"
                );
                return false;
            }
        };
        let set = resources.set.clone();
        state.resources.insert(task.name.clone(), resources);

        if let Some(period) = plan.pull {
            if let Some(pull) = K::pull_task(set.clone(), &task.matches) {
                let name = task.name.clone();
                let label = pull.describe();
                let handle = WorkerHandle::spawn(&self.root, move |token| {
                    fixed_delay(label, Duration::ZERO, period, token, move || {
                        let pull = Arc::clone(&pull);
                        let name = name.clone();
                        async move {
                            if let Err(e) = pull.reconcile().await {
                                warn!(kind = K::LABEL, task = %name, error = %e, "pull run aborted");
                            }
                        }
                    })
                });
                state.pulls.insert(task.name.clone(), handle);
                summary.pull_added += 1;
            }
        }

        if plan.watch {
            for rule in task.active_matches() {
                let key = WatchKey::new(task.name.clone(), rule.clone());
                if self.watches.contains_key(&key) {
                    continue;
                }
                let subscription = K::subscription(set.clone(), rule, &self.hub);
                let cell = Arc::new(parking_lot::Mutex::new(WatchState::Unregistered));
                let worker = WatchWorker::new(
                    key.clone(),
                    Arc::clone(&subscription),
                    Arc::clone(&self.watches),
                    Arc::clone(&cell),
                    self.timing.initial_delay,
                    self.timing.retry_delay,
                );
                let handle = WorkerHandle::spawn(&self.root, move |token| async move {
                    worker.run(token).await;
                });
                self.watches.insert(
                    key,
                    WatchEntry {
                        worker: handle,
                        subscription,
                        state: cell,
                    },
                );
                summary.watch_added += 1;
            }
        }
        true
    }

    async fn delete_task(
        &self,
        state: &mut EngineState<K>,
        task: &SyncTask,
        summary: &mut ReloadSummary,
    ) {
        if let Some(handle) = state.pulls.remove(&task.name) {
            handle.shutdown().await;
            summary.pull_deleted += 1;
        }

        for rule in task.active_matches() {
            let key = WatchKey::new(task.name.clone(), rule.clone());
            if let Some((_, entry)) = self.watches.remove(&key) {
                entry.worker.shutdown().await;
                UnwatchTask::new(entry.subscription).run().await;
                summary.watch_deleted += 1;
            }
        }

        if let Some(resources) = state.resources.remove(&task.name) {
            self.release(state, &resources.source_key).await;
            self.release(state, &resources.destination_key).await;
        }
    }

    async fn acquire_resources(
        &self,
        state: &mut EngineState<K>,
        task: &SyncTask,
    ) -> SyncResult<TaskResources<K::Center>> {
        let source_key = InitRequest::for_source(&task.source);
        let destination_key = InitRequest::for_destination(&task.source, &task.destination);
        let source = self.acquire(state, &source_key).await?;
        let destination = match self.acquire(state, &destination_key).await {
            Ok(destination) => destination,
            Err(e) => {
                self.release(state, &source_key).await;
                return Err(e);
            }
        };
        Ok(TaskResources {
            set: ResourceSet::new(source, destination),
            source_key,
            destination_key,
        })
    }

    async fn acquire(
        &self,
        state: &mut EngineState<K>,
        key: &InitRequest,
    ) -> SyncResult<Arc<NamedResourceCenter<K::Center>>> {
        if let Some(pooled) = state.centers.get_mut(key) {
            pooled.refs += 1;
            return Ok(Arc::clone(&pooled.center));
        }

        let resource_type = key.endpoint.resource_type;
        let mut center = self.backends.create(&resource_type).ok_or_else(|| {
            SyncError::unsupported_backend(key.endpoint.name.clone(), resource_type)
        })?;
        center.init(key).await?;

        let named = Arc::new(NamedResourceCenter::new(key.endpoint.clone(), K::wrap(center)));
        info!(
            kind = K::LABEL,
            endpoint = %key.endpoint.name,
            resource_type = %resource_type,
            "backend initialized"
        );
        state.centers.insert(
            key.clone(),
            PooledCenter {
                center: Arc::clone(&named),
                refs: 1,
            },
        );
        Ok(named)
    }

    async fn release(&self, state: &mut EngineState<K>, key: &InitRequest) {
        let Some(pooled) = state.centers.get_mut(key) else {
            return;
        };
        pooled.refs = pooled.refs.saturating_sub(1);
        if pooled.refs > 0 {
            return;
        }
        if let Some(pooled) = state.centers.remove(key) {
            pooled.center.center().destroy().await;
            info!(kind = K::LABEL, endpoint = %key.endpoint.name, "backend destroyed");
        }
    }

    /// The current revision's tasks.
    pub async fn tasks(&self) -> Vec<SyncTask> {
        self.state.lock().await.tasks.clone()
    }

    /// The backends serving a task, if it is running.
    pub async fn resources(&self, task: &str) -> Option<ResourceSet<K::Center>> {
        self.state
            .lock()
            .await
            .resources
            .get(task)
            .map(|r| r.set.clone())
    }

    /// A live backend by endpoint name.
    pub async fn center(&self, endpoint: &str) -> Option<Arc<NamedResourceCenter<K::Center>>> {
        self.state
            .lock()
            .await
            .centers
            .values()
            .find(|pooled| pooled.center.name() == endpoint)
            .map(|pooled| Arc::clone(&pooled.center))
    }

    /// Pull worker id per task.
    pub async fn pull_workers(&self) -> BTreeMap<String, u64> {
        self.state
            .lock()
            .await
            .pulls
            .iter()
            .map(|(name, handle)| (name.clone(), handle.id()))
            .collect()
    }

    /// Watch worker id per (task, match).
    pub fn watch_workers(&self) -> HashMap<WatchKey, u64> {
        self.watches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().worker.id()))
            .collect()
    }

    pub fn watch_state(&self, key: &WatchKey) -> Option<WatchState> {
        self.watches.get(key).map(|entry| *entry.value().state.lock())
    }

    /// Number of live backends.
    pub async fn live_centers(&self) -> usize {
        self.state.lock().await.centers.len()
    }
}

#[async_trait]
impl<K: SyncKind> HealthSource for TaskEngine<K> {
    async fn enabled_tasks(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| t.enable)
            .map(|t| t.name.clone())
            .collect()
    }

    async fn probe(&self, task: &str) -> Option<Vec<HealthRecord>> {
        let set = self.resources(task).await?;
        Some(vec![
            set.source.health_record().await,
            set.destination.health_record().await,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_plan_from_methods() {
        let plan = MethodPlan::from_methods(&[Method::watch(), Method::pull("30s")]);
        assert!(plan.watch);
        assert_eq!(plan.pull, Some(Duration::from_secs(30)));

        let mut disabled = Method::pull("30s");
        disabled.enable = false;
        assert!(MethodPlan::from_methods(&[disabled]).is_empty());
    }

    #[test]
    fn test_method_plan_interval_change_is_a_change() {
        let a = MethodPlan::from_methods(&[Method::pull("30s")]);
        let b = MethodPlan::from_methods(&[Method::pull("60s")]);
        assert_ne!(a, b);
        assert_eq!(a, MethodPlan::from_methods(&[Method::pull("30000")]));
    }

    #[test]
    fn test_reload_summary_noop() {
        assert!(ReloadSummary::default().is_noop());
        let summary = ReloadSummary {
            watch_added: 1,
            ..Default::default()
        };
        assert!(!summary.is_noop());
    }
}
