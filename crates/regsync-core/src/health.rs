//! Periodic health probing of running tasks.
//!
//! One probe worker per enabled task reads (and resets) the health
//! counters of the task's source and destination and forwards both readings
//! to the [`StatReportAggregator`].

use crate::stat::StatReportAggregator;
use crate::worker::{fixed_delay, WorkerHandle};
use async_trait::async_trait;
use regsync_types::{defaults, HealthCheckConfig, HealthRecord};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Something whose tasks can be probed.
#[async_trait]
pub trait HealthSource: Send + Sync {
    /// Names of the currently enabled tasks.
    async fn enabled_tasks(&self) -> Vec<String>;

    /// Reads the source and destination health of a task, or `None` if the
    /// task has no live backends.
    async fn probe(&self, task: &str) -> Option<Vec<HealthRecord>>;
}

struct SchedulerState {
    enabled: bool,
    interval: Duration,
    probes: HashMap<String, WorkerHandle>,
}

impl SchedulerState {
    async fn clear(&mut self) {
        for (_, handle) in self.probes.drain() {
            handle.shutdown().await;
        }
    }
}

pub struct HealthCheckScheduler {
    source: Arc<dyn HealthSource>,
    aggregator: Arc<StatReportAggregator>,
    state: Mutex<SchedulerState>,
    root: CancellationToken,
}

impl HealthCheckScheduler {
    pub fn new(source: Arc<dyn HealthSource>, aggregator: Arc<StatReportAggregator>) -> Self {
        Self {
            source,
            aggregator,
            state: Mutex::new(SchedulerState {
                enabled: false,
                interval: Duration::from_millis(defaults::HEALTH_CHECK_INTERVAL_MS),
                probes: HashMap::new(),
            }),
            root: CancellationToken::new(),
        }
    }

    pub async fn init(&self, config: Option<&HealthCheckConfig>) {
        self.reload(config).await
    }

    /// Aligns the probe set with the source's enabled tasks.
    ///
    /// A missing or disabled config cancels every probe; an interval change
    /// reschedules all of them.
    pub async fn reload(&self, config: Option<&HealthCheckConfig>) {
        let mut state = self.state.lock().await;
        let Some(config) = config.filter(|c| c.enable) else {
            if state.enabled {
                info!("health check disabled");
            }
            state.enabled = false;
            state.clear().await;
            return;
        };

        let interval = config.interval();
        if interval != state.interval {
            info!(
                interval_ms = interval.as_millis() as u64,
                "health check interval changed, rescheduling"
            );
            state.clear().await;
            state.interval = interval;
        }
        state.enabled = true;

        let wanted: HashSet<String> = self.source.enabled_tasks().await.into_iter().collect();
        let stale: Vec<String> = state
            .probes
            .keys()
            .filter(|name| !wanted.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(handle) = state.probes.remove(&name) {
                handle.shutdown().await;
                debug!(task = %name, "health probe cancelled");
            }
        }

        for name in wanted {
            if state.probes.contains_key(&name) {
                continue;
            }
            let handle = self.spawn_probe(name.clone(), interval);
            state.probes.insert(name, handle);
        }
    }

    fn spawn_probe(&self, task: String, interval: Duration) -> WorkerHandle {
        let source = Arc::clone(&self.source);
        let aggregator = Arc::clone(&self.aggregator);
        let label = format!("health probe {}", task);
        WorkerHandle::spawn(&self.root, move |token| {
            fixed_delay(label, interval, interval, token, move || {
                let source = Arc::clone(&source);
                let aggregator = Arc::clone(&aggregator);
                let task = task.clone();
                async move {
                    match source.probe(&task).await {
                        Some(records) => {
                            for record in records {
                                aggregator.report_record(record);
                            }
                        }
                        None => warn!(task = %task, "health probe found no backends for task"),
                    }
                }
            })
        })
    }

    /// Names of tasks currently probed.
    pub async fn scheduled(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.probes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe worker id per task.
    pub async fn probe_workers(&self) -> BTreeMap<String, u64> {
        self.state
            .lock()
            .await
            .probes
            .iter()
            .map(|(name, handle)| (name.clone(), handle.id()))
            .collect()
    }

    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        state.enabled = false;
        state.clear().await;
        self.root.cancel();
    }
}
