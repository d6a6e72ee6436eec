//! Health stat aggregation and reporting.
//!
//! Readings are accumulated per [`Dimension`]. Every flush takes a
//! read-and-reset snapshot of all counters and hands the batch to each
//! enabled reporter. A dimension found at (0, 0) on two consecutive flushes
//! is evicted so counters for removed tasks do not pile up.

use crate::error::SyncResult;
use crate::plugin::PluginTable;
use crate::worker::{fixed_delay, WorkerHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use regsync_types::{
    defaults, Dimension, Health, HealthRecord, ReportConfig, ReportTarget, StatInfo, TargetType,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A destination for flushed stat batches.
#[async_trait]
pub trait ReportHandler: Send + Sync {
    fn target_type(&self) -> TargetType;

    async fn init(&mut self, target: &ReportTarget) -> SyncResult<()>;

    async fn report_stat(&self, stat: &StatInfo);
}

/// Registration table of reporter implementations.
pub type Reporters = PluginTable<TargetType, dyn ReportHandler>;

#[derive(Debug, Default)]
struct Counter {
    total: AtomicU64,
    errors: AtomicU64,
}

impl Counter {
    fn add(&self, health: Health) {
        self.total.fetch_add(health.total, Ordering::Relaxed);
        self.errors.fetch_add(health.errors, Ordering::Relaxed);
    }

    fn take(&self) -> Health {
        Health::new(
            self.total.swap(0, Ordering::Relaxed),
            self.errors.swap(0, Ordering::Relaxed),
        )
    }

    fn is_zero(&self) -> bool {
        self.total.load(Ordering::Relaxed) == 0 && self.errors.load(Ordering::Relaxed) == 0
    }
}

pub struct StatReportAggregator {
    reporters: Reporters,
    counters: DashMap<Dimension, Counter>,
    quiet: Mutex<HashSet<Dimension>>,
    handlers: RwLock<Arc<Vec<Arc<dyn ReportHandler>>>>,
    targets: tokio::sync::Mutex<Option<HashSet<ReportTarget>>>,
    ticker: Mutex<Option<WorkerHandle>>,
    root: CancellationToken,
}

impl StatReportAggregator {
    pub fn new(reporters: Reporters) -> Self {
        Self {
            reporters,
            counters: DashMap::new(),
            quiet: Mutex::new(HashSet::new()),
            handlers: RwLock::new(Arc::new(Vec::new())),
            targets: tokio::sync::Mutex::new(None),
            ticker: Mutex::new(None),
            root: CancellationToken::new(),
        }
    }

    /// Returns true if a reporter is registered for `target_type`.
    pub fn supports(&self, target_type: TargetType) -> bool {
        self.reporters.supports(&target_type)
    }

    /// Installs reporters and starts the flush loop.
    pub async fn init(self: &Arc<Self>, config: Option<&ReportConfig>) {
        self.reload(config).await;
        let period = config.map_or(
            Duration::from_millis(defaults::REPORT_INTERVAL_MS),
            ReportConfig::interval,
        );
        self.start(period);
    }

    /// Starts the flush loop; the first flush happens one period from now.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *ticker = Some(WorkerHandle::spawn(&self.root, move |token| {
            fixed_delay("stat flush".to_string(), period, period, token, move || {
                let this = Arc::clone(&this);
                async move {
                    this.flush().await;
                }
            })
        }));
        info!(period_ms = period.as_millis() as u64, "stat report started");
    }

    /// Swaps the reporter set if the enabled targets changed.
    pub async fn reload(&self, config: Option<&ReportConfig>) {
        let targets: HashSet<ReportTarget> = config
            .map(|c| c.targets.iter().filter(|t| t.enable).cloned().collect())
            .unwrap_or_default();

        let mut last = self.targets.lock().await;
        if last.as_ref() == Some(&targets) {
            return;
        }

        let mut handlers: Vec<Arc<dyn ReportHandler>> = Vec::with_capacity(targets.len());
        for target in &targets {
            let Some(mut handler) = self.reporters.create(&target.target_type) else {
                error!(target_type = %target.target_type, "no reporter registered for target type");
                continue;
            };
            match handler.init(target).await {
                Ok(()) => handlers.push(Arc::from(handler)),
                Err(e) => {
                    error!(target_type = %target.target_type, error = %e, "failed to init reporter")
                }
            }
        }
        info!(reporters = handlers.len(), "stat reporters reloaded");
        *self.handlers.write() = Arc::new(handlers);
        *last = Some(targets);
    }

    /// Accumulates one reading.
    pub fn report_health_status(&self, dimension: Dimension, health: Health) {
        self.counters.entry(dimension.clone()).or_default().add(health);
        if !health.is_zero() {
            self.quiet.lock().remove(&dimension);
        }
    }

    pub fn report_record(&self, record: HealthRecord) {
        self.report_health_status(record.dimension, Health::new(record.total, record.errors));
    }

    /// Evicts quiet dimensions, snapshots-and-resets the rest and hands
    /// the batch to every reporter. Returns the batch.
    pub async fn flush(&self) -> StatInfo {
        self.collect_garbage();

        let mut records: Vec<HealthRecord> = self
            .counters
            .iter()
            .map(|entry| {
                let health = entry.value().take();
                HealthRecord {
                    dimension: entry.key().clone(),
                    total: health.total,
                    errors: health.errors,
                }
            })
            .collect();
        records.sort_by(|a, b| a.dimension.cmp(&b.dimension));
        let stat = StatInfo { records };

        let handlers = Arc::clone(&self.handlers.read());
        for handler in handlers.iter() {
            handler.report_stat(&stat).await;
        }
        stat
    }

    fn collect_garbage(&self) {
        let mut quiet = self.quiet.lock();
        let zero: Vec<Dimension> = self
            .counters
            .iter()
            .filter(|entry| entry.value().is_zero())
            .map(|entry| entry.key().clone())
            .collect();

        let mut still_quiet = HashSet::with_capacity(zero.len());
        for dimension in zero {
            if quiet.contains(&dimension)
                && self
                    .counters
                    .remove_if(&dimension, |_, counter| counter.is_zero())
                    .is_some()
            {
                debug!(name = %dimension.name, "evicted quiet stat dimension");
                continue;
            }
            still_quiet.insert(dimension);
        }
        *quiet = still_quiet;
    }

    /// Dimensions currently tracked.
    pub fn dimensions(&self) -> Vec<Dimension> {
        let mut dims: Vec<Dimension> = self.counters.iter().map(|e| e.key().clone()).collect();
        dims.sort();
        dims
    }

    pub fn reporter_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub async fn destroy(&self) {
        let ticker = self.ticker.lock().take();
        if let Some(handle) = ticker {
            handle.shutdown().await;
        }
        self.root.cancel();
        *self.handlers.write() = Arc::new(Vec::new());
    }
}
