//! Reporter that keeps every batch it is handed.

use async_trait::async_trait;
use parking_lot::Mutex;
use regsync_core::{ReportHandler, Reporters, SyncResult};
use regsync_types::{ReportTarget, StatInfo, TargetType};
use std::sync::Arc;

#[derive(Default)]
struct Sink {
    batches: Mutex<Vec<StatInfo>>,
    targets: Mutex<Vec<ReportTarget>>,
}

/// Shared view over every reporter instance the factory created.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    sink: Arc<Sink>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory under `target_type`.
    pub fn register(&self, reporters: &mut Reporters, target_type: TargetType) {
        let sink = Arc::clone(&self.sink);
        reporters.register(target_type, move || {
            Box::new(RecordingHandler {
                sink: Arc::clone(&sink),
                target_type,
            }) as Box<dyn ReportHandler>
        });
    }

    pub fn batches(&self) -> Vec<StatInfo> {
        self.sink.batches.lock().clone()
    }

    /// Targets passed to `init`, in order.
    pub fn initialized(&self) -> Vec<ReportTarget> {
        self.sink.targets.lock().clone()
    }
}

struct RecordingHandler {
    sink: Arc<Sink>,
    target_type: TargetType,
}

#[async_trait]
impl ReportHandler for RecordingHandler {
    fn target_type(&self) -> TargetType {
        self.target_type
    }

    async fn init(&mut self, target: &ReportTarget) -> SyncResult<()> {
        self.sink.targets.lock().push(target.clone());
        Ok(())
    }

    async fn report_stat(&self, stat: &StatInfo) {
        self.sink.batches.lock().push(stat.clone());
    }
}
