//! Config provider driven by the test.

use async_trait::async_trait;
use parking_lot::Mutex;
use regsync_core::{ConfigListener, ConfigProvider, Providers, SyncResult};
use regsync_types::SyncDocument;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct ManualState {
    document: Mutex<Option<SyncDocument>>,
    listeners: Mutex<Vec<Arc<dyn ConfigListener>>>,
    options: Mutex<Option<BTreeMap<String, String>>>,
    closed: AtomicBool,
}

/// A provider whose revisions are pushed by calling [`publish`](Self::publish).
#[derive(Clone, Default)]
pub struct ManualProvider {
    name: String,
    state: Arc<ManualState>,
}

impl ManualProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    /// Sets the revision returned by `get_config` without dispatching it.
    pub fn with_document(self, document: SyncDocument) -> Self {
        *self.state.document.lock() = Some(document);
        self
    }

    /// Registers this provider under its name.
    pub fn register(&self, providers: &mut Providers) {
        let this = self.clone();
        providers.register(self.name.clone(), move || {
            Box::new(this.clone()) as Box<dyn ConfigProvider>
        });
    }

    /// Stores `document` and hands it to each listener in order.
    pub async fn publish(&self, document: SyncDocument) {
        *self.state.document.lock() = Some(document.clone());
        let listeners = self.state.listeners.lock().clone();
        for listener in listeners {
            // The manager's dispatcher never fails; adapters in tests may.
            let _ = listener.on_change(&document).await;
        }
    }

    /// Options passed to `init`, if it ran.
    pub fn init_options(&self) -> Option<BTreeMap<String, String>> {
        self.state.options.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigProvider for ManualProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self, options: &BTreeMap<String, String>) -> SyncResult<()> {
        *self.state.options.lock() = Some(options.clone());
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ConfigListener>) {
        self.state.listeners.lock().push(listener);
    }

    fn get_config(&self) -> Option<SyncDocument> {
        self.state.document.lock().clone()
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}
