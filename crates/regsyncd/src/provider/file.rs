//! Sync document read from a local JSON or YAML file.
//!
//! The file is read once at `init` and then polled. A revision is dispatched
//! only when the file's bytes differ from the last read; a file that fails to
//! parse is logged and skipped until it changes again.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use regsync_core::{fixed_delay, ConfigListener, ConfigProvider, SyncError, SyncResult, WorkerHandle};
use regsync_types::{defaults, duration::parse_interval, SyncDocument};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const PROVIDER_NAME: &str = "file";

/// Path of the watched document (required).
pub const OPTION_WATCH_FILE: &str = "watch_file";

/// Poll period, e.g. `30s` (optional).
pub const OPTION_INTERVAL: &str = "interval";

#[derive(Default)]
struct FileState {
    content: Mutex<Option<Vec<u8>>>,
    document: RwLock<Option<SyncDocument>>,
    listeners: RwLock<Vec<Arc<dyn ConfigListener>>>,
}

impl FileState {
    /// Reads the file and stores a new revision if its bytes changed.
    ///
    /// Returns the revision to dispatch, if any.
    async fn refresh(&self, path: &Path) -> Option<SyncDocument> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "watched config file does not exist");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read watched config file");
                return None;
            }
        };

        {
            let mut content = self.content.lock();
            if content.as_deref() == Some(bytes.as_slice()) {
                return None;
            }
            *content = Some(bytes.clone());
        }

        match SyncDocument::from_path_bytes(&path.to_string_lossy(), &bytes) {
            Ok(document) => {
                *self.document.write() = Some(document.clone());
                Some(document)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "watched config file is invalid, ignoring");
                None
            }
        }
    }

    async fn dispatch(&self, document: &SyncDocument) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.on_change(document).await {
                warn!(error = %e, "config listener failed");
            }
        }
    }
}

pub struct FileConfigProvider {
    path: PathBuf,
    interval: Duration,
    state: Arc<FileState>,
    poller: Mutex<Option<WorkerHandle>>,
    root: CancellationToken,
}

impl FileConfigProvider {
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            interval: Duration::from_millis(defaults::FILE_POLL_INTERVAL_MS),
            state: Arc::default(),
            poller: Mutex::new(None),
            root: CancellationToken::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for FileConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn init(&mut self, options: &BTreeMap<String, String>) -> SyncResult<()> {
        let path = options
            .get(OPTION_WATCH_FILE)
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                SyncError::invalid_config(
                    format!("provider.options.{}", OPTION_WATCH_FILE),
                    "path of the watched file is required",
                )
            })?;
        self.path = PathBuf::from(path);
        self.interval = parse_interval(
            options.get(OPTION_INTERVAL).map(String::as_str),
            defaults::FILE_POLL_INTERVAL_MS,
        );

        if self.state.refresh(&self.path).await.is_none() {
            warn!(path = %self.path.display(), "no config read from watched file at startup");
        }

        let state = Arc::clone(&self.state);
        let path = self.path.clone();
        let interval = self.interval;
        let handle = WorkerHandle::spawn(&self.root, move |token| {
            fixed_delay(
                "file provider poll".to_string(),
                interval,
                interval,
                token,
                move || {
                    let state = Arc::clone(&state);
                    let path = path.clone();
                    async move {
                        if let Some(document) = state.refresh(&path).await {
                            info!(path = %path.display(), "watched config file changed");
                            state.dispatch(&document).await;
                        }
                    }
                },
            )
        });
        *self.poller.lock() = Some(handle);

        info!(
            path = %self.path.display(),
            interval_ms = self.interval.as_millis() as u64,
            "file config provider started"
        );
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn ConfigListener>) {
        self.state.listeners.write().push(listener);
    }

    fn get_config(&self) -> Option<SyncDocument> {
        self.state.document.read().clone()
    }

    async fn close(&self) {
        let poller = self.poller.lock().take();
        if let Some(handle) = poller {
            handle.shutdown().await;
        }
        self.root.cancel();
    }
}
