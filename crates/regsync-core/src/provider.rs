//! Desired-state delivery.
//!
//! A [`ConfigProvider`] produces [`SyncDocument`] revisions. The
//! [`ConfigProviderManager`] sits between it and the consumers:
//!
//! - every accepted revision is written to a backup file before consumers
//!   see it, and `get_config` falls back to that file when the provider has
//!   nothing
//! - every consumer is wrapped so that if it fails on a revision it is
//!   immediately handed back the last revision it accepted; the backup is
//!   then restored to the previous revision as well
//! - revisions are dispatched one at a time, in registration order

use crate::error::{SyncError, SyncResult};
use crate::plugin::PluginTable;
use async_trait::async_trait;
use parking_lot::RwLock;
use regsync_types::SyncDocument;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// A consumer of document revisions.
#[async_trait]
pub trait ConfigListener: Send + Sync {
    /// Applies a revision. An error makes the manager replay the consumer's
    /// last accepted revision.
    async fn on_change(&self, document: &SyncDocument) -> SyncResult<()>;
}

/// A source of document revisions.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&mut self, options: &BTreeMap<String, String>) -> SyncResult<()>;

    /// Registers a listener; providers call listeners sequentially in
    /// registration order.
    fn add_listener(&self, listener: Arc<dyn ConfigListener>);

    /// The latest revision, if one has been read.
    fn get_config(&self) -> Option<SyncDocument>;

    async fn close(&self);
}

/// Registration table of provider implementations.
pub type Providers = PluginTable<String, dyn ConfigProvider>;

/// Which provider to use and where to keep the backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub name: String,
    pub options: BTreeMap<String, String>,
    pub backup_path: PathBuf,
}

/// The last-known-good revision on disk.
#[derive(Debug)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_raw(&self) -> SyncResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Io(e)),
        }
    }

    async fn write_raw(&self, bytes: &[u8]) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    /// Writes `document`, returning the bytes it replaced.
    pub async fn save(&self, document: &SyncDocument) -> SyncResult<Option<Vec<u8>>> {
        let previous = self.read_raw().await?;
        let text = document.to_json_pretty()?;
        self.write_raw(text.as_bytes()).await?;
        Ok(previous)
    }

    /// Puts back what [`save`](Self::save) replaced.
    pub async fn restore(&self, previous: Option<Vec<u8>>) -> SyncResult<()> {
        match previous {
            Some(bytes) => self.write_raw(&bytes).await,
            None => match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SyncError::Io(e)),
            },
        }
    }

    pub async fn load(&self) -> SyncResult<Option<SyncDocument>> {
        match self.read_raw().await? {
            Some(bytes) => Ok(Some(SyncDocument::from_json(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Replays a consumer's last accepted revision when it rejects a new one.
struct RollbackListener {
    inner: Arc<dyn ConfigListener>,
    last_good: Mutex<Option<SyncDocument>>,
}

impl RollbackListener {
    fn new(inner: Arc<dyn ConfigListener>) -> Self {
        Self {
            inner,
            last_good: Mutex::new(None),
        }
    }

    /// Returns false if the revision was rejected.
    async fn apply(&self, document: &SyncDocument) -> bool {
        let mut last_good = self.last_good.lock().await;
        match self.inner.on_change(document).await {
            Ok(()) => {
                *last_good = Some(document.clone());
                true
            }
            Err(e) => {
                error!(error = %e, "config listener rejected revision, rolling back");
                if let Some(previous) = last_good.as_ref() {
                    if let Err(e) = self.inner.on_change(previous).await {
                        error!(error = %e, "config listener failed to re-apply previous revision");
                    }
                }
                false
            }
        }
    }
}

/// The single listener registered with the provider.
struct Dispatcher {
    backup: Arc<BackupStore>,
    listeners: RwLock<Vec<Arc<RollbackListener>>>,
    serial: Mutex<()>,
}

#[async_trait]
impl ConfigListener for Dispatcher {
    async fn on_change(&self, document: &SyncDocument) -> SyncResult<()> {
        let _serial = self.serial.lock().await;

        let previous = match self.backup.save(document).await {
            Ok(previous) => Some(previous),
            Err(e) => {
                warn!(path = %self.backup.path().display(), error = %e, "failed to write config backup");
                None
            }
        };

        let listeners = self.listeners.read().clone();
        let mut rejected = false;
        for listener in &listeners {
            if !listener.apply(document).await {
                rejected = true;
            }
        }

        if rejected {
            if let Some(previous) = previous {
                if let Err(e) = self.backup.restore(previous).await {
                    warn!(error = %e, "failed to restore config backup");
                }
            }
        }
        Ok(())
    }
}

pub struct ConfigProviderManager {
    provider: Arc<dyn ConfigProvider>,
    backup: Arc<BackupStore>,
    dispatcher: Arc<Dispatcher>,
}

impl ConfigProviderManager {
    /// Selects and initializes the configured provider.
    pub async fn new(providers: &Providers, settings: ProviderSettings) -> SyncResult<Self> {
        let mut provider =
            providers
                .create(&settings.name)
                .ok_or_else(|| SyncError::ProviderNotFound {
                    name: settings.name.clone(),
                })?;

        let backup = Arc::new(BackupStore::new(settings.backup_path.clone()));
        let dispatcher = Arc::new(Dispatcher {
            backup: Arc::clone(&backup),
            listeners: RwLock::new(Vec::new()),
            serial: Mutex::new(()),
        });

        provider.init(&settings.options).await?;
        provider.add_listener(Arc::clone(&dispatcher) as Arc<dyn ConfigListener>);
        info!(
            provider = %settings.name,
            backup = %settings.backup_path.display(),
            "config provider initialized"
        );

        Ok(Self {
            provider: Arc::from(provider),
            backup,
            dispatcher,
        })
    }

    /// Registers a consumer behind the rollback wrapper.
    pub fn add_listener(&self, listener: Arc<dyn ConfigListener>) {
        self.dispatcher
            .listeners
            .write()
            .push(Arc::new(RollbackListener::new(listener)));
    }

    /// The provider's revision, or the backup when the provider has none.
    pub async fn get_config(&self) -> SyncResult<Option<SyncDocument>> {
        if let Some(document) = self.provider.get_config() {
            return Ok(Some(document));
        }
        let document = self.backup.load().await?;
        if document.is_some() {
            warn!(path = %self.backup.path().display(), "provider has no config, using backup");
        }
        Ok(document)
    }

    /// Records a revision applied outside the provider's dispatch (the
    /// initial load) as last-known-good, both on disk and for every
    /// registered consumer.
    pub async fn commit(&self, document: &SyncDocument) -> SyncResult<()> {
        let listeners = self.dispatcher.listeners.read().clone();
        for listener in &listeners {
            *listener.last_good.lock().await = Some(document.clone());
        }
        self.backup.save(document).await.map(|_| ())
    }

    pub async fn destroy(&self) {
        self.provider.close().await;
    }
}
