//! The sync server.
//!
//! Composes the config provider manager, the registry and config engines,
//! one health scheduler per engine and the stat aggregator. Every document
//! revision is validated against both engines and the reporter table before
//! any component is touched; an invalid revision is rejected as a whole and
//! the provider manager rolls the server back to the last good one.

use crate::error::{DaemonError, Result};
use crate::provider::file::{FileConfigProvider, PROVIDER_NAME};
use crate::reporter::FileReportHandler;
use async_trait::async_trait;
use regsync_core::{
    verify_report, ConfigBackends, ConfigEngine, ConfigListener, ConfigProvider,
    ConfigProviderManager, HealthCheckScheduler, HealthSource, ProviderSettings, Providers,
    RegistryBackends, RegistryEngine, ReportHandler, Reporters, StatReportAggregator, SyncResult,
    WatchTiming,
};
use regsync_types::{duration::parse_interval, SyncDocument, TargetType};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Settings the server takes from the bootstrap config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub provider: ProviderSettings,
    /// Flush period when the document sets none.
    pub flush_interval: Duration,
}

/// Registers the plugins a server can use.
///
/// Starts with the file provider and the file reporter. Backend adapters are
/// registered by the embedder.
pub struct SyncServerBuilder {
    registry_backends: RegistryBackends,
    config_backends: ConfigBackends,
    reporters: Reporters,
    providers: Providers,
    watch_timing: WatchTiming,
}

impl SyncServerBuilder {
    pub fn new() -> Self {
        let mut providers = Providers::new();
        providers.register(PROVIDER_NAME.to_string(), || {
            Box::new(FileConfigProvider::new()) as Box<dyn ConfigProvider>
        });
        let mut reporters = Reporters::new();
        reporters.register(TargetType::File, || {
            Box::new(FileReportHandler::new()) as Box<dyn ReportHandler>
        });
        Self {
            registry_backends: RegistryBackends::new(),
            config_backends: ConfigBackends::new(),
            reporters,
            providers,
            watch_timing: WatchTiming::default(),
        }
    }

    pub fn registry_backends_mut(&mut self) -> &mut RegistryBackends {
        &mut self.registry_backends
    }

    pub fn config_backends_mut(&mut self) -> &mut ConfigBackends {
        &mut self.config_backends
    }

    pub fn reporters_mut(&mut self) -> &mut Reporters {
        &mut self.reporters
    }

    pub fn providers_mut(&mut self) -> &mut Providers {
        &mut self.providers
    }

    pub fn with_watch_timing(mut self, timing: WatchTiming) -> Self {
        self.watch_timing = timing;
        self
    }

    pub fn build(self, settings: ServerSettings) -> SyncServer {
        let registry = Arc::new(
            RegistryEngine::new(self.registry_backends).with_watch_timing(self.watch_timing),
        );
        let config =
            Arc::new(ConfigEngine::new(self.config_backends).with_watch_timing(self.watch_timing));
        let aggregator = Arc::new(StatReportAggregator::new(self.reporters));
        let registry_health = HealthCheckScheduler::new(
            Arc::clone(&registry) as Arc<dyn HealthSource>,
            Arc::clone(&aggregator),
        );
        let config_health = HealthCheckScheduler::new(
            Arc::clone(&config) as Arc<dyn HealthSource>,
            Arc::clone(&aggregator),
        );

        SyncServer {
            settings,
            providers: self.providers,
            components: Arc::new(Components {
                registry,
                config,
                registry_health,
                config_health,
                aggregator,
            }),
            manager: Mutex::new(None),
        }
    }
}

impl Default for SyncServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Components {
    registry: Arc<RegistryEngine>,
    config: Arc<ConfigEngine>,
    registry_health: HealthCheckScheduler,
    config_health: HealthCheckScheduler,
    aggregator: Arc<StatReportAggregator>,
}

impl Components {
    fn verify(&self, document: &SyncDocument) -> SyncResult<()> {
        self.registry.validate(&document.tasks, &document.methods)?;
        self.config
            .validate(&document.config_tasks, &document.methods)?;
        verify_report(document.report.as_ref(), |t| self.aggregator.supports(t))
    }

    async fn apply(&self, document: &SyncDocument) -> SyncResult<()> {
        self.verify(document)?;

        let registry = self
            .registry
            .reload(&document.tasks, &document.methods)
            .await?;
        let config = self
            .config
            .reload(&document.config_tasks, &document.methods)
            .await?;
        self.registry_health
            .reload(document.health_check.as_ref())
            .await;
        self.config_health
            .reload(document.health_check.as_ref())
            .await;
        self.aggregator.reload(document.report.as_ref()).await;

        info!(
            tasks = document.tasks.len(),
            config_tasks = document.config_tasks.len(),
            registry_unchanged = registry.is_noop(),
            config_unchanged = config.is_noop(),
            "sync document applied"
        );
        Ok(())
    }
}

/// Feeds provider revisions into the components.
struct ServerListener {
    components: Arc<Components>,
}

#[async_trait]
impl ConfigListener for ServerListener {
    async fn on_change(&self, document: &SyncDocument) -> SyncResult<()> {
        self.components.apply(document).await
    }
}

pub struct SyncServer {
    settings: ServerSettings,
    providers: Providers,
    components: Arc<Components>,
    manager: Mutex<Option<ConfigProviderManager>>,
}

impl SyncServer {
    /// Loads the first document, applies it and starts following the
    /// provider.
    pub async fn init(&self) -> Result<()> {
        let manager =
            ConfigProviderManager::new(&self.providers, self.settings.provider.clone()).await?;

        let document = match manager.get_config().await {
            Ok(Some(document)) => document,
            Ok(None) => {
                manager.destroy().await;
                return Err(DaemonError::NoDocument {
                    provider: self.settings.provider.name.clone(),
                });
            }
            Err(e) => {
                manager.destroy().await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.components.apply(&document).await {
            manager.destroy().await;
            return Err(e.into());
        }

        let default_ms = self.settings.flush_interval.as_millis() as u64;
        let period = match document.report.as_ref().and_then(|r| r.interval.as_deref()) {
            Some(interval) => parse_interval(Some(interval), default_ms),
            None => self.settings.flush_interval,
        };
        self.components.aggregator.start(period);

        manager.add_listener(Arc::new(ServerListener {
            components: Arc::clone(&self.components),
        }));
        if let Err(e) = manager.commit(&document).await {
            warn!(error = %e, "failed to record initial document as last known good");
        }

        *self.manager.lock().await = Some(manager);
        info!(provider = %self.settings.provider.name, "sync server started");
        Ok(())
    }

    /// Stops the provider, then every worker, then the aggregator.
    pub async fn destroy(&self) {
        let manager = self.manager.lock().await.take();
        if let Some(manager) = manager {
            manager.destroy().await;
        }
        let c = &self.components;
        c.registry_health.destroy().await;
        c.config_health.destroy().await;
        c.registry.destroy().await;
        c.config.destroy().await;
        c.aggregator.destroy().await;
        info!("sync server stopped");
    }

    pub fn registry(&self) -> &RegistryEngine {
        &self.components.registry
    }

    pub fn config(&self) -> &ConfigEngine {
        &self.components.config
    }

    pub fn aggregator(&self) -> &StatReportAggregator {
        &self.components.aggregator
    }

    pub fn registry_health(&self) -> &HealthCheckScheduler {
        &self.components.registry_health
    }

    pub fn config_health(&self) -> &HealthCheckScheduler {
        &self.components.config_health
    }
}
