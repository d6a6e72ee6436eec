//! Config-center pull and watch tasks.

use super::hub::{next_listener_id, ConfigHub};
use super::{Reconcile, Subscription};
use crate::center::{ConfigCenter, ConfigWatchEvent, ConfigWatchListener, ResourceSet};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use regsync_types::{ConfigFile, ConfigGroup, Match, ResourceEndpoint};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

type Configs = ResourceSet<dyn ConfigCenter>;

/// Copies every file of one config group to the destination.
pub(crate) async fn sync_config_group(resources: &Configs, group: &ConfigGroup) -> SyncResult<usize> {
    let listing = resources.source.center().list_config_files(group).await;
    if !listing.code.is_success() {
        return Err(SyncError::backend(
            "list_config_files",
            format!(
                "{} returned {} for {}",
                resources.source.name(),
                listing.code,
                group
            ),
        ));
    }

    let target = resources.alias.config_group(group);
    let files: Vec<ConfigFile> = listing
        .items
        .into_iter()
        .map(|mut file| {
            file.namespace = target.namespace.clone();
            file.group = target.name.clone();
            file
        })
        .collect();
    let count = files.len();

    resources
        .destination
        .center()
        .update_config_files(&target, files)
        .await?;
    Ok(count)
}

/// Periodic full-state copy of a task's config groups.
pub struct ConfigPullTask {
    resources: Configs,
    groups: BTreeSet<ConfigGroup>,
}

impl ConfigPullTask {
    pub fn new(resources: Configs, matches: &[Match]) -> Self {
        Self {
            resources,
            groups: matches
                .iter()
                .filter(|m| !m.is_empty())
                .map(Match::config_group)
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[async_trait]
impl Reconcile for ConfigPullTask {
    fn describe(&self) -> String {
        format!(
            "config pull {} -> {}",
            self.resources.source.name(),
            self.resources.destination.name()
        )
    }

    async fn reconcile(&self) -> SyncResult<()> {
        let alias = &self.resources.alias;
        let targets: BTreeSet<ConfigGroup> =
            self.groups.iter().map(|g| alias.config_group(g)).collect();
        self.resources
            .destination
            .center()
            .update_groups(&targets)
            .await?;

        let mut pushed = 0;
        for group in &self.groups {
            pushed += sync_config_group(&self.resources, group).await?;
        }
        debug!(
            source = self.resources.source.name(),
            groups = self.groups.len(),
            files = pushed,
            "config pull complete"
        );
        Ok(())
    }
}

/// Watch subscription for one config group of a task.
pub struct ConfigSubscription {
    resources: Configs,
    group: ConfigGroup,
    runtime: Handle,
    hub: Arc<ConfigHub>,
    id: u64,
}

impl ConfigSubscription {
    /// Must be called from within a tokio runtime.
    pub fn new(resources: Configs, rule: &Match, hub: Arc<ConfigHub>) -> Self {
        Self {
            resources,
            group: rule.config_group(),
            runtime: Handle::current(),
            hub,
            id: next_listener_id(),
        }
    }

    fn hub_key(&self) -> (ResourceEndpoint, ConfigGroup) {
        (self.resources.source.endpoint().clone(), self.group.clone())
    }
}

#[async_trait]
impl Subscription for ConfigSubscription {
    fn describe(&self) -> String {
        format!("config watch {} on {}", self.group, self.resources.source.name())
    }

    async fn subscribe(&self) -> bool {
        let listener: Arc<dyn ConfigWatchListener> = Arc::new(ConfigEventListener {
            resources: self.resources.clone(),
            group: self.group.clone(),
            runtime: self.runtime.clone(),
        });
        let source = self.resources.source.center();
        self.hub
            .join(self.hub_key(), self.id, listener, move |fanout| {
                source.watch(&self.group, Arc::new(fanout))
            })
            .await
    }

    async fn unsubscribe(&self) {
        let source = self.resources.source.center();
        self.hub
            .leave(&self.hub_key(), self.id, move || async move {
                source.unwatch(&self.group).await;
                info!(group = %self.group, source = self.resources.source.name(), "unwatched config group");
            })
            .await;
    }
}

struct ConfigEventListener {
    resources: Configs,
    group: ConfigGroup,
    runtime: Handle,
}

impl ConfigWatchListener for ConfigEventListener {
    fn on_event(&self, event: ConfigWatchEvent) {
        debug!(group = %event.group, event_files = event.files.len(), "config change event");
        let resources = self.resources.clone();
        let group = self.group.clone();
        self.runtime.spawn(async move {
            if let Err(e) = sync_config_group(&resources, &group).await {
                warn!(group = %group, error = %e, "config watch sync failed");
            }
        });
    }
}
