//! Registry pull and watch tasks.

use super::hub::{next_listener_id, RegistryHub};
use super::{Reconcile, Subscription};
use crate::center::{RegistryCenter, ResourceSet, WatchEvent, WatchListener};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use regsync_types::{Group, Instance, Match, ResourceEndpoint, Service};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

type Registries = ResourceSet<dyn RegistryCenter>;

/// Builds the service → effective groups selection of a task.
///
/// Empty matches are skipped. A later match for the same service replaces
/// an earlier one.
fn selections(matches: &[Match]) -> BTreeMap<Service, Vec<Group>> {
    matches
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| (m.service(), m.effective_groups()))
        .collect()
}

/// Copies the source's instances of one service group to the destination.
///
/// Instances are filtered by the group's metadata and rewritten to the
/// destination's service identity. Returns the number of instances pushed.
pub(crate) async fn sync_group(
    resources: &Registries,
    service: &Service,
    group: &Group,
) -> SyncResult<usize> {
    let listing = resources
        .source
        .center()
        .list_instances(service, group)
        .await;
    if !listing.code.is_success() {
        return Err(SyncError::backend(
            "list_instances",
            format!(
                "{} returned {} for {} group {}",
                resources.source.name(),
                listing.code,
                service,
                group.name
            ),
        ));
    }

    let target = resources.alias.service(service);
    let instances: Vec<Instance> = listing
        .items
        .into_iter()
        .filter(|instance| group.selects(&instance.metadata))
        .map(|mut instance| {
            instance.namespace = target.namespace.clone();
            instance.service = target.name.clone();
            instance
        })
        .collect();
    let count = instances.len();

    resources
        .destination
        .center()
        .update_instances(&target, group, instances)
        .await?;
    Ok(count)
}

/// Periodic full-state copy of a task's services.
pub struct RegistryPullTask {
    resources: Registries,
    selections: BTreeMap<Service, Vec<Group>>,
}

impl RegistryPullTask {
    pub fn new(resources: Registries, matches: &[Match]) -> Self {
        Self {
            resources,
            selections: selections(matches),
        }
    }

    /// Returns true if no match selects anything.
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Resolves `*` entries against the source's current service list.
    async fn expand(&self) -> SyncResult<BTreeMap<Service, Vec<Group>>> {
        let mut expanded = BTreeMap::new();
        let mut wildcards = Vec::new();
        for (service, groups) in &self.selections {
            if service.name == regsync_types::MATCH_ALL {
                wildcards.push((service, groups));
            } else {
                expanded.insert(service.clone(), groups.clone());
            }
        }

        for (pattern, groups) in wildcards {
            let listing = self
                .resources
                .source
                .center()
                .list_services(&pattern.namespace)
                .await;
            if !listing.code.is_success() {
                return Err(SyncError::backend(
                    "list_services",
                    format!(
                        "{} returned {} for namespace '{}'",
                        self.resources.source.name(),
                        listing.code,
                        pattern.namespace
                    ),
                ));
            }
            for service in listing.items {
                expanded.entry(service).or_insert_with(|| groups.clone());
            }
        }
        Ok(expanded)
    }
}

#[async_trait]
impl Reconcile for RegistryPullTask {
    fn describe(&self) -> String {
        format!(
            "registry pull {} -> {}",
            self.resources.source.name(),
            self.resources.destination.name()
        )
    }

    async fn reconcile(&self) -> SyncResult<()> {
        let selections = self.expand().await?;
        let alias = &self.resources.alias;
        let destination = self.resources.destination.center();

        let services: BTreeSet<Service> = selections.keys().map(|s| alias.service(s)).collect();
        destination.update_services(&services).await?;

        for (service, groups) in &selections {
            destination
                .update_groups(&alias.service(service), groups)
                .await?;
        }

        let mut pushed = 0;
        for (service, groups) in &selections {
            for group in groups {
                pushed += sync_group(&self.resources, service, group).await?;
            }
        }
        debug!(
            source = self.resources.source.name(),
            destination = self.resources.destination.name(),
            services = selections.len(),
            instances = pushed,
            "registry pull complete"
        );
        Ok(())
    }
}

/// Watch subscription for one service of a task.
///
/// Joins the hub under (source endpoint, service); the source itself is
/// watched once per key however many tasks share it.
pub struct RegistrySubscription {
    resources: Registries,
    service: Service,
    groups: Vec<Group>,
    runtime: Handle,
    hub: Arc<RegistryHub>,
    id: u64,
}

impl RegistrySubscription {
    /// Must be called from within a tokio runtime; event callbacks are
    /// dispatched onto it.
    pub fn new(resources: Registries, rule: &Match, hub: Arc<RegistryHub>) -> Self {
        Self {
            resources,
            service: rule.service(),
            groups: rule.effective_groups(),
            runtime: Handle::current(),
            hub,
            id: next_listener_id(),
        }
    }

    fn hub_key(&self) -> (ResourceEndpoint, Service) {
        (self.resources.source.endpoint().clone(), self.service.clone())
    }
}

#[async_trait]
impl Subscription for RegistrySubscription {
    fn describe(&self) -> String {
        format!("registry watch {} on {}", self.service, self.resources.source.name())
    }

    async fn subscribe(&self) -> bool {
        let listener: Arc<dyn WatchListener> = Arc::new(RegistryEventListener {
            resources: self.resources.clone(),
            service: self.service.clone(),
            groups: self.groups.clone(),
            runtime: self.runtime.clone(),
        });
        let source = self.resources.source.center();
        self.hub
            .join(self.hub_key(), self.id, listener, move |fanout| {
                source.watch(&self.service, Arc::new(fanout))
            })
            .await
    }

    async fn unsubscribe(&self) {
        let source = self.resources.source.center();
        self.hub
            .leave(&self.hub_key(), self.id, move || async move {
                source.unwatch(&self.service).await;
                info!(
                    service = %self.service,
                    source = self.resources.source.name(),
                    "unwatched service"
                );
            })
            .await;
    }
}

/// Re-reads the source on every event and pushes each group.
struct RegistryEventListener {
    resources: Registries,
    service: Service,
    groups: Vec<Group>,
    runtime: Handle,
}

impl WatchListener for RegistryEventListener {
    fn on_event(&self, event: WatchEvent) {
        debug!(
            service = %event.service,
            event_instances = event.instances.len(),
            "registry change event"
        );
        let resources = self.resources.clone();
        let service = self.service.clone();
        let groups = self.groups.clone();
        self.runtime.spawn(async move {
            for group in &groups {
                if let Err(e) = sync_group(&resources, &service, group).await {
                    warn!(service = %service, group = %group.name, error = %e, "watch sync failed");
                    return;
                }
            }
        });
    }
}
