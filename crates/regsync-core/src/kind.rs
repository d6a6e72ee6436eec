//! The capability a [`TaskEngine`](crate::TaskEngine) is specialized over.
//!
//! Registry and config synchronization share one engine; they differ only
//! in which backend trait they drive and which tasks they build.

use crate::center::{ConfigCenter, RegistryCenter, ResourceCenter, ResourceSet};
use crate::tasks::{
    ConfigHub, ConfigPullTask, ConfigSubscription, Reconcile, RegistryHub, RegistryPullTask,
    RegistrySubscription, Subscription,
};
use crate::validate::MatchRules;
use crate::wrapper::{ConfigCenterWrapper, RegistryCenterWrapper};
use regsync_types::Match;
use std::sync::Arc;

pub trait SyncKind: Send + Sync + 'static {
    /// The backend trait object this kind drives.
    type Center: ?Sized + ResourceCenter + 'static;

    /// Shared source subscriptions of this kind.
    type Hub: Default + Send + Sync + 'static;

    /// Label used in logs.
    const LABEL: &'static str;

    /// How this kind's match rules are validated.
    const MATCH_RULES: MatchRules;

    /// Wraps a freshly initialized backend with its write locks.
    fn wrap(center: Box<Self::Center>) -> Arc<Self::Center>;

    /// Builds the pull task for a task's matches, or `None` if no match
    /// selects anything.
    fn pull_task(resources: ResourceSet<Self::Center>, matches: &[Match])
        -> Option<Arc<dyn Reconcile>>;

    /// Builds the watch subscription for one match, joined through `hub`.
    fn subscription(
        resources: ResourceSet<Self::Center>,
        rule: &Match,
        hub: &Arc<Self::Hub>,
    ) -> Arc<dyn Subscription>;
}

/// Service registry synchronization.
pub struct RegistryKind;

impl SyncKind for RegistryKind {
    type Center = dyn RegistryCenter;
    type Hub = RegistryHub;

    const LABEL: &'static str = "registry";
    const MATCH_RULES: MatchRules = MatchRules::Registry;

    fn wrap(center: Box<dyn RegistryCenter>) -> Arc<dyn RegistryCenter> {
        Arc::new(RegistryCenterWrapper::new(center))
    }

    fn pull_task(
        resources: ResourceSet<dyn RegistryCenter>,
        matches: &[Match],
    ) -> Option<Arc<dyn Reconcile>> {
        let task = RegistryPullTask::new(resources, matches);
        if task.is_empty() {
            None
        } else {
            Some(Arc::new(task))
        }
    }

    fn subscription(
        resources: ResourceSet<dyn RegistryCenter>,
        rule: &Match,
        hub: &Arc<RegistryHub>,
    ) -> Arc<dyn Subscription> {
        Arc::new(RegistrySubscription::new(resources, rule, Arc::clone(hub)))
    }
}

/// Configuration file synchronization.
pub struct ConfigKind;

impl SyncKind for ConfigKind {
    type Center = dyn ConfigCenter;
    type Hub = ConfigHub;

    const LABEL: &'static str = "config";
    const MATCH_RULES: MatchRules = MatchRules::Config;

    fn wrap(center: Box<dyn ConfigCenter>) -> Arc<dyn ConfigCenter> {
        Arc::new(ConfigCenterWrapper::new(center))
    }

    fn pull_task(
        resources: ResourceSet<dyn ConfigCenter>,
        matches: &[Match],
    ) -> Option<Arc<dyn Reconcile>> {
        let task = ConfigPullTask::new(resources, matches);
        if task.is_empty() {
            None
        } else {
            Some(Arc::new(task))
        }
    }

    fn subscription(
        resources: ResourceSet<dyn ConfigCenter>,
        rule: &Match,
        hub: &Arc<ConfigHub>,
    ) -> Arc<dyn Subscription> {
        Arc::new(ConfigSubscription::new(resources, rule, Arc::clone(hub)))
    }
}
