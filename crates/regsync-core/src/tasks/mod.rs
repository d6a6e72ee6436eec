//! Units of work that move data from a source to a destination.
//!
//! - [`Reconcile`]: a full-state pull over a task's matches, run periodically
//! - [`Subscription`]: an event subscription for one match, driven by a
//!   [`WatchWorker`] until it is established
//! - [`UnwatchTask`]: the one-shot teardown of a subscription
//! - [`WatchHub`]: source subscriptions shared by every task watching the
//!   same entity on the same endpoint

mod config;
mod hub;
mod registry;
pub(crate) mod watch;

pub use config::{ConfigPullTask, ConfigSubscription};
pub use hub::{ConfigHub, Fanout, RegistryHub, WatchHub};
pub use registry::{RegistryPullTask, RegistrySubscription};
pub use watch::{UnwatchTask, WatchKey, WatchState, WatchWorker};

use crate::error::SyncResult;
use async_trait::async_trait;

/// A periodic full-state reconciliation.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Pushes the source's current state to the destination.
    async fn reconcile(&self) -> SyncResult<()>;
}

/// An event subscription on a source.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    /// Registers the listener; false if the source refused or failed.
    async fn subscribe(&self) -> bool;

    /// Removes the listener.
    async fn unsubscribe(&self);
}
