//! Watch subscription lifecycle.
//!
//! A watch worker owns one (task, match) subscription and moves through
//! `Unregistered → Subscribing → Subscribed`. A failed attempt drops back to
//! `Unregistered` and is retried after a fixed backoff for as long as the
//! (task, match) is still listed in the active-watch table and the worker's
//! token is live. Removing the entry turns the next attempt into a no-op exit.

use super::Subscription;
use crate::worker::WorkerHandle;
use dashmap::DashMap;
use parking_lot::Mutex;
use regsync_types::Match;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of one watch: the owning task and the match it serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub task: String,
    pub rule: Match,
}

impl WatchKey {
    pub fn new(task: impl Into<String>, rule: Match) -> Self {
        Self {
            task: task.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Unregistered,
    Subscribing,
    Subscribed,
    /// The worker exited without subscribing (cancelled or removed).
    Stopped,
}

/// Bookkeeping for one active watch.
pub(crate) struct WatchEntry {
    pub(crate) worker: WorkerHandle,
    pub(crate) subscription: Arc<dyn Subscription>,
    pub(crate) state: Arc<Mutex<WatchState>>,
}

pub(crate) type WatchTable = DashMap<WatchKey, WatchEntry>;

/// Drives one subscription until it is established or abandoned.
pub struct WatchWorker {
    key: WatchKey,
    subscription: Arc<dyn Subscription>,
    table: Arc<WatchTable>,
    state: Arc<Mutex<WatchState>>,
    initial_delay: Duration,
    retry_delay: Duration,
}

impl WatchWorker {
    pub(crate) fn new(
        key: WatchKey,
        subscription: Arc<dyn Subscription>,
        table: Arc<WatchTable>,
        state: Arc<Mutex<WatchState>>,
        initial_delay: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            key,
            subscription,
            table,
            state,
            initial_delay,
            retry_delay,
        }
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock() = state;
    }

    fn stop(&self) -> WatchState {
        self.set_state(WatchState::Stopped);
        WatchState::Stopped
    }

    pub async fn run(self, token: CancellationToken) -> WatchState {
        let mut delay = self.initial_delay;
        loop {
            tokio::select! {
                _ = token.cancelled() => return self.stop(),
                _ = tokio::time::sleep(delay) => {}
            }

            if token.is_cancelled() || !self.table.contains_key(&self.key) {
                debug!(task = %self.key.task, watch = %self.subscription.describe(), "watch no longer active");
                return self.stop();
            }

            self.set_state(WatchState::Subscribing);
            let subscribed = tokio::select! {
                _ = token.cancelled() => return self.stop(),
                ok = self.subscription.subscribe() => ok,
            };

            if subscribed {
                self.set_state(WatchState::Subscribed);
                info!(task = %self.key.task, watch = %self.subscription.describe(), "watch subscribed");
                return WatchState::Subscribed;
            }

            self.set_state(WatchState::Unregistered);
            warn!(
                task = %self.key.task,
                watch = %self.subscription.describe(),
                retry_in_ms = self.retry_delay.as_millis() as u64,
                "watch subscription failed, will retry"
            );
            delay = self.retry_delay;
        }
    }
}

/// One-shot removal of a source subscription.
pub struct UnwatchTask {
    subscription: Arc<dyn Subscription>,
}

impl UnwatchTask {
    pub fn new(subscription: Arc<dyn Subscription>) -> Self {
        Self { subscription }
    }

    pub async fn run(self) {
        debug!(watch = %self.subscription.describe(), "unwatching");
        self.subscription.unsubscribe().await;
    }
}
