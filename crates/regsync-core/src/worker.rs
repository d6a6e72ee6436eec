//! Handles for scheduled background workers.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// A spawned worker together with the token that stops it.
///
/// The id is unique per process and identifies one scheduled worker for
/// its whole life, so callers can tell a kept worker from a replaced one.
#[derive(Debug)]
pub struct WorkerHandle {
    id: u64,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawns `body` with a fresh child of `parent`.
    pub fn spawn<F, Fut>(parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let join = tokio::spawn(body(token.clone()));
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed),
            token,
            join,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the worker to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Signals the worker to stop and waits until it has.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            if e.is_panic() {
                error!(worker = self.id, "worker panicked during shutdown");
            }
        }
    }
}

/// Runs one unit of periodic work, containing any panic it raises.
///
/// Returns false if the work panicked.
pub async fn guarded<F>(label: &str, work: F) -> bool
where
    F: Future<Output = ()>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(()) => true,
        Err(_) => {
            error!(worker = label, "periodic work panicked; will run again next period");
            false
        }
    }
}

/// Repeats `tick` with a fixed delay between the end of one run and the
/// start of the next, until `token` is cancelled.
pub async fn fixed_delay<F, Fut>(
    label: String,
    initial_delay: Duration,
    period: Duration,
    token: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut delay = initial_delay;
    loop {
        if !delay.is_zero() {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tokio::select! {
            _ = token.cancelled() => return,
            _ = guarded(&label, tick()) => {}
        }
        delay = period;
    }
}
