//! Shared source subscriptions.
//!
//! Tasks that read from the same endpoint share one pooled source backend,
//! so several (task, match) watches can target the same source entity. The
//! hub holds one backend subscription per (source endpoint, entity) and fans
//! each event out to every listener joined under that key. The backend is
//! only asked to unwatch once the last listener has left.

use crate::center::{ConfigWatchEvent, ConfigWatchListener, WatchEvent, WatchListener};
use parking_lot::RwLock;
use regsync_types::{ConfigGroup, ResourceEndpoint, Service};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// A process-unique id for one joined listener.
pub(crate) fn next_listener_id() -> u64 {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

type Listeners<L> = Arc<RwLock<BTreeMap<u64, Arc<L>>>>;

/// The single listener handed to the backend for one key.
pub struct Fanout<L: ?Sized> {
    listeners: Listeners<L>,
}

impl<L: ?Sized> Fanout<L> {
    fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.read().values().cloned().collect()
    }
}

impl WatchListener for Fanout<dyn WatchListener> {
    fn on_event(&self, event: WatchEvent) {
        for listener in self.snapshot() {
            listener.on_event(event.clone());
        }
    }
}

impl ConfigWatchListener for Fanout<dyn ConfigWatchListener> {
    fn on_event(&self, event: ConfigWatchEvent) {
        for listener in self.snapshot() {
            listener.on_event(event.clone());
        }
    }
}

/// Subscriptions on registry sources, keyed by service.
pub type RegistryHub = WatchHub<Service, dyn WatchListener>;

/// Subscriptions on config sources, keyed by config group.
pub type ConfigHub = WatchHub<ConfigGroup, dyn ConfigWatchListener>;

/// Refcounted subscriptions keyed by (source endpoint, entity).
pub struct WatchHub<E, L: ?Sized> {
    entries: Mutex<HashMap<(ResourceEndpoint, E), Listeners<L>>>,
}

impl<E, L: ?Sized> Default for WatchHub<E, L> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<E, L> WatchHub<E, L>
where
    E: Clone + Eq + Hash,
    L: ?Sized,
{
    /// Adds `listener` under `key`.
    ///
    /// `watch` is called with the key's fan-out only when the key has no live
    /// backend subscription. If it fails the listener is not kept and false
    /// is returned.
    pub async fn join<F, Fut>(
        &self,
        key: (ResourceEndpoint, E),
        id: u64,
        listener: Arc<L>,
        watch: F,
    ) -> bool
    where
        F: FnOnce(Fanout<L>) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(listeners) = entries.get(&key) {
            listeners.write().insert(id, listener);
            return true;
        }

        let listeners: Listeners<L> = Arc::new(RwLock::new(BTreeMap::from([(id, listener)])));
        let fanout = Fanout {
            listeners: Arc::clone(&listeners),
        };
        if !watch(fanout).await {
            return false;
        }
        entries.insert(key, listeners);
        true
    }

    /// Removes listener `id` from `key`.
    ///
    /// `unwatch` runs unless other listeners are still joined under the key.
    pub async fn leave<F, Fut>(&self, key: &(ResourceEndpoint, E), id: u64, unwatch: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut entries = self.entries.lock().await;
        let remaining = match entries.get(key) {
            Some(listeners) => {
                let mut listeners = listeners.write();
                listeners.remove(&id);
                listeners.len()
            }
            None => 0,
        };
        if remaining > 0 {
            debug!(endpoint = %key.0.name, remaining, "source subscription still shared");
            return;
        }
        entries.remove(key);
        unwatch().await;
    }

    /// Number of listeners joined under `key`.
    pub async fn listeners(&self, key: &(ResourceEndpoint, E)) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |listeners| listeners.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use regsync_types::ResourceType;

    #[derive(Default)]
    struct Counting {
        seen: SyncMutex<usize>,
    }

    impl WatchListener for Counting {
        fn on_event(&self, _event: WatchEvent) {
            *self.seen.lock() += 1;
        }
    }

    fn key() -> (ResourceEndpoint, Service) {
        (
            ResourceEndpoint::new("nacos", ResourceType::Nacos, "127.0.0.1:8848"),
            Service::new("prod", "orders"),
        )
    }

    fn event() -> WatchEvent {
        WatchEvent {
            service: Service::new("prod", "orders"),
            instances: Vec::new(),
        }
    }

    fn as_listener(counting: &Arc<Counting>) -> Arc<dyn WatchListener> {
        Arc::clone(counting) as Arc<dyn WatchListener>
    }

    fn idle() -> Arc<dyn WatchListener> {
        Arc::new(Counting::default())
    }

    #[tokio::test]
    async fn test_second_join_shares_backend_watch() {
        let hub = RegistryHub::default();
        let backend: Arc<SyncMutex<Vec<Fanout<dyn WatchListener>>>> = Arc::default();
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());

        let sink = Arc::clone(&backend);
        let joined = hub
            .join(key(), 1, as_listener(&first), |fanout| async move {
                sink.lock().push(fanout);
                true
            })
            .await;
        assert!(joined);
        // The key is already watched, so this callback is never run.
        let joined = hub
            .join(key(), 2, as_listener(&second), |_| async { false })
            .await;
        assert!(joined);
        assert_eq!(backend.lock().len(), 1);
        assert_eq!(hub.listeners(&key()).await, 2);

        backend.lock()[0].on_event(event());
        assert_eq!(*first.seen.lock(), 1);
        assert_eq!(*second.seen.lock(), 1);
    }

    #[tokio::test]
    async fn test_unwatch_only_when_last_leaves() {
        let hub = RegistryHub::default();
        let unwatched = Arc::new(SyncMutex::new(0));
        hub.join(key(), 1, idle(), |_| async { true }).await;
        hub.join(key(), 2, idle(), |_| async { true }).await;

        let count = Arc::clone(&unwatched);
        hub.leave(&key(), 1, || async move { *count.lock() += 1 }).await;
        assert_eq!(*unwatched.lock(), 0);
        assert_eq!(hub.listeners(&key()).await, 1);

        let count = Arc::clone(&unwatched);
        hub.leave(&key(), 2, || async move { *count.lock() += 1 }).await;
        assert_eq!(*unwatched.lock(), 1);
        assert_eq!(hub.listeners(&key()).await, 0);
    }

    #[tokio::test]
    async fn test_failed_watch_keeps_nothing() {
        let hub = RegistryHub::default();
        let joined = hub.join(key(), 1, idle(), |_| async { false }).await;
        assert!(!joined);
        assert_eq!(hub.listeners(&key()).await, 0);
    }
}
