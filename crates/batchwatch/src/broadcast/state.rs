//! Fan-out of batch state snapshots to observers.
//!
//! Observers receive value copies. Listeners are called outside of every
//! lock, so a listener may call back into the coordinator.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tokio::sync::watch;

use crate::batch::{BatchJob, FileMetadata};

/// Immutable view of the coordinator state handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub batch_id: Option<String>,
    pub jobs: Vec<BatchJob>,
    pub files: Vec<FileMetadata>,
    pub overall_progress: u8,
    pub is_connected: bool,
    pub is_complete: bool,
    pub has_error: bool,
}

impl BatchSnapshot {
    pub fn job(&self, file_name: &str) -> Option<&BatchJob> {
        self.jobs.iter().find(|j| j.file_name == file_name)
    }
}

type Listener = Arc<dyn Fn(&BatchSnapshot) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    last_version: u64,
    listeners: Vec<(u64, Listener)>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    match registry.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Listener registry lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Handle returned by [`StateBroadcaster::subscribe`].
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Removes the listener. Later state changes are not delivered.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Delivers every published snapshot to callback listeners and to a
/// `watch` channel.
pub struct StateBroadcaster {
    registry: Arc<Mutex<Registry>>,
    latest: watch::Sender<BatchSnapshot>,
}

impl StateBroadcaster {
    pub fn new(initial: BatchSnapshot) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            latest,
        }
    }

    /// Registers `listener` and calls it at once with the latest snapshot.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BatchSnapshot) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let id = {
            let mut registry = lock(&self.registry);
            registry.next_id += 1;
            let id = registry.next_id;
            registry.listeners.push((id, Arc::clone(&listener)));
            id
        };

        let current = self.latest.borrow().clone();
        listener(&current);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Async view of the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<BatchSnapshot> {
        self.latest.subscribe()
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> BatchSnapshot {
        self.latest.borrow().clone()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    /// Publishes a snapshot to every observer.
    ///
    /// `version` increases with every state change. A snapshot older than
    /// one already published is dropped.
    pub fn publish(&self, version: u64, snapshot: BatchSnapshot) {
        let listeners: Vec<Listener> = {
            let mut registry = lock(&self.registry);
            if version <= registry.last_version {
                log::trace!("Dropping stale snapshot version {}", version);
                return;
            }
            registry.last_version = version;
            self.latest.send_replace(snapshot.clone());
            registry
                .listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new(BatchSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(progress: u8) -> BatchSnapshot {
        BatchSnapshot {
            batch_id: Some("b-1".to_string()),
            overall_progress: progress,
            ..Default::default()
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<u8>>>, impl Fn(&BatchSnapshot) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |s: &BatchSnapshot| {
            sink.lock().unwrap().push(s.overall_progress)
        })
    }

    #[test]
    fn test_subscribe_delivers_current_state() {
        let broadcaster = StateBroadcaster::new(snapshot(42));
        let (seen, listener) = recorder();
        let _sub = broadcaster.subscribe(listener);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn test_every_listener_gets_every_snapshot() {
        let broadcaster = StateBroadcaster::default();
        let (seen_a, a) = recorder();
        let (seen_b, b) = recorder();
        let _sa = broadcaster.subscribe(a);
        let _sb = broadcaster.subscribe(b);

        broadcaster.publish(1, snapshot(10));
        broadcaster.publish(2, snapshot(20));

        assert_eq!(*seen_a.lock().unwrap(), vec![0, 10, 20]);
        assert_eq!(*seen_b.lock().unwrap(), vec![0, 10, 20]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = StateBroadcaster::default();
        let (seen, listener) = recorder();
        let sub = broadcaster.subscribe(listener);
        assert_eq!(broadcaster.listener_count(), 1);

        sub.unsubscribe();
        broadcaster.publish(1, snapshot(50));

        assert_eq!(broadcaster.listener_count(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![0]);
    }

    #[test]
    fn test_listener_may_reenter() {
        let broadcaster = Arc::new(StateBroadcaster::default());
        let inner = Arc::clone(&broadcaster);
        let _sub = broadcaster.subscribe(move |_| {
            let _ = inner.listener_count();
            let _ = inner.latest();
        });
        broadcaster.publish(1, snapshot(1));
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let broadcaster = StateBroadcaster::default();
        let (seen, listener) = recorder();
        let _sub = broadcaster.subscribe(listener);

        broadcaster.publish(3, snapshot(30));
        broadcaster.publish(2, snapshot(20));

        assert_eq!(*seen.lock().unwrap(), vec![0, 30]);
        assert_eq!(broadcaster.latest().overall_progress, 30);
    }

    #[tokio::test]
    async fn test_watch_sees_latest() {
        let broadcaster = StateBroadcaster::default();
        let mut rx = broadcaster.watch();
        broadcaster.publish(1, snapshot(77));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().overall_progress, 77);
    }
}
