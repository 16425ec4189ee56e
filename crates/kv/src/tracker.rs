//! Live connection bookkeeping shared by the engines.
//!
//! Engines register every connection they hand out together with the version it
//! was opened at and the observer of its owner. Upgrades and deletions use the
//! tracker to notify the connections standing in their way and to wait until
//! those connections are released.

use crate::error::{KvError, KvResult};
use crate::traits::{ConnectionEvent, ConnectionObserver};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

struct TrackedConnection {
    id: u64,
    version: u32,
    observer: Arc<dyn ConnectionObserver>,
    /// Close requested, release pending.
    closing: bool,
}

impl TrackedConnection {
    /// Whether this connection stands in the way of an operation that needs
    /// every connection below `below` (or every connection, if None) gone.
    fn blocks(&self, below: Option<u32>) -> bool {
        below.is_none_or(|version| self.version < version)
    }
}

/// Tracks live connections per database name.
pub struct ConnectionTracker {
    entries: Mutex<HashMap<String, Vec<TrackedConnection>>>,
    next_id: AtomicU64,
    released: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            released: Notify::new(),
        }
    }

    /// Register a new connection and return its id.
    pub fn register(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(TrackedConnection {
                id,
                version,
                observer,
                closing: false,
            });
        id
    }

    /// Record that a connection is shutting down but not yet released.
    pub fn mark_closing(&self, name: &str, id: u64) {
        if let Some(conns) = self.entries.lock().get_mut(name)
            && let Some(conn) = conns.iter_mut().find(|c| c.id == id)
        {
            conn.closing = true;
        }
    }

    /// Forget a connection and wake release waiters.
    pub fn release(&self, name: &str, id: u64) {
        {
            let mut entries = self.entries.lock();
            if let Some(conns) = entries.get_mut(name) {
                conns.retain(|c| c.id != id);
                if conns.is_empty() {
                    entries.remove(name);
                }
            }
        }
        self.released.notify_waiters();
    }

    /// Number of tracked connections on `name`, closing ones included.
    pub fn live_count(&self, name: &str) -> usize {
        self.entries.lock().get(name).map_or(0, Vec::len)
    }

    fn ids(&self, name: &str) -> HashSet<u64> {
        self.entries
            .lock()
            .get(name)
            .map(|conns| conns.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    fn count_blocking(&self, name: &str, below: Option<u32>, include_closing: bool) -> usize {
        self.entries.lock().get(name).map_or(0, |conns| {
            conns
                .iter()
                .filter(|c| c.blocks(below) && (include_closing || !c.closing))
                .count()
        })
    }

    /// Ask the connections in the way to close.
    ///
    /// Every open connection below `below` (all of them if None) receives
    /// [`ConnectionEvent::VersionChange`]. Fails with `Blocked` if some of them
    /// are still open afterwards. Connections that are merely closing do not
    /// block; use [`wait_until_idle`](Self::wait_until_idle) for them.
    pub fn request_exclusive(&self, name: &str, below: Option<u32>) -> KvResult<()> {
        let observers: Vec<Arc<dyn ConnectionObserver>> = self
            .entries
            .lock()
            .get(name)
            .map(|conns| {
                conns
                    .iter()
                    .filter(|c| c.blocks(below) && !c.closing)
                    .map(|c| c.observer.clone())
                    .collect()
            })
            .unwrap_or_default();

        // Observers may close their connection, which re-enters the tracker.
        for observer in observers {
            observer.on_event(name, ConnectionEvent::VersionChange);
        }

        let remaining = self.count_blocking(name, below, false);
        if remaining > 0 {
            return Err(KvError::Blocked {
                name: name.to_string(),
                connections: remaining,
            });
        }
        Ok(())
    }

    /// Drop every connection on `name` and tell their owners.
    pub fn terminate_all(&self, name: &str) {
        let removed = self.entries.lock().remove(name).unwrap_or_default();
        for conn in removed {
            conn.observer.on_event(name, ConnectionEvent::Terminated);
        }
        self.released.notify_waiters();
    }

    /// Wait until no connection below `below` (any, if None) is tracked on
    /// `name`, closing ones included.
    pub async fn wait_until_idle(&self, name: &str, below: Option<u32>) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count_blocking(name, below, true) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait until one of the connections live on `name` right now is released.
    pub async fn wait_for_release(&self, name: &str) {
        let before = self.ids(name);
        if before.is_empty() {
            return;
        }
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let now = self.ids(name);
            if before.iter().any(|id| !now.contains(id)) {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}
