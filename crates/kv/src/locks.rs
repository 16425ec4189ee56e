//! Per-name async locks.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One FIFO mutex per database name.
///
/// Opens and destroys of the same name are serialized through it, so a
/// destroy queued behind an open runs after the open settled and vice versa.
#[derive(Default)]
pub(crate) struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        // Clone the mutex out so the map shard is not held across the await.
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
