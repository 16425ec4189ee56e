//! In-process storage engine.

use crate::error::{KvError, KvResult};
use crate::tracker::ConnectionTracker;
use crate::traits::{Connection, ConnectionObserver, KeyRange, StorageEngine};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tracing::instrument;

struct MemoryDatabase {
    version: AtomicU32,
    entries: RwLock<BTreeMap<String, Bytes>>,
    /// Set when the database was evicted or deleted underneath its connections.
    gone: AtomicBool,
}

impl MemoryDatabase {
    fn new(version: u32) -> Self {
        Self {
            version: AtomicU32::new(version),
            entries: RwLock::new(BTreeMap::new()),
            gone: AtomicBool::new(false),
        }
    }
}

/// Storage engine keeping every database in memory.
///
/// Nothing survives the process. Used by tests and ephemeral deployments; it
/// also lets tests simulate storage eviction through [`MemoryEngine::terminate`].
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
    tracker: Arc<ConnectionTracker>,
    open_calls: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            tracker: Arc::new(ConnectionTracker::new()),
            open_calls: AtomicUsize::new(0),
        }
    }

    /// Number of physical opens performed so far.
    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Number of connections currently tracked on `name`.
    pub fn live_connections(&self, name: &str) -> usize {
        self.tracker.live_count(name)
    }

    /// Whether the database `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.databases.lock().contains_key(name)
    }

    /// Drop the database `name` as if the storage had been evicted.
    ///
    /// The content is lost and every live connection is terminated.
    pub fn terminate(&self, name: &str) {
        if let Some(db) = self.databases.lock().remove(name) {
            db.gone.store(true, Ordering::SeqCst);
        }
        tracing::debug!(db = name, "memory database terminated");
        self.tracker.terminate_all(name);
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    #[instrument(skip(self, observer), fields(engine = "memory"))]
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if name.is_empty() {
            return Err(KvError::InvalidName("database name is empty".to_string()));
        }

        let stored = self
            .databases
            .lock()
            .get(name)
            .map(|db| db.version.load(Ordering::SeqCst));

        match stored {
            Some(stored) if stored > version => {
                return Err(KvError::OpenFailure {
                    name: name.to_string(),
                    reason: format!(
                        "requested version {version} is older than stored version {stored}"
                    ),
                });
            }
            Some(stored) if stored < version => {
                self.tracker.request_exclusive(name, Some(version))?;
                self.tracker.wait_until_idle(name, Some(version)).await;
                tracing::debug!(db = name, from = stored, to = version, "upgrading database");
            }
            _ => {}
        }

        let db = self
            .databases
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(version)))
            .clone();
        db.version.store(version, Ordering::SeqCst);

        let id = self.tracker.register(name, version, observer);
        Ok(Arc::new(MemoryConnection {
            name: name.to_string(),
            id,
            db,
            tracker: self.tracker.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    #[instrument(skip(self), fields(engine = "memory"))]
    async fn delete_database(&self, name: &str) -> KvResult<()> {
        self.tracker.request_exclusive(name, None)?;
        self.tracker.wait_until_idle(name, None).await;
        if let Some(db) = self.databases.lock().remove(name) {
            db.gone.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn wait_for_release(&self, name: &str) {
        self.tracker.wait_for_release(name).await;
    }

    fn engine_name(&self) -> &'static str {
        "memory"
    }
}

/// Connection to a [`MemoryEngine`] database.
pub struct MemoryConnection {
    name: String,
    id: u64,
    db: Arc<MemoryDatabase>,
    tracker: Arc<ConnectionTracker>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn check(&self) -> KvResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KvError::ConnectionClosed(self.name.clone()));
        }
        if self.db.gone.load(Ordering::SeqCst) {
            return Err(KvError::Terminated(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        self.check()?;
        Ok(self.db.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        self.check()?;
        self.db.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.check()?;
        self.db.entries.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> KvResult<()> {
        self.check()?;
        self.db.entries.write().clear();
        Ok(())
    }

    async fn keys(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<String>> {
        self.check()?;
        let entries = self.db.entries.read();
        let keys = entries
            .keys()
            .skip_while(|key| range.start.as_deref().is_some_and(|start| key.as_str() < start))
            .take_while(|key| range.end.as_deref().is_none_or(|end| key.as_str() <= end))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(keys)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.tracker.release(&self.name, self.id);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::IgnoreEvents;

    async fn open(engine: &MemoryEngine, name: &str) -> Arc<dyn Connection> {
        engine.open(name, 1, Arc::new(IgnoreEvents)).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, "db").await;

        conn.put("k", Bytes::from_static(b"v")).await.unwrap();
        assert_eq!(conn.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        conn.delete("k").await.unwrap();
        conn.delete("k").await.unwrap();
        assert_eq!(conn.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_respect_range_and_limit() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, "db").await;
        for key in ["a-1", "a-2", "a-3", "b-1"] {
            conn.put(key, Bytes::new()).await.unwrap();
        }

        let keys = conn.keys(&KeyRange::prefix("a-"), Some(2)).await.unwrap();
        assert_eq!(keys, vec!["a-1", "a-2"]);
        let keys = conn.keys(&KeyRange::between("a-2", "b-1"), None).await.unwrap();
        assert_eq!(keys, vec!["a-2", "a-3", "b-1"]);
    }

    #[tokio::test]
    async fn test_downgrade_is_refused() {
        let engine = MemoryEngine::new();
        drop(engine.open("db", 2, Arc::new(IgnoreEvents)).await.unwrap());
        let err = engine
            .open("db", 1, Arc::new(IgnoreEvents))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, KvError::OpenFailure { .. }));
    }

    #[tokio::test]
    async fn test_terminate_fails_live_connections() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, "db").await;
        conn.put("k", Bytes::new()).await.unwrap();

        engine.terminate("db");

        let err = conn.get("k").await.unwrap_err();
        assert!(matches!(err, KvError::Terminated(_)));
        assert_eq!(engine.live_connections("db"), 0);
        assert!(!engine.contains("db"));
    }

    #[tokio::test]
    async fn test_delete_blocked_by_ignoring_connection() {
        let engine = MemoryEngine::new();
        let conn = open(&engine, "db").await;

        let err = engine.delete_database("db").await.unwrap_err();
        assert!(matches!(err, KvError::Blocked { connections: 1, .. }));

        conn.close();
        engine.delete_database("db").await.unwrap();
        assert!(!engine.contains("db"));
    }
}
