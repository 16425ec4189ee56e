//! Namespaced key-value handle.

use crate::error::{KvError, KvResult};
use crate::locks::NameLocks;
use crate::state::{HandleStatus, Lifecycle, LifecycleObserver};
use crate::traits::{Connection, ConnectionObserver, KeyRange, StorageEngine};
use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::{Arc, Weak};

pub(crate) type HandleCache = DashMap<String, Arc<KvHandle>>;

/// State shared by a registry and every handle it created.
pub(crate) struct Context {
    pub(crate) engine: Arc<dyn StorageEngine>,
    pub(crate) version: u32,
    pub(crate) locks: NameLocks,
}

/// Handle to one named key-value database.
///
/// Obtained from [`KvRegistry::open`](crate::KvRegistry::open). Values are
/// stored as JSON. A closed handle reopens on its next operation; a destroyed
/// handle fails every operation with [`KvError::DatabaseDestroyed`].
pub struct KvHandle {
    name: String,
    ctx: Arc<Context>,
    lifecycle: Arc<Lifecycle>,
    cache: Weak<HandleCache>,
}

impl std::fmt::Debug for KvHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvHandle")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

impl KvHandle {
    pub(crate) fn new(name: &str, ctx: Arc<Context>, cache: Weak<HandleCache>) -> Self {
        Self {
            name: name.to_string(),
            ctx,
            lifecycle: Arc::new(Lifecycle::new(name)),
            cache,
        }
    }

    /// Name of the database.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> HandleStatus {
        self.lifecycle.status()
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(
            self.status(),
            HandleStatus::Destroying | HandleStatus::Destroyed
        )
    }

    /// Read and decode the value at `key`. Absent keys resolve to `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> KvResult<Option<T>> {
        let raw = self
            .with_connection(|conn| async move { conn.get(key).await })
            .await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store `value` at `key`, replacing any previous value. Returns the key.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> KvResult<String> {
        let encoded = Bytes::from(serde_json::to_vec(value)?);
        self.with_connection(|conn| {
            let encoded = encoded.clone();
            async move { conn.put(key, encoded).await }
        })
        .await?;
        Ok(key.to_string())
    }

    pub async fn del(&self, key: &str) -> KvResult<()> {
        self.with_connection(|conn| async move { conn.delete(key).await })
            .await
    }

    /// Remove every key of the database.
    pub async fn clear(&self) -> KvResult<()> {
        self.with_connection(|conn| async move { conn.clear().await })
            .await
    }

    /// Keys within `range` in ascending order.
    pub async fn keys(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<String>> {
        self.with_connection(|conn| async move { conn.keys(range, limit).await })
            .await
    }

    /// Keys starting with `prefix`, with the prefix stripped.
    pub async fn keys_with_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
    ) -> KvResult<Vec<String>> {
        let keys = self.keys(&KeyRange::prefix(prefix), limit).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
            .collect())
    }

    /// Release the connection. The handle stays usable and reopens lazily.
    pub fn close(&self) {
        if let Some(conn) = self.lifecycle.close() {
            conn.close();
            tracing::debug!(db = %self.name, "handle closed");
        }
    }

    /// Close the handle and physically delete the database.
    ///
    /// The handle is destroyed for good, even if the deletion fails, and is
    /// removed from its registry.
    pub async fn destroy(&self) -> KvResult<()> {
        let _guard = self.ctx.locks.acquire(&self.name).await;
        if let Some(conn) = self.lifecycle.begin_destroy()? {
            conn.close();
        }

        let result = self.delete_database().await;
        self.lifecycle.finish_destroy();
        if let Some(cache) = self.cache.upgrade() {
            cache.remove_if(&self.name, |_, cached| std::ptr::eq(cached.as_ref(), self));
        }

        match &result {
            Ok(()) => tracing::info!(
                db = %self.name,
                engine = self.ctx.engine.engine_name(),
                "database destroyed"
            ),
            Err(e) => tracing::warn!(
                db = %self.name,
                error = %e,
                "database deletion failed, handle destroyed anyway"
            ),
        }
        result
    }

    /// Resolve once [`destroy`](Self::destroy) has completed.
    pub async fn wait_destroyed(&self) {
        self.lifecycle.wait_destroyed().await;
    }

    /// Open the database unless it is already open. Caller holds the name lock.
    pub(crate) async fn open_locked(&self) -> KvResult<Arc<dyn Connection>> {
        if let Some(conn) = self.lifecycle.ready()? {
            return Ok(conn);
        }
        self.lifecycle.begin_open()?;
        match self.open_database().await {
            Ok(conn) => {
                self.lifecycle.opened(conn.clone())?;
                tracing::debug!(
                    db = %self.name,
                    engine = self.ctx.engine.engine_name(),
                    version = self.ctx.version,
                    "database opened"
                );
                Ok(conn)
            }
            Err(e) => {
                self.lifecycle.open_failed();
                Err(e)
            }
        }
    }

    async fn open_database(&self) -> KvResult<Arc<dyn Connection>> {
        let observer: Arc<dyn ConnectionObserver> =
            Arc::new(LifecycleObserver::new(&self.lifecycle));
        let engine = &self.ctx.engine;
        match engine.open(&self.name, self.ctx.version, observer.clone()).await {
            Err(KvError::Blocked { connections, .. }) => {
                tracing::debug!(
                    db = %self.name,
                    connections,
                    "open blocked, waiting for a connection to be released"
                );
                engine.wait_for_release(&self.name).await;
                engine.open(&self.name, self.ctx.version, observer).await
            }
            other => other,
        }
    }

    async fn delete_database(&self) -> KvResult<()> {
        let engine = &self.ctx.engine;
        match engine.delete_database(&self.name).await {
            Err(KvError::Blocked { connections, .. }) => {
                tracing::debug!(
                    db = %self.name,
                    connections,
                    "delete blocked, waiting for a connection to be released"
                );
                engine.wait_for_release(&self.name).await;
                engine.delete_database(&self.name).await
            }
            other => other,
        }
    }

    async fn connection(&self) -> KvResult<Arc<dyn Connection>> {
        if let Some(conn) = self.lifecycle.ready()? {
            return Ok(conn);
        }
        let _guard = self.ctx.locks.acquire(&self.name).await;
        self.open_locked().await
    }

    async fn attempt<T, F, Fut>(&self, op: &F) -> KvResult<T>
    where
        F: Fn(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = KvResult<T>>,
    {
        let conn = self.connection().await?;
        let result = op(conn.clone()).await;
        if let Err(e) = &result
            && e.needs_reopen()
        {
            self.lifecycle.discard(&conn);
        }
        result
    }

    /// Run `op` on the live connection, reopening once if the connection was
    /// closed or terminated underneath it.
    async fn with_connection<T, F, Fut>(&self, op: F) -> KvResult<T>
    where
        F: Fn(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = KvResult<T>>,
    {
        match self.attempt(&op).await {
            Err(e) if e.needs_reopen() => {
                tracing::debug!(db = %self.name, error = %e, "reopening connection");
                self.attempt(&op).await
            }
            other => other,
        }
    }
}
