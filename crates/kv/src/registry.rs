//! Registry of open key-value handles.

use crate::error::{KvError, KvResult};
use crate::handle::{Context, HandleCache, KvHandle};
use crate::locks::NameLocks;
use crate::traits::StorageEngine;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::instrument;

/// Owns the storage engine and hands out one shared handle per database name.
///
/// Opens and destroys of the same name are serialized, so concurrent callers
/// of [`open`](Self::open) share a single physical open.
pub struct KvRegistry {
    ctx: Arc<Context>,
    handles: Arc<HandleCache>,
}

impl KvRegistry {
    /// Create a registry opening databases at schema `version`.
    pub fn new(engine: Arc<dyn StorageEngine>, version: u32) -> Self {
        Self {
            ctx: Arc::new(Context {
                engine,
                version,
                locks: NameLocks::new(),
            }),
            handles: Arc::new(DashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.ctx.engine
    }

    /// Schema version requested on open.
    pub fn version(&self) -> u32 {
        self.ctx.version
    }

    /// Open the database `name`, reusing the cached handle when there is one.
    ///
    /// A handle is cached only after its first successful open.
    #[instrument(skip(self), fields(engine = self.ctx.engine.engine_name()))]
    pub async fn open(&self, name: &str) -> KvResult<Arc<KvHandle>> {
        if name.is_empty() {
            return Err(KvError::InvalidName("database name is empty".to_string()));
        }

        let _guard = self.ctx.locks.acquire(name).await;

        let cached = self.handles.get(name).map(|entry| entry.value().clone());
        if let Some(handle) = cached {
            if !handle.is_destroyed() {
                open_with_retry(&handle).await?;
                return Ok(handle);
            }
            handle.wait_destroyed().await;
            self.handles
                .remove_if(name, |_, current| Arc::ptr_eq(current, &handle));
            tracing::debug!(db = name, "replacing destroyed handle");
        }

        let handle = Arc::new(KvHandle::new(
            name,
            self.ctx.clone(),
            Arc::downgrade(&self.handles),
        ));
        open_with_retry(&handle).await?;
        self.handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// The cached handle for `name`, without opening anything.
    pub fn cached(&self, name: &str) -> Option<Arc<KvHandle>> {
        self.handles.get(name).map(|entry| entry.value().clone())
    }

    /// Names with a cached handle, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Close every cached handle. Handles stay cached and reopen on use.
    pub fn close_all(&self) {
        let handles: Vec<Arc<KvHandle>> =
            self.handles.iter().map(|e| e.value().clone()).collect();
        for handle in &handles {
            handle.close();
        }
        tracing::debug!(count = handles.len(), "closed all handles");
    }
}

/// Open `handle`, once more if the fresh connection was closed before it
/// became ready. Caller holds the name lock.
async fn open_with_retry(handle: &KvHandle) -> KvResult<()> {
    match handle.open_locked().await {
        Err(e) if e.needs_reopen() => {
            tracing::debug!(db = handle.name(), error = %e, "open interrupted, retrying");
            handle.open_locked().await.map(drop)
        }
        other => other.map(drop),
    }
}
