//! Storage engine trait definitions.

use crate::error::KvResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Upper bound appended to a prefix to cover every key starting with it.
pub const HIGH_SENTINEL: char = '\u{10FFFF}';

/// Inclusive bounds over lexicographically ordered keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Lowest key included, unbounded if None.
    pub start: Option<String>,
    /// Highest key included, unbounded if None.
    pub end: Option<String>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keys between `start` and `end`, both included.
    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// Keys starting with `prefix`.
    pub fn prefix(prefix: &str) -> Self {
        Self::between(prefix, format!("{prefix}{HIGH_SENTINEL}"))
    }

    /// Whether `key` lies within the range.
    pub fn contains(&self, key: &str) -> bool {
        self.start.as_deref().is_none_or(|start| key >= start)
            && self.end.as_deref().is_none_or(|end| key <= end)
    }
}

/// Events an engine delivers to the owner of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Another connection wants to upgrade or delete the database.
    /// The receiver should close its connection.
    VersionChange,
    /// The engine dropped the connection (storage evicted, backend crashed).
    Terminated,
}

/// Receives connection events.
///
/// Called synchronously by the engine, outside of its internal locks. An
/// implementation may close the connection from within the callback.
pub trait ConnectionObserver: Send + Sync {
    fn on_event(&self, name: &str, event: ConnectionEvent);
}

/// Observer that ignores every event.
pub struct IgnoreEvents;

impl ConnectionObserver for IgnoreEvents {
    fn on_event(&self, _name: &str, _event: ConnectionEvent) {}
}

/// An embedded storage engine holding named single-table databases.
#[async_trait]
pub trait StorageEngine: Send + Sync + 'static {
    /// Open (creating if missing) the database `name` at `version`.
    ///
    /// # Errors
    ///
    /// - [`KvError::OpenFailure`](crate::KvError::OpenFailure) if the database
    ///   exists at a newer version or cannot be created.
    /// - [`KvError::Blocked`](crate::KvError::Blocked) if an upgrade is needed and
    ///   connections at an older version stay open after being notified.
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>>;

    /// Physically erase the database `name`.
    ///
    /// Live connections are notified with [`ConnectionEvent::VersionChange`];
    /// fails with `Blocked` if any of them stays open.
    async fn delete_database(&self, name: &str) -> KvResult<()>;

    /// Resolve once a connection that is live on `name` right now has been
    /// released. Resolves immediately if there is none.
    async fn wait_for_release(&self, name: &str);

    /// Static identifier of the engine, for logs.
    fn engine_name(&self) -> &'static str;
}

/// A live connection to one database.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the database.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> KvResult<Option<Bytes>>;

    /// Upsert a value. Durable once the call returns.
    async fn put(&self, key: &str, value: Bytes) -> KvResult<()>;

    /// Remove a key. Absent keys are not an error.
    async fn delete(&self, key: &str) -> KvResult<()>;

    async fn clear(&self) -> KvResult<()>;

    /// Keys within `range` in ascending order, at most `limit` of them.
    async fn keys(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<String>>;

    /// Release the connection. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
