//! Engine wrappers for failure injection.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vellum_kv::{
    Connection, ConnectionEvent, ConnectionObserver, KvError, KvResult, MemoryEngine,
    StorageEngine,
};

/// Memory engine whose first `failures` opens fail with `OpenFailure`.
#[allow(dead_code)]
pub struct FlakyEngine {
    inner: MemoryEngine,
    failures: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyEngine {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryEngine::new(),
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn open_calls(&self) -> usize {
        self.inner.open_calls()
    }
}

#[async_trait]
impl StorageEngine for FlakyEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(KvError::OpenFailure {
                name: name.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.open(name, version, observer).await
    }

    async fn delete_database(&self, name: &str) -> KvResult<()> {
        self.inner.delete_database(name).await
    }

    async fn wait_for_release(&self, name: &str) {
        self.inner.wait_for_release(name).await
    }

    fn engine_name(&self) -> &'static str {
        "flaky"
    }
}

/// Memory engine that yields for `delay` before every open, so concurrent
/// openers overlap inside the engine.
#[allow(dead_code)]
pub struct SlowEngine {
    inner: MemoryEngine,
    delay: Duration,
}

#[allow(dead_code)]
impl SlowEngine {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryEngine::new(),
            delay,
        }
    }

    pub fn open_calls(&self) -> usize {
        self.inner.open_calls()
    }
}

#[async_trait]
impl StorageEngine for SlowEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>> {
        tokio::time::sleep(self.delay).await;
        self.inner.open(name, version, observer).await
    }

    async fn delete_database(&self, name: &str) -> KvResult<()> {
        self.inner.delete_database(name).await
    }

    async fn wait_for_release(&self, name: &str) {
        self.inner.wait_for_release(name).await
    }

    fn engine_name(&self) -> &'static str {
        "slow"
    }
}

/// Memory engine whose first `races` opens see a version change requested
/// by another connection before they return.
#[allow(dead_code)]
pub struct RacingEngine {
    inner: MemoryEngine,
    races: AtomicUsize,
}

#[allow(dead_code)]
impl RacingEngine {
    pub fn new(races: usize) -> Self {
        Self {
            inner: MemoryEngine::new(),
            races: AtomicUsize::new(races),
        }
    }

    pub fn open_calls(&self) -> usize {
        self.inner.open_calls()
    }
}

#[async_trait]
impl StorageEngine for RacingEngine {
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>> {
        let conn = self.inner.open(name, version, observer.clone()).await?;
        let racing = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            observer.on_event(name, ConnectionEvent::VersionChange);
        }
        Ok(conn)
    }

    async fn delete_database(&self, name: &str) -> KvResult<()> {
        self.inner.delete_database(name).await
    }

    async fn wait_for_release(&self, name: &str) {
        self.inner.wait_for_release(name).await
    }

    fn engine_name(&self) -> &'static str {
        "racing"
    }
}
