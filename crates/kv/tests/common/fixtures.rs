//! Registry fixtures shared by the integration tests.

use std::sync::Arc;
use tempfile::TempDir;
use vellum_kv::{KvRegistry, MemoryEngine, SqliteEngine};

/// Registry over a fresh in-memory engine. The engine is returned for
/// inspection and fault injection.
#[allow(dead_code)]
pub fn memory_registry() -> (Arc<MemoryEngine>, KvRegistry) {
    let engine = Arc::new(MemoryEngine::new());
    let registry = KvRegistry::new(engine.clone(), 1);
    (engine, registry)
}

/// Registry over a SQLite engine rooted in a fresh temporary directory.
/// Keep the directory alive for the duration of the test.
#[allow(dead_code)]
pub async fn sqlite_registry() -> (TempDir, KvRegistry) {
    let temp = tempfile::tempdir().unwrap();
    let engine = SqliteEngine::new(temp.path().join("kv")).await.unwrap();
    (temp, KvRegistry::new(Arc::new(engine), 1))
}
