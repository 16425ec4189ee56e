//! Namespaced key-value store for Vellum.
//!
//! This crate provides:
//! - A storage engine abstraction over named single-table databases
//! - Engines: in-memory and SQLite
//! - [`KvHandle`], a lifecycle-managed handle storing JSON values
//! - [`KvRegistry`], which serializes opens and destroys per name

pub mod backends;
pub mod error;
mod handle;
mod locks;
mod registry;
mod state;
pub mod tracker;
pub mod traits;

pub use backends::{MemoryEngine, SqliteEngine};
pub use error::{KvError, KvResult};
pub use handle::KvHandle;
pub use registry::KvRegistry;
pub use state::HandleStatus;
pub use traits::{
    Connection, ConnectionEvent, ConnectionObserver, HIGH_SENTINEL, IgnoreEvents, KeyRange,
    StorageEngine,
};

use std::sync::Arc;
use vellum_core::config::{EngineConfig, KvConfig};

/// Create a registry from configuration.
pub async fn from_config(config: &KvConfig) -> KvResult<KvRegistry> {
    config.validate().map_err(KvError::Config)?;

    let engine: Arc<dyn StorageEngine> = match &config.engine {
        EngineConfig::Memory => Arc::new(MemoryEngine::new()),
        EngineConfig::Sqlite { path } => Arc::new(SqliteEngine::new(path).await?),
    };
    tracing::debug!(
        engine = engine.engine_name(),
        version = config.schema_version,
        "key-value registry created"
    );
    Ok(KvRegistry::new(engine, config.schema_version))
}
