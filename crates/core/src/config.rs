//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key-value store configuration.
    #[serde(default)]
    pub kv: KvConfig,
    /// Chunk garbage collector configuration.
    #[serde(default)]
    pub gc: GcConfig,
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.kv.validate()?;
        self.gc.validate()?;
        Ok(())
    }
}

/// Key-value store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KvConfig {
    /// Storage engine backing the store.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Schema version requested when opening databases.
    /// Raising it upgrades existing databases and blocks older connections.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

/// Storage engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineConfig {
    /// In-process engine, nothing survives a restart.
    Memory,
    /// SQLite engine, one database file per namespace.
    Sqlite {
        /// Directory holding the database files.
        path: PathBuf,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/kv"),
        }
    }
}

fn default_schema_version() -> u32 {
    1
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            schema_version: default_schema_version(),
        }
    }
}

impl KvConfig {
    /// In-memory configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            engine: EngineConfig::Memory,
            schema_version: default_schema_version(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version == 0 {
            return Err("kv.schema_version must be at least 1".to_string());
        }
        if let EngineConfig::Sqlite { path } = &self.engine
            && path.as_os_str().is_empty()
        {
            return Err("kv.engine.path must not be empty".to_string());
        }
        Ok(())
    }
}

/// Chunk garbage collector configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GcConfig {
    /// Chunks are identified by a fixed content hash.
    /// Collection is refused otherwise, since ids would not survive resurrection.
    #[serde(default = "default_fixed_chunk_ids")]
    pub fixed_chunk_ids: bool,
    /// Chunks are streamed from the remote instead of being replicated locally.
    /// Collection is refused when set, since the local chunk set is incomplete.
    #[serde(default)]
    pub read_chunks_online: bool,
    /// Keep chunks referenced by logically deleted, uncommitted file entries
    /// when removing unused chunks.
    #[serde(default = "default_remove_respects_pending_deletions")]
    pub remove_respects_pending_deletions: bool,
    /// Maximum concurrent chunk lookups during reference verification.
    #[serde(default = "default_verify_concurrency")]
    pub verify_concurrency: usize,
}

fn default_fixed_chunk_ids() -> bool {
    true
}

fn default_remove_respects_pending_deletions() -> bool {
    true
}

fn default_verify_concurrency() -> usize {
    10
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            fixed_chunk_ids: default_fixed_chunk_ids(),
            read_chunks_online: false,
            remove_respects_pending_deletions: default_remove_respects_pending_deletions(),
            verify_concurrency: default_verify_concurrency(),
        }
    }
}

impl GcConfig {
    /// Why collection is not possible under this configuration, if it is not.
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        if !self.fixed_chunk_ids {
            return Some(
                "chunk maintenance requires fixed content-hash chunk ids; enable fixed chunk ids first",
            );
        }
        if self.read_chunks_online {
            return Some(
                "chunk maintenance requires the full chunk set locally; disable reading chunks online first",
            );
        }
        None
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.verify_concurrency == 0 {
            return Err("gc.verify_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}
