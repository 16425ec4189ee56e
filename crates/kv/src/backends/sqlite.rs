//! SQLite storage engine.
//!
//! Every database lives in its own file under the engine root and contains one
//! table named after the database. The schema version is kept in
//! `PRAGMA user_version`.

use crate::error::{KvError, KvResult};
use crate::tracker::ConnectionTracker;
use crate::traits::{Connection, ConnectionObserver, KeyRange, StorageEngine};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::instrument;

/// Files SQLite may create next to a database in WAL mode.
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Storage engine backed by one SQLite file per database.
pub struct SqliteEngine {
    root: PathBuf,
    tracker: Arc<ConnectionTracker>,
}

impl SqliteEngine {
    /// Create an engine storing its databases under `root`.
    pub async fn new(root: impl AsRef<Path>) -> KvResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            tracker: Arc::new(ConnectionTracker::new()),
        })
    }

    /// Path of the file holding the database `name`.
    pub fn database_path(&self, name: &str) -> PathBuf {
        let stem = utf8_percent_encode(name, NON_ALPHANUMERIC).to_string();
        self.root.join(format!("{stem}.sqlite"))
    }

    async fn connect(&self, name: &str) -> KvResult<Pool<Sqlite>> {
        let opts = SqliteConnectOptions::new()
            .filename(self.database_path(name))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| KvError::OpenFailure {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn prepare(&self, name: &str, pool: &Pool<Sqlite>, version: u32) -> KvResult<()> {
        let stored: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await?;
        let stored = u32::try_from(stored).unwrap_or(u32::MAX);

        if stored > version {
            return Err(KvError::OpenFailure {
                name: name.to_string(),
                reason: format!(
                    "requested version {version} is older than stored version {stored}"
                ),
            });
        }

        if stored != 0 && stored < version {
            self.tracker.request_exclusive(name, Some(version))?;
            self.tracker.wait_until_idle(name, Some(version)).await;
            tracing::debug!(db = name, from = stored, to = version, "upgrading database");
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY NOT NULL, value BLOB NOT NULL) WITHOUT ROWID",
            quote_identifier(name)
        ))
        .execute(pool)
        .await?;

        if stored != version {
            // PRAGMA does not accept bound parameters.
            sqlx::query(&format!("PRAGMA user_version = {version}"))
                .execute(pool)
                .await?;
        }
        Ok(())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    #[instrument(skip(self, observer), fields(engine = "sqlite"))]
    async fn open(
        &self,
        name: &str,
        version: u32,
        observer: Arc<dyn ConnectionObserver>,
    ) -> KvResult<Arc<dyn Connection>> {
        if name.is_empty() {
            return Err(KvError::InvalidName("database name is empty".to_string()));
        }

        let pool = self.connect(name).await?;
        if let Err(e) = self.prepare(name, &pool, version).await {
            pool.close().await;
            return Err(e);
        }

        let id = self.tracker.register(name, version, observer);
        Ok(Arc::new(SqliteConnection {
            name: name.to_string(),
            table: quote_identifier(name),
            id,
            pool,
            tracker: self.tracker.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    #[instrument(skip(self), fields(engine = "sqlite"))]
    async fn delete_database(&self, name: &str) -> KvResult<()> {
        self.tracker.request_exclusive(name, None)?;
        // Pools still shutting down must finish before their files go away.
        self.tracker.wait_until_idle(name, None).await;

        let path = self.database_path(name);
        let mut paths = vec![path.clone()];
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            paths.push(PathBuf::from(sidecar));
        }

        for path in paths {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn wait_for_release(&self, name: &str) {
        self.tracker.wait_for_release(name).await;
    }

    fn engine_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Connection to a [`SqliteEngine`] database.
pub struct SqliteConnection {
    name: String,
    table: String,
    id: u64,
    pool: Pool<Sqlite>,
    tracker: Arc<ConnectionTracker>,
    closed: AtomicBool,
}

impl SqliteConnection {
    fn check(&self) -> KvResult<()> {
        if self.closed.load(Ordering::SeqCst) || self.pool.is_closed() {
            return Err(KvError::ConnectionClosed(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        self.check()?;
        let value: Option<Vec<u8>> =
            sqlx::query_scalar(&format!("SELECT value FROM {} WHERE key = ?1", self.table))
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value.map(Bytes::from))
    }

    async fn put(&self, key: &str, value: Bytes) -> KvResult<()> {
        self.check()?;
        sqlx::query(&format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        ))
        .bind(key)
        .bind(value.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        self.check()?;
        sqlx::query(&format!("DELETE FROM {} WHERE key = ?1", self.table))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> KvResult<()> {
        self.check()?;
        sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<String>> {
        self.check()?;
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let keys: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT key FROM {} \
             WHERE (?1 IS NULL OR key >= ?1) AND (?2 IS NULL OR key <= ?2) \
             ORDER BY key LIMIT ?3",
            self.table
        ))
        .bind(range.start.as_deref())
        .bind(range.end.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tracker.mark_closing(&self.name, self.id);

        let pool = self.pool.clone();
        let tracker = self.tracker.clone();
        let name = self.name.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    pool.close().await;
                    tracker.release(&name, id);
                });
            }
            Err(_) => {
                // No runtime left to drive the shutdown; dropping the pool closes it.
                tracker.release(&name, id);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close();
    }
}
