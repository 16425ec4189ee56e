//! Key-value store error types.

use thiserror::Error;

/// Key-value store operation errors.
#[derive(Debug, Error)]
pub enum KvError {
    #[error("failed to open database {name}: {reason}")]
    OpenFailure { name: String, reason: String },

    #[error("database destroyed: {0}")]
    DatabaseDestroyed(String),

    #[error("database {name} blocked by {connections} open connection(s)")]
    Blocked { name: String, connections: usize },

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("connection terminated: {0}")]
    Terminated(String),

    #[error("invalid database name: {0}")]
    InvalidName(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Errors after which the connection must be reopened before retrying.
    pub fn needs_reopen(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_) | Self::Terminated(_))
    }
}

/// Result type for key-value operations.
pub type KvResult<T> = std::result::Result<T, KvError>;
