//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid chunk id: {0}")]
    InvalidChunkId(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
