//! Garbage collector error types.

use thiserror::Error;

/// Garbage collector errors.
///
/// Per-document write failures are not errors; they are reported through
/// [`BulkReport`](crate::BulkReport).
#[derive(Debug, Error)]
pub enum GcError {
    #[error("chunk maintenance unavailable: {0}")]
    Unavailable(String),

    #[error("document store error: {0}")]
    Store(String),

    #[error(transparent)]
    Core(#[from] vellum_core::Error),
}

/// Result type for garbage collector operations.
pub type GcResult<T> = std::result::Result<T, GcError>;
