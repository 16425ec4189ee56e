//! Document store contract consumed by the collector.

use crate::error::GcResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use vellum_core::{Document, Revision};

/// Options for [`DocumentStore::get`].
#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    /// Fetch this revision instead of the winning one.
    pub rev: Option<Revision>,
    /// Also list every known revision of the document.
    pub revs_info: bool,
}

impl GetOptions {
    /// The given revision, with its revision history.
    pub fn history(rev: Revision) -> Self {
        Self {
            rev: Some(rev),
            revs_info: true,
        }
    }

    /// The given revision only.
    pub fn at(rev: Revision) -> Self {
        Self {
            rev: Some(rev),
            revs_info: false,
        }
    }
}

/// Availability of one revision body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionStatus {
    /// The body is still stored.
    Available,
    /// The body was discarded by compaction.
    Missing,
    /// The revision is a tombstone.
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionInfo {
    pub rev: Revision,
    pub status: RevisionStatus,
}

/// A fetched document.
#[derive(Clone, Debug)]
pub struct Fetched {
    pub doc: Document,
    /// Known revisions, newest first. Empty unless requested.
    pub revs_info: Vec<RevisionInfo>,
}

/// Why a single document write was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteError {
    /// The document's `_rev` is not the current revision.
    Conflict,
    /// The document does not exist.
    NotFound,
    Other(String),
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => f.write_str("conflict"),
            Self::NotFound => f.write_str("not found"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Outcome of one document in a bulk write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BulkResult {
    Ok { id: String, rev: Revision },
    Failed { id: String, error: WriteError },
}

impl BulkResult {
    pub fn id(&self) -> &str {
        match self {
            Self::Ok { id, .. } | Self::Failed { id, .. } => id,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Options for [`DocumentStore::all_docs`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AllDocsOptions {
    /// Include documents whose winning revision is a tombstone.
    pub include_deleted: bool,
}

/// A replicated document store with per-document revision histories.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document.
    ///
    /// Without an explicit revision, a document whose winning revision is a
    /// tombstone resolves to `None`. An explicit revision is returned even if
    /// it is a tombstone, and `None` if its body is no longer stored.
    async fn get(&self, id: &str, opts: &GetOptions) -> GcResult<Option<Fetched>>;

    /// Write several documents. Each document succeeds or fails on its own.
    async fn bulk_docs(&self, docs: Vec<Document>) -> GcResult<Vec<BulkResult>>;

    /// Winning revision of every document, ordered by id.
    async fn all_docs(&self, opts: &AllDocsOptions) -> GcResult<Vec<Document>>;
}
