//! Collection plans and their outcomes.

use crate::store::{BulkResult, WriteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use vellum_core::{ChunkId, Document};

/// A maintenance pass over the document store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcAction {
    /// Restore tombstoned chunks that are referenced again.
    ResurrectChunks,
    /// Tombstone file entries that were deleted logically.
    CommitFileDeletion,
    /// Vacate the payload of tombstoned chunks.
    CommitChunkDeletion,
    /// Tombstone unreferenced chunks, keeping their payload.
    MarkUnusedChunks,
    /// Tombstone and vacate unreferenced chunks in one step.
    RemoveUnusedChunks,
}

impl GcAction {
    pub const ALL: [GcAction; 5] = [
        Self::ResurrectChunks,
        Self::CommitFileDeletion,
        Self::CommitChunkDeletion,
        Self::MarkUnusedChunks,
        Self::RemoveUnusedChunks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResurrectChunks => "resurrect_chunks",
            Self::CommitFileDeletion => "commit_file_deletion",
            Self::CommitChunkDeletion => "commit_chunk_deletion",
            Self::MarkUnusedChunks => "mark_unused_chunks",
            Self::RemoveUnusedChunks => "remove_unused_chunks",
        }
    }

    /// Human-readable title for notices and dialogs.
    pub fn title(&self) -> &'static str {
        match self {
            Self::ResurrectChunks => "Resurrect chunks",
            Self::CommitFileDeletion => "Commit file deletion",
            Self::CommitChunkDeletion => "Commit chunk deletion",
            Self::MarkUnusedChunks => "Mark unused chunks",
            Self::RemoveUnusedChunks => "Remove unused chunks",
        }
    }

    /// What the candidates are, in a sentence fragment.
    pub(crate) fn noun(&self) -> &'static str {
        match self {
            Self::CommitFileDeletion => "deleted files",
            Self::ResurrectChunks => "resurrectable chunks",
            Self::CommitChunkDeletion => "tombstoned chunks with content",
            Self::MarkUnusedChunks | Self::RemoveUnusedChunks => "unused chunks",
        }
    }
}

impl fmt::Display for GcAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GcAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("unknown gc action: {s}"))
    }
}

/// Documents a pass would write, computed from a read snapshot.
///
/// The store may change before the plan is applied. Every document carries
/// the revision it was read at, so drifted documents fail with a conflict
/// instead of overwriting newer content.
#[derive(Clone, Debug)]
pub struct GcPlan {
    pub action: GcAction,
    pub docs: Vec<Document>,
    /// Payload bytes of the affected documents.
    pub bytes: u64,
    /// Resurrection candidates without any recoverable revision.
    pub lost: Vec<ChunkId>,
}

impl GcPlan {
    pub(crate) fn new(action: GcAction) -> Self {
        Self {
            action,
            docs: Vec::new(),
            bytes: 0,
            lost: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, doc: Document, bytes: u64) {
        self.docs.push(doc);
        self.bytes += bytes;
    }

    pub fn candidates(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteFailure {
    pub id: String,
    pub error: WriteError,
}

/// Aggregated outcome of one bulk write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: usize,
    pub total: usize,
    pub failures: Vec<WriteFailure>,
}

impl BulkReport {
    pub fn from_results(results: Vec<BulkResult>) -> Self {
        let mut report = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result {
                BulkResult::Ok { .. } => report.succeeded += 1,
                BulkResult::Failed { id, error } => report.failures.push(WriteFailure { id, error }),
            }
        }
        report
    }

    /// Whether every document was written.
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }
}

/// Whether a pass asks for confirmation before writing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmMode {
    Ask,
    Skip,
}

/// Result of [`ChunkGc::run`](crate::ChunkGc::run).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GcOutcome {
    /// Nothing to write. `lost` counts unrecoverable resurrection candidates.
    NothingToDo { lost: usize },
    /// The user declined; nothing was written.
    Cancelled { candidates: usize, bytes: u64 },
    Applied {
        candidates: usize,
        bytes: u64,
        lost: usize,
        report: BulkReport,
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
    },
}

impl GcOutcome {
    /// The write report, if anything was written.
    pub fn report(&self) -> Option<&BulkReport> {
        match self {
            Self::Applied { report, .. } => Some(report),
            _ => None,
        }
    }
}
