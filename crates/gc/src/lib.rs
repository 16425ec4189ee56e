//! Chunk garbage collector for Vellum.
//!
//! This crate provides:
//! - The document store contract the collector runs against, and an
//!   in-memory implementation
//! - Reachability computation over chunks and file entries
//! - [`ChunkGc`]: resurrection, commit-deletion and unused-chunk passes,
//!   each split into a read-only plan and a bulk write
//! - Reference verification for live file entries

pub mod engine;
pub mod error;
pub mod host;
pub mod memory;
pub mod plan;
pub mod store;
pub mod usage;

pub use engine::{BrokenFile, ChunkGc, VerifyReport};
pub use error::{GcError, GcResult};
pub use host::{AutoConfirm, ConfirmRequest, Confirmer, HashCache, NoHashCache, Notifier, TracingNotifier};
pub use memory::MemoryDocumentStore;
pub use plan::{BulkReport, ConfirmMode, GcAction, GcOutcome, GcPlan, WriteFailure};
pub use store::{
    AllDocsOptions, BulkResult, DocumentStore, Fetched, GetOptions, RevisionInfo, RevisionStatus,
    WriteError,
};
pub use usage::ChunkUsage;
