//! Chunk reachability.

use std::collections::{BTreeMap, HashSet};
use vellum_core::{ChunkDoc, ChunkId, Document};

/// Reachability snapshot computed from one full scan of the store.
#[derive(Clone, Debug, Default)]
pub struct ChunkUsage {
    /// Chunks referenced by any file entry that is not tombstoned, including
    /// logically deleted entries whose deletion is not committed yet.
    pub used: HashSet<ChunkId>,
    /// Chunks referenced by file entries that are neither tombstoned nor
    /// logically deleted.
    pub used_by_live: HashSet<ChunkId>,
    /// Every chunk document, tombstoned ones included.
    pub existing: BTreeMap<ChunkId, ChunkDoc>,
    /// Every file entry document, tombstoned ones included.
    pub files: Vec<Document>,
}

impl ChunkUsage {
    /// Build from the winning revisions of every document.
    pub fn from_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let mut usage = Self::default();
        for doc in docs {
            match &doc {
                Document::Leaf(chunk) => {
                    usage.existing.insert(chunk.id.clone(), chunk.clone());
                }
                Document::Plain(entry) | Document::Newnote(entry) => {
                    if !entry.tombstoned {
                        usage.used.extend(entry.children.iter().cloned());
                        if !entry.deleted {
                            usage.used_by_live.extend(entry.children.iter().cloned());
                        }
                    }
                    usage.files.push(doc);
                }
            }
        }
        usage
    }

    /// Whether `id` is referenced. `include_pending` counts references from
    /// logically deleted file entries.
    pub fn is_used(&self, id: &ChunkId, include_pending: bool) -> bool {
        if include_pending {
            self.used.contains(id)
        } else {
            self.used_by_live.contains(id)
        }
    }
}
