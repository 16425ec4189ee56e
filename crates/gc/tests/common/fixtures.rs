//! Store seeding helpers and a wired-up collector.

use super::mocks::{CountingHashCache, RecordingNotifier, ScriptedConfirmer};
use std::sync::Arc;
use vellum_core::config::GcConfig;
use vellum_core::{ChunkDoc, ChunkId, Document, FileEntry, Revision};
use vellum_gc::{ChunkGc, MemoryDocumentStore};

/// Collector over an in-memory store with recording collaborators.
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub confirmer: Arc<ScriptedConfirmer>,
    pub hash_cache: Arc<CountingHashCache>,
    pub gc: ChunkGc,
}

#[allow(dead_code)]
impl Harness {
    /// Default configuration, confirming every request.
    pub fn new() -> Self {
        Self::with(GcConfig::default(), true)
    }

    pub fn with(config: GcConfig, confirm: bool) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let confirmer = Arc::new(ScriptedConfirmer::new(confirm));
        let hash_cache = Arc::new(CountingHashCache::default());
        let gc = ChunkGc::new(store.clone(), config)
            .with_notifier(notifier.clone())
            .with_confirmer(confirmer.clone())
            .with_hash_cache(hash_cache.clone());
        Self {
            store,
            notifier,
            confirmer,
            hash_cache,
            gc,
        }
    }

    /// Current winning chunk, tombstones included.
    pub fn chunk(&self, id: &ChunkId) -> ChunkDoc {
        match self.store.winning(id.as_str()) {
            Some(Document::Leaf(chunk)) => chunk,
            other => panic!("expected chunk {id}, got {other:?}"),
        }
    }

    /// Current winning file entry, tombstones included.
    pub fn file(&self, id: &str) -> FileEntry {
        match self.store.winning(id) {
            Some(doc) => doc.as_file().cloned().expect("file entry"),
            None => panic!("missing file {id}"),
        }
    }
}

/// Store a new chunk and return it with its revision.
#[allow(dead_code)]
pub fn put_chunk(store: &MemoryDocumentStore, data: &str) -> ChunkDoc {
    let mut chunk = ChunkDoc::new(data);
    chunk.rev = Some(store.put(chunk.clone().into()).unwrap());
    chunk
}

/// Store a new plain file entry referencing `children`.
#[allow(dead_code)]
pub fn put_file(
    store: &MemoryDocumentStore,
    path: &str,
    children: &[&ChunkDoc],
    deleted: bool,
) -> FileEntry {
    let mut entry = FileEntry::new(path, children.iter().map(|c| c.id.clone()).collect());
    entry.deleted = deleted;
    entry.size = children.iter().map(|c| c.payload_len()).sum();
    entry.rev = Some(store.put(Document::Plain(entry.clone())).unwrap());
    entry
}

/// Write `chunk` on top of `parent` and return it with the new revision.
#[allow(dead_code)]
pub fn put_revision(store: &MemoryDocumentStore, mut chunk: ChunkDoc, parent: &Revision) -> ChunkDoc {
    chunk.rev = Some(parent.clone());
    chunk.rev = Some(store.put(chunk.clone().into()).unwrap());
    chunk
}
