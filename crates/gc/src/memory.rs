//! In-process document store.

use crate::error::GcResult;
use crate::store::{
    AllDocsOptions, BulkResult, DocumentStore, Fetched, GetOptions, RevisionInfo, RevisionStatus,
    WriteError,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use vellum_core::{Document, Revision};

struct StoredRevision {
    rev: Revision,
    /// None once compacted away.
    body: Option<Document>,
    tombstone: bool,
}

impl StoredRevision {
    fn status(&self) -> RevisionStatus {
        match (&self.body, self.tombstone) {
            (_, true) => RevisionStatus::Deleted,
            (Some(_), false) => RevisionStatus::Available,
            (None, false) => RevisionStatus::Missing,
        }
    }
}

/// Revision-tracking document store kept in memory.
///
/// Each document has a linear history. Writes must carry the current `_rev`
/// (or none, to create a document or recreate a tombstoned one); anything else
/// is a conflict. Old revision bodies are kept until [`compact`](Self::compact).
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Vec<StoredRevision>>>,
    bulk_calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of [`bulk_docs`](DocumentStore::bulk_docs) calls so far.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Write one document and return its new revision.
    pub fn put(&self, doc: Document) -> Result<Revision, WriteError> {
        let mut docs = self.docs.write();
        Self::write(&mut docs, doc)
    }

    /// Current winning document, tombstones included.
    pub fn winning(&self, id: &str) -> Option<Document> {
        self.docs
            .read()
            .get(id)
            .and_then(|history| history.last())
            .and_then(|stored| stored.body.clone())
    }

    /// Number of stored revisions of `id`.
    pub fn revision_count(&self, id: &str) -> usize {
        self.docs.read().get(id).map_or(0, Vec::len)
    }

    /// Discard the bodies of every non-winning revision.
    pub fn compact(&self) {
        let mut docs = self.docs.write();
        for history in docs.values_mut() {
            if let Some((_, older)) = history.split_last_mut() {
                for stored in older {
                    stored.body = None;
                }
            }
        }
        tracing::debug!(documents = docs.len(), "document store compacted");
    }

    fn write(
        docs: &mut BTreeMap<String, Vec<StoredRevision>>,
        mut doc: Document,
    ) -> Result<Revision, WriteError> {
        let id = doc.id().to_string();
        let history = docs.get(&id);
        let current = history.and_then(|h| h.last());

        let parent = match (current, doc.rev()) {
            (None, None) => None,
            (None, Some(_)) => return Err(WriteError::NotFound),
            (Some(current), Some(rev)) if &current.rev == rev => Some(current.rev.clone()),
            // A tombstoned document may be recreated without a revision.
            (Some(current), None) if current.tombstone => Some(current.rev.clone()),
            (Some(_), _) => return Err(WriteError::Conflict),
        };

        doc.set_rev(None);
        let body = doc
            .to_json_bytes()
            .map_err(|e| WriteError::Other(e.to_string()))?;
        let rev = match parent {
            Some(parent) => parent.next(&body),
            None => Revision::initial(&body),
        };
        doc.set_rev(Some(rev.clone()));

        let tombstone = doc.is_tombstoned();
        docs.entry(id).or_default().push(StoredRevision {
            rev: rev.clone(),
            body: Some(doc),
            tombstone,
        });
        Ok(rev)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str, opts: &GetOptions) -> GcResult<Option<Fetched>> {
        let docs = self.docs.read();
        let Some(history) = docs.get(id) else {
            return Ok(None);
        };

        let stored = match &opts.rev {
            Some(rev) => history.iter().find(|stored| &stored.rev == rev),
            None => history.last().filter(|stored| !stored.tombstone),
        };
        let Some(doc) = stored.and_then(|stored| stored.body.clone()) else {
            return Ok(None);
        };

        let revs_info = if opts.revs_info {
            history
                .iter()
                .rev()
                .map(|stored| RevisionInfo {
                    rev: stored.rev.clone(),
                    status: stored.status(),
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(Some(Fetched { doc, revs_info }))
    }

    async fn bulk_docs(&self, docs: Vec<Document>) -> GcResult<Vec<BulkResult>> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.docs.write();
        let results = docs
            .into_iter()
            .map(|doc| {
                let id = doc.id().to_string();
                match Self::write(&mut stored, doc) {
                    Ok(rev) => BulkResult::Ok { id, rev },
                    Err(error) => BulkResult::Failed { id, error },
                }
            })
            .collect();
        Ok(results)
    }

    async fn all_docs(&self, opts: &AllDocsOptions) -> GcResult<Vec<Document>> {
        let docs = self.docs.read();
        Ok(docs
            .values()
            .filter_map(|history| history.last())
            .filter(|stored| opts.include_deleted || !stored.tombstone)
            .filter_map(|stored| stored.body.clone())
            .collect())
    }
}
