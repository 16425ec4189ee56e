//! The chunk garbage collector.

use crate::error::{GcError, GcResult};
use crate::host::{AutoConfirm, ConfirmRequest, Confirmer, HashCache, NoHashCache, Notifier, TracingNotifier};
use crate::plan::{BulkReport, ConfirmMode, GcAction, GcOutcome, GcPlan};
use crate::store::{AllDocsOptions, DocumentStore, GetOptions, RevisionStatus};
use crate::usage::ChunkUsage;
use futures::{StreamExt, stream};
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use vellum_core::config::GcConfig;
use vellum_core::{ChunkDoc, ChunkId, Document, FileEntry, Revision};

/// A file entry referencing chunks that are gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokenFile {
    pub path: String,
    pub missing: Vec<ChunkId>,
}

/// Result of [`ChunkGc::verify_references`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub files_checked: usize,
    /// Sorted by path.
    pub broken: Vec<BrokenFile>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty()
    }
}

/// Mark-and-sweep maintenance over a content-addressed document store.
///
/// Every pass reads one snapshot of the store, computes the documents to
/// write and submits them in a single bulk write. Nothing is locked between
/// the read and the write.
pub struct ChunkGc {
    store: Arc<dyn DocumentStore>,
    config: GcConfig,
    confirmer: Arc<dyn Confirmer>,
    notifier: Arc<dyn Notifier>,
    hash_cache: Arc<dyn HashCache>,
}

impl ChunkGc {
    /// Collector accepting every confirmation and logging its notices.
    pub fn new(store: Arc<dyn DocumentStore>, config: GcConfig) -> Self {
        Self {
            store,
            config,
            confirmer: Arc::new(AutoConfirm),
            notifier: Arc::new(TracingNotifier),
            hash_cache: Arc::new(NoHashCache),
        }
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_hash_cache(mut self, hash_cache: Arc<dyn HashCache>) -> Self {
        self.hash_cache = hash_cache;
        self
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Whether the store is configured so that collection is safe.
    pub fn is_available(&self) -> bool {
        self.config.unavailable_reason().is_none()
    }

    fn ensure_available(&self) -> GcResult<()> {
        match self.config.unavailable_reason() {
            None => Ok(()),
            Some(reason) => {
                self.notifier.notice(reason);
                Err(GcError::Unavailable(reason.to_string()))
            }
        }
    }

    /// Compute reachability from a full scan, tombstones included.
    pub async fn usage(&self) -> GcResult<ChunkUsage> {
        let docs = self
            .store
            .all_docs(&AllDocsOptions {
                include_deleted: true,
            })
            .await?;
        Ok(ChunkUsage::from_documents(docs))
    }

    /// Compute the documents `action` would write. Read-only.
    #[instrument(skip(self, action), fields(action = %action))]
    pub async fn plan(&self, action: GcAction) -> GcResult<GcPlan> {
        self.ensure_available()?;
        let usage = self.usage().await?;

        let plan = match action {
            GcAction::ResurrectChunks => self.plan_resurrection(&usage).await?,
            GcAction::CommitFileDeletion => plan_file_deletion(&usage),
            GcAction::CommitChunkDeletion => plan_chunk_deletion(&usage),
            GcAction::MarkUnusedChunks => plan_mark_unused(&usage),
            GcAction::RemoveUnusedChunks => {
                plan_remove_unused(&usage, self.config.remove_respects_pending_deletions)
            }
        };

        tracing::debug!(
            candidates = plan.candidates(),
            bytes = plan.bytes,
            lost = plan.lost.len(),
            existing = usage.existing.len(),
            used = usage.used.len(),
            "plan computed"
        );
        Ok(plan)
    }

    /// Write a plan in one bulk write and clear the hash cache.
    ///
    /// Per-document failures are reported, not retried.
    #[instrument(skip(self, plan), fields(action = %plan.action))]
    pub async fn apply(&self, plan: &GcPlan) -> GcResult<BulkReport> {
        self.ensure_available()?;
        if plan.is_empty() {
            return Ok(BulkReport::default());
        }

        let results = self.store.bulk_docs(plan.docs.clone()).await?;
        self.hash_cache.clear();

        let report = BulkReport::from_results(results);
        for failure in &report.failures {
            tracing::warn!(
                id = %failure.id,
                error = %failure.error,
                "document write failed"
            );
        }
        tracing::info!(
            succeeded = report.succeeded,
            total = report.total,
            "plan applied"
        );
        Ok(report)
    }

    /// Plan, report, confirm and apply `action`.
    pub async fn run(&self, action: GcAction, mode: ConfirmMode) -> GcResult<GcOutcome> {
        let plan = self.plan(action).await?;
        let title = action.title();

        if plan.is_empty() {
            let message = if plan.lost.is_empty() {
                format!("{title}: no {} found", action.noun())
            } else {
                format!(
                    "{title}: no resurrectable chunks found, {} completely lost",
                    plan.lost.len()
                )
            };
            self.notifier.notice(&message);
            return Ok(GcOutcome::NothingToDo {
                lost: plan.lost.len(),
            });
        }

        let mut summary = format!(
            "{title}: {} {} ({} bytes)",
            plan.candidates(),
            action.noun(),
            plan.bytes
        );
        if !plan.lost.is_empty() {
            summary.push_str(&format!(", {} completely lost", plan.lost.len()));
        }
        self.notifier.notice(&summary);

        if mode == ConfirmMode::Ask {
            let request = ConfirmRequest {
                action,
                title: title.to_string(),
                message: format!("{summary}. Proceed?"),
            };
            if !self.confirmer.confirm(&request).await {
                self.notifier.notice(&format!("{title}: cancelled"));
                return Ok(GcOutcome::Cancelled {
                    candidates: plan.candidates(),
                    bytes: plan.bytes,
                });
            }
        }

        let started_at = OffsetDateTime::now_utc();
        let report = self.apply(&plan).await?;
        let finished_at = OffsetDateTime::now_utc();
        self.notifier.notice(&format!(
            "{title}: {}/{} written",
            report.succeeded, report.total
        ));

        Ok(GcOutcome::Applied {
            candidates: plan.candidates(),
            bytes: plan.bytes,
            lost: plan.lost.len(),
            report,
            started_at,
            finished_at,
        })
    }

    /// Restore tombstoned chunks that are referenced again.
    pub async fn resurrect_chunks(&self, mode: ConfirmMode) -> GcResult<GcOutcome> {
        self.run(GcAction::ResurrectChunks, mode).await
    }

    /// Tombstone logically deleted file entries.
    pub async fn commit_file_deletion(&self, mode: ConfirmMode) -> GcResult<GcOutcome> {
        self.run(GcAction::CommitFileDeletion, mode).await
    }

    /// Vacate tombstoned chunks that still carry content.
    pub async fn commit_chunk_deletion(&self, mode: ConfirmMode) -> GcResult<GcOutcome> {
        self.run(GcAction::CommitChunkDeletion, mode).await
    }

    /// Tombstone unreferenced chunks, keeping their content.
    pub async fn mark_unused_chunks(&self, mode: ConfirmMode) -> GcResult<GcOutcome> {
        self.run(GcAction::MarkUnusedChunks, mode).await
    }

    /// Tombstone and vacate unreferenced chunks.
    pub async fn remove_unused_chunks(&self, mode: ConfirmMode) -> GcResult<GcOutcome> {
        self.run(GcAction::RemoveUnusedChunks, mode).await
    }

    async fn plan_resurrection(&self, usage: &ChunkUsage) -> GcResult<GcPlan> {
        let mut plan = GcPlan::new(GcAction::ResurrectChunks);
        let candidates = usage
            .existing
            .values()
            .filter(|chunk| chunk.tombstoned && usage.used.contains(&chunk.id));

        for chunk in candidates {
            if !chunk.is_vacated() {
                plan.push(chunk.resurrected(chunk.data.clone()).into(), chunk.payload_len());
                continue;
            }
            match self.recover_content(chunk).await? {
                Some(data) => {
                    let len = data.len() as u64;
                    plan.push(chunk.resurrected(data).into(), len);
                }
                None => {
                    tracing::debug!(id = %chunk.id, "no recoverable revision");
                    plan.lost.push(chunk.id.clone());
                }
            }
        }
        Ok(plan)
    }

    /// Oldest stored leaf revision with content, walking the history from
    /// the first generation.
    async fn recover_content(&self, chunk: &ChunkDoc) -> GcResult<Option<String>> {
        let Some(rev) = &chunk.rev else {
            return Ok(None);
        };
        let id = chunk.id.as_str();
        let Some(fetched) = self
            .store
            .get(id, &GetOptions::history(rev.clone()))
            .await?
        else {
            return Ok(None);
        };

        let mut available: Vec<Revision> = fetched
            .revs_info
            .into_iter()
            .filter(|info| info.status == RevisionStatus::Available)
            .map(|info| info.rev)
            .collect();
        available.sort_by(Revision::ancestor_order);

        for rev in available {
            let Some(old) = self.store.get(id, &GetOptions::at(rev)).await? else {
                continue;
            };
            if let Document::Leaf(old) = old.doc
                && !old.is_vacated()
            {
                return Ok(Some(old.data));
            }
        }
        Ok(None)
    }

    /// Check that every live file entry only references live chunks.
    ///
    /// Chunks are looked up with at most `verify_concurrency` requests in
    /// flight. Read-only.
    #[instrument(skip(self))]
    pub async fn verify_references(&self) -> GcResult<VerifyReport> {
        self.ensure_available()?;
        let usage = self.usage().await?;
        let limit = self.config.verify_concurrency.max(1);

        let entries: Vec<&FileEntry> = usage
            .files
            .iter()
            .filter_map(Document::as_file)
            .filter(|entry| entry.is_live())
            .collect();
        let files_checked = entries.len();

        let results: Vec<GcResult<Option<BrokenFile>>> = stream::iter(entries)
            .map(|entry| self.verify_entry(entry))
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut broken = Vec::new();
        for result in results {
            if let Some(file) = result? {
                broken.push(file);
            }
        }
        broken.sort_by(|a, b| a.path.cmp(&b.path));

        let report = VerifyReport {
            files_checked,
            broken,
        };
        self.notifier.notice(&format!(
            "Verify references: {} files checked, {} with missing chunks",
            report.files_checked,
            report.broken.len()
        ));
        Ok(report)
    }

    async fn verify_entry(&self, entry: &FileEntry) -> GcResult<Option<BrokenFile>> {
        let children: BTreeSet<&ChunkId> = entry.children.iter().collect();
        let mut missing = Vec::new();
        for id in children {
            let fetched = self.store.get(id.as_str(), &GetOptions::default()).await?;
            let intact = matches!(
                fetched.as_ref().map(|f| &f.doc),
                Some(Document::Leaf(chunk)) if !chunk.tombstoned && !chunk.is_vacated()
            );
            if !intact {
                missing.push(id.clone());
            }
        }

        if missing.is_empty() {
            return Ok(None);
        }
        tracing::warn!(
            path = %entry.path,
            missing = missing.len(),
            "file references missing chunks"
        );
        Ok(Some(BrokenFile {
            path: entry.path.clone(),
            missing,
        }))
    }
}

fn plan_file_deletion(usage: &ChunkUsage) -> GcPlan {
    let mut plan = GcPlan::new(GcAction::CommitFileDeletion);
    for doc in &usage.files {
        if let Some(entry) = doc.as_file()
            && entry.deleted
            && !entry.tombstoned
        {
            let size = entry.size;
            let committed = doc.clone().map_file(|entry| FileEntry {
                tombstoned: true,
                ..entry
            });
            plan.push(committed, size);
        }
    }
    plan
}

fn plan_chunk_deletion(usage: &ChunkUsage) -> GcPlan {
    let mut plan = GcPlan::new(GcAction::CommitChunkDeletion);
    for chunk in usage.existing.values() {
        if chunk.tombstoned && !chunk.is_vacated() {
            plan.push(chunk.vacated().into(), chunk.payload_len());
        }
    }
    plan
}

fn plan_mark_unused(usage: &ChunkUsage) -> GcPlan {
    let mut plan = GcPlan::new(GcAction::MarkUnusedChunks);
    for chunk in usage.existing.values() {
        if !chunk.tombstoned && !usage.used.contains(&chunk.id) {
            plan.push(chunk.marked_deleted().into(), chunk.payload_len());
        }
    }
    plan
}

fn plan_remove_unused(usage: &ChunkUsage, respect_pending: bool) -> GcPlan {
    let mut plan = GcPlan::new(GcAction::RemoveUnusedChunks);
    for chunk in usage.existing.values() {
        let already_removed = chunk.tombstoned && chunk.is_vacated();
        if !already_removed && !usage.is_used(&chunk.id, respect_pending) {
            plan.push(chunk.vacated().into(), chunk.payload_len());
        }
    }
    plan
}
