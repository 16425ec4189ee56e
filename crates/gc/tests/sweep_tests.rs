// Mark, commit and remove passes over unreferenced chunks and deleted files

mod common;

use common::{Harness, put_chunk, put_file, put_revision};
use vellum_core::config::GcConfig;
use vellum_gc::{ConfirmMode, GcAction, GcError, GcOutcome, WriteError};

#[tokio::test]
async fn test_mark_unused_is_idempotent() {
    let h = Harness::new();
    let used = put_chunk(&h.store, "used");
    let a = put_chunk(&h.store, "unused a");
    let b = put_chunk(&h.store, "unused b");
    put_file(&h.store, "a.md", &[&used], false);

    let outcome = h.gc.mark_unused_chunks(ConfirmMode::Ask).await.unwrap();
    let report = outcome.report().unwrap();
    assert_eq!((report.succeeded, report.total), (2, 2));

    for id in [&a.id, &b.id] {
        let chunk = h.chunk(id);
        assert!(chunk.tombstoned);
        assert!(!chunk.data.is_empty());
    }
    assert!(!h.chunk(&used.id).tombstoned);

    let calls = h.store.bulk_calls();
    let again = h.gc.mark_unused_chunks(ConfirmMode::Ask).await.unwrap();
    assert_eq!(again, GcOutcome::NothingToDo { lost: 0 });
    assert_eq!(h.store.bulk_calls(), calls);

    // Tombstoned chunks still count as existing.
    let usage = h.gc.usage().await.unwrap();
    assert_eq!(usage.existing.len(), 3);
}

#[tokio::test]
async fn test_partial_bulk_write_is_reported() {
    let h = Harness::new();
    let chunks: Vec<_> = (0..5)
        .map(|i| put_chunk(&h.store, &format!("chunk {i}")))
        .collect();

    let plan = h.gc.plan(GcAction::MarkUnusedChunks).await.unwrap();
    assert_eq!(plan.candidates(), 5);

    // Two chunks move on between planning and applying.
    for chunk in &chunks[..2] {
        put_revision(&h.store, chunk.clone(), chunk.rev.as_ref().unwrap());
    }

    let report = h.gc.apply(&plan).await.unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.total, 5);
    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.error == WriteError::Conflict));
    assert_eq!(h.hash_cache.clears(), 1);
}

#[tokio::test]
async fn test_commit_chunk_deletion_without_candidates_writes_nothing() {
    let h = Harness::new();
    let chunk = put_chunk(&h.store, "live");
    put_file(&h.store, "a.md", &[&chunk], false);

    let outcome = h.gc.commit_chunk_deletion(ConfirmMode::Ask).await.unwrap();
    assert_eq!(outcome, GcOutcome::NothingToDo { lost: 0 });
    assert_eq!(h.store.bulk_calls(), 0);
    assert_eq!(h.hash_cache.clears(), 0);
    assert!(h.notifier.contains("no tombstoned chunks with content found"));
    assert!(h.confirmer.requests().is_empty());
}

#[tokio::test]
async fn test_commit_chunk_deletion_vacates_tombstones() {
    let h = Harness::new();
    let chunk = put_chunk(&h.store, "payload");
    put_revision(&h.store, chunk.marked_deleted(), chunk.rev.as_ref().unwrap());

    let outcome = h.gc.commit_chunk_deletion(ConfirmMode::Ask).await.unwrap();
    assert!(matches!(outcome, GcOutcome::Applied { candidates: 1, bytes: 7, .. }));

    let vacated = h.chunk(&chunk.id);
    assert!(vacated.tombstoned);
    assert!(vacated.data.is_empty());
    assert!(h.notifier.last().unwrap().contains("1/1 written"));
}

#[tokio::test]
async fn test_commit_file_deletion_releases_chunks() {
    let h = Harness::new();
    let kept = put_chunk(&h.store, "kept");
    let dropped = put_chunk(&h.store, "dropped");
    let live = put_file(&h.store, "live.md", &[&kept], false);
    let deleted = put_file(&h.store, "deleted.md", &[&dropped], true);

    // Chunks of uncommitted deletions are still in use.
    let plan = h.gc.plan(GcAction::MarkUnusedChunks).await.unwrap();
    assert!(plan.is_empty());

    let outcome = h.gc.commit_file_deletion(ConfirmMode::Ask).await.unwrap();
    assert!(matches!(outcome, GcOutcome::Applied { candidates: 1, .. }));
    assert!(h.file(&deleted.id).tombstoned);
    assert!(!h.file(&live.id).tombstoned);

    let outcome = h.gc.mark_unused_chunks(ConfirmMode::Skip).await.unwrap();
    assert!(matches!(outcome, GcOutcome::Applied { candidates: 1, .. }));
    assert!(h.chunk(&dropped.id).tombstoned);
    assert!(!h.chunk(&kept.id).tombstoned);
}

#[tokio::test]
async fn test_remove_unused_respects_pending_deletions() {
    let h = Harness::new();
    let pending = put_chunk(&h.store, "pending");
    let orphan = put_chunk(&h.store, "orphan");
    put_file(&h.store, "deleted.md", &[&pending], true);

    let outcome = h.gc.remove_unused_chunks(ConfirmMode::Skip).await.unwrap();
    assert!(matches!(outcome, GcOutcome::Applied { candidates: 1, .. }));

    let removed = h.chunk(&orphan.id);
    assert!(removed.tombstoned && removed.data.is_empty());
    assert!(!h.chunk(&pending.id).tombstoned);

    // Already removed chunks are not selected again.
    let outcome = h.gc.remove_unused_chunks(ConfirmMode::Skip).await.unwrap();
    assert_eq!(outcome, GcOutcome::NothingToDo { lost: 0 });
}

#[tokio::test]
async fn test_remove_unused_can_ignore_pending_deletions() {
    let config = GcConfig {
        remove_respects_pending_deletions: false,
        ..GcConfig::default()
    };
    let h = Harness::with(config, true);
    let pending = put_chunk(&h.store, "pending");
    put_file(&h.store, "deleted.md", &[&pending], true);

    h.gc.remove_unused_chunks(ConfirmMode::Skip).await.unwrap();

    let removed = h.chunk(&pending.id);
    assert!(removed.tombstoned && removed.data.is_empty());
}

#[tokio::test]
async fn test_declined_confirmation_writes_nothing() {
    let h = Harness::with(GcConfig::default(), false);
    put_chunk(&h.store, "unused");

    let outcome = h.gc.mark_unused_chunks(ConfirmMode::Ask).await.unwrap();
    assert_eq!(
        outcome,
        GcOutcome::Cancelled {
            candidates: 1,
            bytes: 6
        }
    );
    assert_eq!(h.store.bulk_calls(), 0);
    assert!(h.notifier.contains("cancelled"));

    let request = &h.confirmer.requests()[0];
    assert_eq!(request.action, GcAction::MarkUnusedChunks);
    assert!(request.message.contains("1 unused chunks (6 bytes)"));
}

#[tokio::test]
async fn test_skip_mode_does_not_ask() {
    let h = Harness::with(GcConfig::default(), false);
    put_chunk(&h.store, "unused");

    let outcome = h.gc.mark_unused_chunks(ConfirmMode::Skip).await.unwrap();
    assert!(outcome.report().unwrap().is_complete());
    assert!(h.confirmer.requests().is_empty());
}

#[tokio::test]
async fn test_unavailable_configuration_refuses_every_pass() {
    for config in [
        GcConfig {
            fixed_chunk_ids: false,
            ..GcConfig::default()
        },
        GcConfig {
            read_chunks_online: true,
            ..GcConfig::default()
        },
    ] {
        let h = Harness::with(config, true);
        put_chunk(&h.store, "unused");
        assert!(!h.gc.is_available());

        for action in GcAction::ALL {
            let err = h.gc.run(action, ConfirmMode::Skip).await.unwrap_err();
            assert!(matches!(err, GcError::Unavailable(_)));
        }
        let err = h.gc.verify_references().await.unwrap_err();
        assert!(matches!(err, GcError::Unavailable(_)));

        assert_eq!(h.store.bulk_calls(), 0);
        assert_eq!(h.notifier.notices().len(), GcAction::ALL.len() + 1);
        assert!(h.notifier.contains("chunk maintenance requires"));
    }
}
