//! Conflict detection, exclusivity and resolution

use planwise_conflict::ConflictError;
use planwise_core::domain::{ConflictResolution, DataType, SyncStatus};
use planwise_core::ports::{Clock, ISyncStateRepository, RemoteError};
use planwise_sync::{PassOptions, SyncError, SyncEvent};

use crate::common::{course, payload, Harness};

/// Local edit stuck behind a failing remote while another device edits the
/// same course: the pull classifies it as a conflict
async fn conflicted_course_42(h: &Harness) {
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;

    h.edit(&key, "Linear Algebra (local)").await;
    h.remote.put_remote(&key, payload("Linear Algebra (remote)"));
    h.remote.fail_with(RemoteError::Transient("502".into()));

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();
    assert_eq!(result.conflicts, 1);
    h.remote.recover();
}

#[tokio::test]
async fn test_dirty_entity_with_new_remote_version_conflicts() {
    let h = Harness::new();
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;

    // Dirty without anything queued, as after a crash between writes
    let mut meta = h.metadata(&key).await;
    meta.mark_dirty(h.clock.now());
    h.repo.save_metadata(&meta).await.unwrap();
    h.local.write(&key, payload("Linear Algebra (local)"));
    h.remote.put_remote(&key, payload("Linear Algebra (remote)"));
    let mut events = h.service.subscribe_events();

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(result.conflicts, 1);
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Conflict);
    assert_eq!(meta.conflict_data, Some(payload("Linear Algebra (remote)")));
    assert_eq!(h.local.get(&key), Some(payload("Linear Algebra (local)")));
    assert_eq!(h.local.engine_writes(), 0);

    let mut detected = false;
    while let Ok(event) = events.try_recv() {
        detected |= event == SyncEvent::ConflictDetected { key: key.clone() };
    }
    assert!(detected);

    h.service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::UseServer)
        .await
        .unwrap();

    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Synced);
    assert!(!meta.is_dirty);
    assert!(meta.conflict_data.is_none());
    assert_eq!(h.local.get(&key), Some(payload("Linear Algebra (remote)")));
}

#[tokio::test]
async fn test_conflicted_entity_is_excluded_from_passes() {
    let h = Harness::new();
    conflicted_course_42(&h).await;
    let key = course("42");
    let frozen = h.metadata(&key).await;
    let applies = h.remote.apply_count();

    // Another local edit queues up but does not leave conflict
    h.edit(&key, "Linear Algebra (local, again)").await;
    assert_eq!(h.metadata(&key).await.status, SyncStatus::Conflict);

    // The backoff window of the first item is long over
    h.clock.advance(chrono::Duration::hours(2));
    h.remote.put_remote(&key, payload("Linear Algebra (remote, again)"));
    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(result.skipped, 2);
    assert_eq!(result.conflicts, 0);
    assert_eq!(h.remote.apply_count(), applies);
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Conflict);
    assert_eq!(meta.conflict_data, frozen.conflict_data);
    assert_eq!(h.queue_len().await, 2);
}

#[tokio::test]
async fn test_use_local_pushes_local_snapshot() {
    let h = Harness::new();
    conflicted_course_42(&h).await;
    let key = course("42");

    h.service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::UseLocal)
        .await
        .unwrap();
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Pending);
    assert!(meta.is_dirty);

    h.clock.advance(chrono::Duration::hours(1));
    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(result.conflicts, 0);
    assert_eq!(h.queue_len().await, 0);
    assert_eq!(
        h.remote.document(&key).unwrap().1,
        payload("Linear Algebra (local)")
    );
    assert_eq!(h.metadata(&key).await.status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_use_server_discards_queued_edits() {
    let h = Harness::new();
    conflicted_course_42(&h).await;
    let key = course("42");
    assert_eq!(h.queue_len().await, 1);

    h.service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::UseServer)
        .await
        .unwrap();

    assert_eq!(h.queue_len().await, 0);
    assert_eq!(h.local.get(&key), Some(payload("Linear Algebra (remote)")));

    // The adopted version is current, so the next pull has nothing to do
    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();
    assert_eq!(result.pulled, 0);
    assert_eq!(result.conflicts, 0);
}

#[tokio::test]
async fn test_merge_writes_and_pushes_merged_payload() {
    let h = Harness::new();
    conflicted_course_42(&h).await;
    let key = course("42");
    let merged = payload("Linear Algebra (merged)");

    h.service
        .resolve_conflict(
            DataType::Course,
            "42",
            ConflictResolution::Merge(merged.clone()),
        )
        .await
        .unwrap();
    assert_eq!(h.local.get(&key), Some(merged.clone()));

    h.clock.advance(chrono::Duration::hours(1));
    h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(h.remote.document(&key).unwrap().1, merged);
    assert_eq!(h.metadata(&key).await.status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_ask_user_leaves_conflict_in_place() {
    let h = Harness::new();
    conflicted_course_42(&h).await;

    h.service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::AskUser)
        .await
        .unwrap();

    assert_eq!(h.metadata(&course("42")).await.status, SyncStatus::Conflict);
    let items = h.service.conflict_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].remote, payload("Linear Algebra (remote)"));
}

#[tokio::test]
async fn test_resolve_requires_conflict() {
    let h = Harness::new();
    h.seed_synced(&course("42"), "Linear Algebra").await;

    let err = h
        .service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::UseServer)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConflictNotFound(_)));

    let err = h
        .service
        .resolve_conflict(DataType::Course, "missing", ConflictResolution::UseLocal)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConflictNotFound(_)));
}

#[tokio::test]
async fn test_use_local_without_local_state_fails() {
    let h = Harness::new();
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;
    let mut meta = h.metadata(&key).await;
    meta.mark_dirty(crate::common::t0());
    meta.mark_conflict(payload("remote"), crate::common::t0())
        .unwrap();
    h.repo.save_metadata(&meta).await.unwrap();
    h.local.forget(&key);

    let err = h
        .service
        .resolve_conflict(DataType::Course, "42", ConflictResolution::UseLocal)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::Conflict(ConflictError::NoLocalState(_))
    ));
    assert_eq!(h.metadata(&key).await.status, SyncStatus::Conflict);
}
