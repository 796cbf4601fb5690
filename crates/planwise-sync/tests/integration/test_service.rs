//! Caller-facing API: counts, summaries and state reset

use std::time::Duration;

use planwise_core::domain::{DataType, Operation, Payload, SyncStatus};
use planwise_core::ports::{ISyncStateRepository, RemoteError, LAST_SYNC_COMPLETED_KEY};
use planwise_sync::{PassOptions, SyncError, SyncEvent, Transport};

use crate::common::{course, payload, t0, Harness};

#[tokio::test]
async fn test_pending_count_tracks_queue() {
    let h = Harness::new();
    assert_eq!(h.service.pending_count().await.unwrap(), 0);

    h.edit(&course("1"), "one").await;
    h.edit(&course("2"), "two").await;
    assert_eq!(h.service.pending_count().await.unwrap(), 2);

    h.service.request_sync(false).await.unwrap();
    assert_eq!(h.service.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_enqueue_rejects_blank_id() {
    let h = Harness::new();
    let err = h
        .service
        .enqueue_mutation(DataType::Course, "  ", Operation::Create, Payload::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Domain(_)));
    assert_eq!(h.queue_len().await, 0);
}

#[tokio::test]
async fn test_explicit_priority_is_kept() {
    let h = Harness::new();
    let item = h
        .service
        .enqueue_mutation(DataType::Profile, "me", Operation::Update, payload("me"), Some(0))
        .await
        .unwrap();
    assert_eq!(item.priority, 0);

    let default = h.edit(&course("1"), "one").await;
    assert_eq!(default.priority, 10);
}

#[tokio::test]
async fn test_summary() {
    let h = Harness::new();
    h.edit(&course("1"), "one").await;
    h.edit(&course("2"), "two").await;
    h.remote.fail_with(RemoteError::Permanent("rejected".into()));
    h.service.request_sync(false).await.unwrap();
    h.edit(&course("3"), "three").await;

    let summary = h.service.summary().await.unwrap();

    assert_eq!(summary.pending, 1);
    assert_eq!(summary.errors, 2);
    assert_eq!(summary.conflicts, 0);
    assert!(summary.online);
    assert_eq!(summary.quality, 90);
    assert_eq!(summary.connectivity, "online via wifi (quality 90)");
    assert_eq!(summary.last_sync, Some(t0()));
    assert!(!summary.pass_running);
}

#[tokio::test]
async fn test_forced_sync_on_weak_link() {
    let h = Harness::new();
    h.edit(&course("42"), "Linear Algebra").await;
    h.connectivity.observe(&[Transport::Bluetooth]);

    assert!(matches!(
        h.service.request_sync(false).await,
        Err(SyncError::Offline)
    ));
    let result = h.service.request_sync(true).await.unwrap();
    assert_eq!(result.synced, 1);
}

#[tokio::test]
async fn test_clear_all_sync_state() {
    let h = Harness::new();
    h.edit(&course("1"), "one").await;
    h.service.request_sync(false).await.unwrap();
    h.edit(&course("2"), "two").await;
    let mut events = h.service.subscribe_events();

    h.service.clear_all_sync_state().await.unwrap();

    assert_eq!(h.queue_len().await, 0);
    assert!(h.repo.all_metadata().await.unwrap().is_empty());
    assert!(h.service.last_sync_time().await.unwrap().is_none());
    assert_eq!(events.try_recv().unwrap(), SyncEvent::StateCleared);
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_pass_discards_its_writes() {
    let h = Harness::new();
    let key = course("42");
    h.edit(&key, "Linear Algebra").await;
    h.remote.set_delay(Duration::from_secs(5));

    let engine = h.engine.clone();
    let pass = tokio::spawn(async move { engine.run_pass(PassOptions::default()).await });
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert!(h.engine.is_running());

    h.service.clear_all_sync_state().await.unwrap();
    let result = pass.await.unwrap().unwrap();

    assert!(!result.completed);
    assert!(h.repo.get_metadata(&key).await.unwrap().is_none());
    assert!(h
        .repo
        .get_state(LAST_SYNC_COMPLETED_KEY)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_track_local_marks_entity() {
    let h = Harness::new();
    h.service
        .track_local(DataType::Notification, "reminder-1")
        .await
        .unwrap();
    let key = planwise_core::domain::EntityKey::new(DataType::Notification, "reminder-1").unwrap();
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Local);
    assert!(!meta.is_dirty);
}
