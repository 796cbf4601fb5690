//! Pull phase: remote updates, idempotence and discovery

use std::time::Duration;

use planwise_core::domain::{DataType, EntityKey, SyncStatus};
use planwise_core::ports::RemoteError;
use planwise_sync::{PassOptions, SyncEvent, Transport};

use crate::common::{course, payload, Harness};

#[tokio::test]
async fn test_pull_without_remote_change_is_a_no_op() {
    let h = Harness::new();
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;
    let before = h.metadata(&key).await;

    h.clock.advance(chrono::Duration::minutes(15));
    let first = h.engine.run_pass(PassOptions::default()).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(15));
    let second = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(first.pulled, 0);
    assert_eq!(second.pulled, 0);
    assert_eq!(h.metadata(&key).await, before);
    assert_eq!(h.local.engine_writes(), 0);
}

#[tokio::test]
async fn test_remote_update_overwrites_clean_entity() {
    let h = Harness::new();
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;
    let version = h.remote.put_remote(&key, payload("Linear Algebra II"));

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(result.pulled, 1);
    assert_eq!(result.conflicts, 0);
    assert_eq!(h.local.get(&key), Some(payload("Linear Algebra II")));
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Synced);
    assert_eq!(meta.server_version, Some(version));

    // Second pass sees nothing new
    let again = h.engine.run_pass(PassOptions::default()).await.unwrap();
    assert_eq!(again.pulled, 0);
    assert_eq!(h.local.engine_writes(), 1);
}

#[tokio::test]
async fn test_entity_missing_remotely_is_skipped() {
    let h = Harness::new();
    h.connectivity.observe(&[]);
    let key = course("draft");
    h.edit(&key, "Unsent").await;
    h.connectivity.observe(&[Transport::Ethernet]);
    h.remote
        .fail_with(planwise_core::ports::RemoteError::Transient("503".into()));

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert_eq!(result.conflicts, 0);
    assert_eq!(result.pulled, 0);
    assert!(result.completed);
    assert_eq!(h.remote.fetch_count(), 1);
}

#[tokio::test]
async fn test_unreachable_entity_is_skipped_without_failing_pass() {
    let h = Harness::new();
    let broken = course("1");
    let healthy = course("2");
    h.seed_synced(&broken, "One").await;
    h.seed_synced(&healthy, "Two").await;
    h.remote.put_remote(&broken, payload("One v2"));
    let version = h.remote.put_remote(&healthy, payload("Two v2"));
    h.remote
        .fail_fetch(&broken, RemoteError::Transient("connection reset".into()));
    let before = h.metadata(&broken).await;

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    assert!(result.completed);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.pulled, 1);
    assert!(result.errors.is_empty());
    assert_eq!(h.metadata(&broken).await, before);
    assert_eq!(h.local.get(&broken), Some(payload("One")));
    assert_eq!(h.metadata(&healthy).await.server_version, Some(version));
    assert_eq!(h.local.get(&healthy), Some(payload("Two v2")));
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_fetch_becomes_conflict() {
    let h = Harness::new();
    let key = course("42");
    h.seed_synced(&key, "Linear Algebra").await;
    h.remote.put_remote(&key, payload("Remote rename"));
    h.remote.set_fetch_delay(Duration::from_secs(1));

    let (result, _) = tokio::join!(h.engine.run_pass(PassOptions::default()), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.edit(&key, "Local rename").await;
    });
    let result = result.unwrap();

    assert_eq!(result.pulled, 0);
    assert_eq!(result.conflicts, 1);
    assert_eq!(h.local.engine_writes(), 0);
    assert_eq!(h.local.get(&key), Some(payload("Local rename")));
    let meta = h.metadata(&key).await;
    assert_eq!(meta.status, SyncStatus::Conflict);
    assert!(meta.is_dirty);
    assert_eq!(meta.conflict_data, Some(payload("Remote rename")));
    assert_eq!(h.queue_len().await, 1);
}

#[tokio::test]
async fn test_full_refresh_adopts_unknown_remote_entities() {
    let h = Harness::new();
    let known = course("known");
    h.seed_synced(&known, "Known").await;

    let semester = EntityKey::new(DataType::Semester, "2024-fall").unwrap();
    let other_course = course("7");
    h.remote.put_remote(&semester, payload("Fall 2024"));
    h.remote.put_remote(&other_course, payload("Statistics"));

    let plain = h.engine.run_pass(PassOptions::default()).await.unwrap();
    assert_eq!(plain.pulled, 0);

    let result = h.service.request_full_refresh().await.unwrap();

    assert_eq!(result.pulled, 2);
    assert!(result.completed);
    assert_eq!(h.local.get(&semester), Some(payload("Fall 2024")));
    let meta = h.metadata(&other_course).await;
    assert_eq!(meta.status, SyncStatus::Synced);
    assert!(!meta.is_dirty);
    assert_eq!(meta.server_version, h.remote.document(&other_course).map(|(v, _)| v));

    // Everything is tracked now
    let again = h.service.request_full_refresh().await.unwrap();
    assert_eq!(again.pulled, 0);
}

#[tokio::test]
async fn test_pass_events_and_completion_stamp() {
    let h = Harness::new();
    let mut events = h.service.subscribe_events();
    let key = course("42");
    h.edit(&key, "Linear Algebra").await;

    let result = h.engine.run_pass(PassOptions::default()).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen.first(),
        Some(&SyncEvent::StatusChanged {
            key: key.clone(),
            from: None,
            to: SyncStatus::Pending,
        })
    );
    assert!(seen.contains(&SyncEvent::PassStarted));
    assert!(seen.contains(&SyncEvent::StatusChanged {
        key,
        from: Some(SyncStatus::Pending),
        to: SyncStatus::Synced,
    }));
    assert_eq!(seen.last(), Some(&SyncEvent::PassFinished(result)));
    assert_eq!(h.service.last_sync_time().await.unwrap(), Some(crate::common::t0()));
}
