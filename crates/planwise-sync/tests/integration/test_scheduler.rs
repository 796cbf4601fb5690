//! Scheduler triggers, debouncing and shutdown
//!
//! Runs on a paused tokio clock so debounce windows elapse instantly.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use planwise_core::domain::{DataType, Operation};
use planwise_sync::{
    PassOptions, SchedulerHandle, SchedulerSettings, SyncScheduler, SyncService, Transport,
};

use crate::common::{course, payload, Harness};

fn settings() -> SchedulerSettings {
    SchedulerSettings {
        periodic_interval: Duration::from_secs(60),
        connectivity_debounce: Duration::from_secs(2),
        mutation_debounce: Duration::from_secs(1),
    }
}

/// Lets spawned tasks run to their next await point
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn start(h: &Harness) -> (JoinHandle<()>, SchedulerHandle, CancellationToken) {
    let (scheduler, handle) = SyncScheduler::new(h.engine.clone(), settings());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(cancel.clone()));
    (task, handle, cancel)
}

async fn stop(task: JoinHandle<()>, cancel: CancellationToken) {
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler should stop on cancellation")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_mutation_burst_triggers_one_pass() {
    let h = Harness::new();
    let (task, handle, cancel) = start(&h);
    let service = SyncService::new(h.engine.clone(), 10).with_scheduler(handle);
    settle().await;

    for (id, wait) in [("a", 300), ("b", 300), ("c", 0)] {
        service
            .enqueue_mutation(DataType::Course, id, Operation::Update, payload(id), None)
            .await
            .unwrap();
        sleep(Duration::from_millis(wait)).await;
    }

    // Last mutation at 600ms, so the pass is due at 1.6s
    sleep(Duration::from_millis(900)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 0);

    sleep(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 1);
    assert_eq!(h.queue_len().await, 0);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_triggers_pass_after_debounce() {
    let h = Harness::new();
    h.connectivity.observe(&[]);
    h.edit(&course("42"), "Linear Algebra").await;
    let (task, _handle, cancel) = start(&h);
    settle().await;

    h.connectivity.observe(&[Transport::Wifi]);
    sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 0);

    sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 1);
    assert_eq!(h.queue_len().await, 0);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_flapping_link_restarts_debounce() {
    let h = Harness::new();
    h.connectivity.observe(&[]);
    let (task, _handle, cancel) = start(&h);
    settle().await;

    h.connectivity.observe(&[Transport::Cellular]);
    sleep(Duration::from_secs(1)).await;
    h.connectivity.observe(&[]);
    sleep(Duration::from_millis(500)).await;
    h.connectivity.observe(&[Transport::Cellular]);

    // Would have fired at 2s without the drop
    sleep(Duration::from_millis(1500)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 0);

    sleep(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 1);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_quality_change_is_not_a_reconnect() {
    let h = Harness::new();
    let (task, _handle, cancel) = start(&h);
    settle().await;

    h.connectivity.observe(&[Transport::Ethernet]);
    sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 0);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_explicit_request_runs_immediately() {
    let h = Harness::new();
    let (task, handle, cancel) = start(&h);
    settle().await;

    handle.request_sync(PassOptions::forced());
    settle().await;
    assert_eq!(h.engine.passes_started(), 1);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_triggers_during_a_pass_are_dropped() {
    let h = Harness::new();
    h.edit(&course("42"), "Linear Algebra").await;
    h.remote.set_delay(Duration::from_secs(10));
    let (task, handle, cancel) = start(&h);
    settle().await;

    handle.request_sync(PassOptions::default());
    settle().await;
    handle.request_sync(PassOptions::default());
    handle.request_sync(PassOptions::forced());
    sleep(Duration::from_secs(11)).await;
    settle().await;

    assert_eq!(h.engine.passes_started(), 1);
    assert_eq!(h.remote.apply_count(), 1);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_periodic_pass_requires_suitable_connectivity() {
    let h = Harness::new();
    h.connectivity.observe(&[Transport::Bluetooth]);
    let (task, _handle, cancel) = start(&h);
    settle().await;

    sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 0);

    // Still online, so this is a quality change, not a reconnect
    h.connectivity.observe(&[Transport::Wifi]);
    sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(h.engine.passes_started(), 1);

    stop(task, cancel).await;
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_exits_when_handles_dropped() {
    let h = Harness::new();
    let (task, handle, _cancel) = start(&h);
    drop(handle);

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("scheduler should exit without handles")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_running_pass() {
    let h = Harness::new();
    h.edit(&course("42"), "Linear Algebra").await;
    h.remote.set_delay(Duration::from_secs(3));
    let (task, handle, cancel) = start(&h);
    settle().await;

    handle.request_sync(PassOptions::default());
    settle().await;
    assert!(h.engine.is_running());

    stop(task, cancel).await;
    assert!(!h.engine.is_running());
    assert_eq!(h.queue_len().await, 0);
}
