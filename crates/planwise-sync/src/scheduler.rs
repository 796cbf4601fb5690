//! Sync scheduler
//!
//! The [`SyncScheduler`] decides when passes run. It reacts to:
//! - local mutations (debounced, so a burst of edits becomes one pass)
//! - connectivity coming back (debounced, so a flapping link settles first)
//! - explicit requests (run immediately)
//! - a periodic timer (only while connectivity is suitable)
//!
//! Passes run on spawned tasks. The engine's single-flight guard drops any
//! trigger that fires while a pass is in progress.

use std::sync::Arc;
use std::time::Duration;

use planwise_core::config::SyncConfig;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::{earliest, Debouncer};
use crate::engine::{PassOptions, ReconciliationEngine};
use crate::SyncError;

/// Capacity of the trigger channel; triggers beyond it are coalesced away
const TRIGGER_CAPACITY: usize = 64;

/// Something that asks for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A mutation was queued
    Mutation,
    /// Caller asked for a pass now
    Request(PassOptions),
}

/// Timing knobs of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub periodic_interval: Duration,
    pub connectivity_debounce: Duration,
    pub mutation_debounce: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            periodic_interval: config.periodic_interval(),
            connectivity_debounce: config.connectivity_debounce(),
            mutation_debounce: config.mutation_debounce(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Cloneable handle for feeding triggers to a running scheduler
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl SchedulerHandle {
    pub fn notify_mutation(&self) {
        self.send(Trigger::Mutation);
    }

    pub fn request_sync(&self, options: PassOptions) {
        self.send(Trigger::Request(options));
    }

    fn send(&self, trigger: Trigger) {
        // A full channel already holds triggers that will cause a pass
        if let Err(e) = self.tx.try_send(trigger) {
            debug!(?trigger, error = %e, "Trigger not delivered");
        }
    }
}

pub struct SyncScheduler {
    engine: Arc<ReconciliationEngine>,
    settings: SchedulerSettings,
    rx: mpsc::Receiver<Trigger>,
}

impl SyncScheduler {
    /// Creates a scheduler and the handle that feeds it
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        settings: SchedulerSettings,
    ) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
        (
            Self {
                engine,
                settings,
                rx,
            },
            SchedulerHandle { tx },
        )
    }

    /// Runs until `cancel` fires or every handle is dropped
    ///
    /// In-flight passes are awaited before returning.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            periodic_secs = self.settings.periodic_interval.as_secs(),
            "Sync scheduler started"
        );

        let connectivity = self.engine.connectivity().clone();
        let mut online_rx = connectivity.subscribe();
        let mut connectivity_watch = true;

        let period = self.settings.periodic_interval;
        let mut periodic = tokio::time::interval_at(Instant::now() + period, period);
        periodic.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut mutation_debounce = Debouncer::new(self.settings.mutation_debounce);
        let mut connectivity_debounce = Debouncer::new(self.settings.connectivity_debounce);
        let mut passes = JoinSet::new();

        loop {
            let next_deadline = earliest(mutation_debounce.deadline(), connectivity_debounce.deadline());

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
                trigger = self.rx.recv() => match trigger {
                    Some(Trigger::Mutation) => mutation_debounce.touch(Instant::now()),
                    Some(Trigger::Request(options)) => self.spawn_pass(&mut passes, options, "request"),
                    None => {
                        debug!("All scheduler handles dropped");
                        break;
                    }
                },
                changed = online_rx.changed(), if connectivity_watch => {
                    if changed.is_err() {
                        warn!("Connectivity monitor gone, no longer watching");
                        connectivity_watch = false;
                        continue;
                    }
                    if online_rx.borrow_and_update().online {
                        debug!("Connectivity regained, debouncing");
                        connectivity_debounce.touch(Instant::now());
                    } else {
                        connectivity_debounce.cancel();
                    }
                }
                _ = periodic.tick() => {
                    if connectivity.is_suitable_for_sync() {
                        self.spawn_pass(&mut passes, PassOptions::default(), "periodic");
                    } else {
                        debug!("Periodic pass skipped: connectivity not suitable");
                    }
                }
                _ = sleep_until_deadline(next_deadline), if next_deadline.is_some() => {
                    let now = Instant::now();
                    let mutation_due = mutation_debounce.take_if_due(now);
                    let connectivity_due = connectivity_debounce.take_if_due(now);
                    if mutation_due || connectivity_due {
                        let reason = if connectivity_due { "connectivity" } else { "mutation" };
                        self.spawn_pass(&mut passes, PassOptions::default(), reason);
                    }
                }
                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Sync pass task failed");
                    }
                }
            }
        }

        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Sync pass task failed during shutdown");
            }
        }
        info!("Sync scheduler stopped");
    }

    fn spawn_pass(&self, passes: &mut JoinSet<()>, options: PassOptions, reason: &'static str) {
        let engine = self.engine.clone();
        passes.spawn(async move {
            match engine.run_pass(options).await {
                Ok(result) => {
                    debug!(reason, completed = result.completed, "Scheduled pass done");
                }
                Err(SyncError::PassInProgress) => {
                    debug!(reason, "Trigger dropped: pass in progress");
                }
                Err(e) => {
                    debug!(reason, error = %e, "Scheduled pass not run");
                }
            }
        });
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
