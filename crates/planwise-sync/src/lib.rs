//! Planwise Sync - Offline-first reconciliation engine
//!
//! Provides:
//! - A durable, prioritized queue of local mutations
//! - Connectivity tracking with quality thresholds
//! - Reconciliation passes (drain the queue, then pull remote changes)
//! - A scheduler reacting to mutations, connectivity and a periodic timer
//! - The caller-facing [`SyncService`]
//!
//! ## Modules
//!
//! - [`connectivity`] - Online/offline state and transport quality
//! - [`queue`] - Facade over the queue half of the state repository
//! - [`metadata`] - Facade over the metadata half, emitting status events
//! - [`engine`] - Single-flight reconciliation passes
//! - [`scheduler`] - Debounced triggers feeding the engine
//! - [`service`] - Public API consumed by the app
//! - [`events`] - Broadcast notifications for observers

pub mod connectivity;
pub mod debounce;
pub mod engine;
pub mod events;
pub mod metadata;
pub mod queue;
pub mod scheduler;
pub mod service;

pub use connectivity::{ConnectivityMonitor, ConnectivityState, Transport};
pub use engine::{PassOptions, ReconciliationEngine, SyncPorts};
pub use events::{EventBus, SyncEvent};
pub use metadata::MetadataStore;
pub use queue::SyncQueue;
pub use scheduler::{SchedulerHandle, SchedulerSettings, SyncScheduler, Trigger};
pub use service::{SyncService, SyncSummary};

use planwise_conflict::ConflictError;
use planwise_core::domain::DomainError;
use thiserror::Error;

/// Errors surfaced by the sync API
///
/// Item-level remote failures never show up here: a pass records them in
/// its `PassResult` and keeps going.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No authenticated user; passes are refused
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Connectivity is missing or below the required quality
    #[error("Offline or connection quality too low")]
    Offline,

    /// Another pass is running; this trigger was dropped
    #[error("A sync pass is already in progress")]
    PassInProgress,

    /// The entity is marked local-only and never leaves the device
    #[error("Entity is local-only: {0}")]
    LocalOnly(String),

    /// No conflict is recorded for the entity
    #[error("No conflict recorded for {0}")]
    ConflictNotFound(String),

    /// Resolution could not be planned
    #[error("Conflict error: {0}")]
    Conflict(#[from] ConflictError),

    /// A domain invariant was violated
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The state repository or local store failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}
