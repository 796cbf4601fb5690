//! Sync notifications
//!
//! Observers (UI badges, the daemon's status output) subscribe to a
//! broadcast channel instead of polling the repository. Sending never
//! blocks and never fails when nobody listens.

use planwise_core::domain::{EntityKey, PassResult, SyncStatus};
use tokio::sync::broadcast;

/// Default channel capacity; slow receivers observe `Lagged` instead of
/// holding back the engine
const DEFAULT_CAPACITY: usize = 256;

/// Something observers may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PassStarted,
    PassFinished(PassResult),
    /// An entity's status changed; `from` is `None` for new entities
    StatusChanged {
        key: EntityKey,
        from: Option<SyncStatus>,
        to: SyncStatus,
    },
    /// A pull classified the entity as conflicted
    ConflictDetected { key: EntityKey },
    /// All sync state was wiped
    StateCleared,
}

/// Cloneable sending side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        // Err only means there are no receivers
        let _ = self.tx.send(event);
    }

    /// Emits `StatusChanged` if `from` differs from `to`
    pub fn status_changed(&self, key: &EntityKey, from: Option<SyncStatus>, to: SyncStatus) {
        if from != Some(to) {
            self.emit(SyncEvent::StatusChanged {
                key: key.clone(),
                from,
                to,
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
