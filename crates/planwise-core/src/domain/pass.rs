//! Outcome of one reconciliation pass

use serde::{Deserialize, Serialize};

/// Counters and diagnostics collected while a pass runs
///
/// Item and entity failures are counted here instead of aborting the pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassResult {
    /// Queue items accepted by the remote store
    pub synced: u32,
    /// Queue items that failed (requeued or dropped)
    pub failed: u32,
    /// Entities newly classified as conflicts
    pub conflicts: u32,
    /// Remote updates written to local state
    pub pulled: u32,
    /// Queue items or entities left untouched this pass
    pub skipped: u32,
    /// False when the pass ended early or was superseded
    pub completed: bool,
    /// Wall time of the pass
    pub duration_ms: u64,
    /// Error messages collected along the way
    pub errors: Vec<String>,
}

impl PassResult {
    /// True when nothing failed and no conflict was raised
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicts == 0 && self.errors.is_empty()
    }
}
