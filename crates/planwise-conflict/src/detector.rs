//! Conflict detection logic
//!
//! Classifies a pulled remote record against the locally recorded sync
//! metadata by comparing opaque version tokens.

use planwise_core::domain::{SyncMetadata, SyncStatus};
use planwise_core::ports::RemoteRecord;
use tracing::{debug, info};

/// Outcome of comparing a remote record with local metadata
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    /// Remote version equals the recorded one: nothing to do
    Unchanged,
    /// Remote changed and local is clean: overwrite local state
    RemoteUpdate,
    /// Remote changed while local has unsent changes
    Conflicted,
    /// The entity does not take part in automatic pulls
    Ignored,
}

/// Detects divergence between local and remote versions
pub struct ConflictDetector;

impl ConflictDetector {
    /// Classifies a remote record for the pull phase
    ///
    /// Entities already in `conflict` and `local`-only entities are ignored:
    /// a pass never moves an entity out of `conflict`, and local entities
    /// are never synced.
    pub fn check_remote(meta: &SyncMetadata, remote: &RemoteRecord) -> DetectionResult {
        if matches!(meta.status, SyncStatus::Conflict | SyncStatus::Local) {
            return DetectionResult::Ignored;
        }

        let changed = meta.server_version.as_deref() != Some(remote.server_version.as_str());
        if !changed {
            debug!(key = %meta.key, version = %remote.server_version, "Remote version unchanged");
            return DetectionResult::Unchanged;
        }

        if meta.is_dirty {
            info!(
                key = %meta.key,
                recorded = ?meta.server_version,
                remote = %remote.server_version,
                "Conflict detected: both local and remote versions changed"
            );
            DetectionResult::Conflicted
        } else {
            debug!(
                key = %meta.key,
                recorded = ?meta.server_version,
                remote = %remote.server_version,
                "Remote update"
            );
            DetectionResult::RemoteUpdate
        }
    }
}
