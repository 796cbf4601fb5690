//! Conflict resolution planning
//!
//! Turns a caller's [`ConflictResolution`] into the metadata change and the
//! side effects the engine must perform:
//! - `UseLocal`: re-enqueue the local snapshot, back to `pending`
//! - `UseServer`: write the captured remote payload locally, mark `synced`
//! - `Merge`: write and enqueue the caller's merged payload, back to `pending`
//! - `AskUser`: nothing changes

use chrono::{DateTime, Utc};
use tracing::info;

use planwise_core::domain::{ConflictResolution, Operation, Payload, SyncMetadata, SyncStatus};

use crate::error::ConflictError;

/// What the engine must do to carry out a resolution
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionPlan {
    /// Leave the conflict as it is
    Keep,
    /// Enqueue `payload` and persist `metadata` atomically; when
    /// `apply_locally` is set, write it to the local store first
    Push {
        metadata: SyncMetadata,
        operation: Operation,
        payload: Payload,
        apply_locally: Option<Payload>,
    },
    /// Back to `pending` relying on mutations already in the queue
    Release { metadata: SyncMetadata },
    /// Write `payload` to the local store, drop queued mutations of the
    /// entity and persist `metadata`
    Adopt {
        metadata: SyncMetadata,
        payload: Payload,
    },
}

/// Plans conflict resolutions
pub struct ConflictResolver;

impl ConflictResolver {
    /// Plans `resolution` for conflicted `meta`
    ///
    /// `local_snapshot` is the entity's current local state, if any.
    /// `has_queued` tells whether mutations for the entity are still queued,
    /// which lets `UseLocal` proceed without a snapshot.
    pub fn plan(
        meta: &SyncMetadata,
        resolution: ConflictResolution,
        local_snapshot: Option<Payload>,
        has_queued: bool,
        now: DateTime<Utc>,
    ) -> Result<ResolutionPlan, ConflictError> {
        if meta.status != SyncStatus::Conflict {
            return Err(ConflictError::NotConflicted(meta.key.to_string()));
        }

        info!(
            key = %meta.key,
            strategy = resolution.name(),
            "Planning conflict resolution"
        );

        let mut metadata = meta.clone();
        match resolution {
            ConflictResolution::AskUser => Ok(ResolutionPlan::Keep),
            ConflictResolution::UseLocal => match local_snapshot {
                Some(payload) => {
                    metadata.resolve_pending(now)?;
                    Ok(ResolutionPlan::Push {
                        metadata,
                        operation: Operation::Update,
                        payload,
                        apply_locally: None,
                    })
                }
                None if has_queued => {
                    metadata.resolve_pending(now)?;
                    Ok(ResolutionPlan::Release { metadata })
                }
                None => Err(ConflictError::NoLocalState(meta.key.to_string())),
            },
            ConflictResolution::Merge(merged) => {
                metadata.resolve_pending(now)?;
                Ok(ResolutionPlan::Push {
                    metadata,
                    operation: Operation::Update,
                    payload: merged.clone(),
                    apply_locally: Some(merged),
                })
            }
            ConflictResolution::UseServer => {
                let payload = metadata.resolve_with_server(None, now)?;
                Ok(ResolutionPlan::Adopt { metadata, payload })
            }
        }
    }
}
