//! Caller-facing sync API
//!
//! [`SyncService`] is what the app talks to: it records mutations, runs
//! passes on request, reports status and resolves conflicts. It holds no
//! state of its own beyond the engine and an optional scheduler handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use planwise_conflict::{ConflictResolver, ResolutionPlan};
use planwise_core::domain::{
    ConflictItem, ConflictResolution, DataType, EntityKey, Operation, PassResult, Payload,
    SyncMetadata, SyncQueueItem, SyncStatus,
};

use planwise_core::ports::{MetadataWrite, QueueChange};

use crate::engine::{PassOptions, ReconciliationEngine};
use crate::events::SyncEvent;
use crate::scheduler::SchedulerHandle;
use crate::SyncError;

/// Snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub pending: u64,
    pub conflicts: usize,
    pub errors: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub online: bool,
    pub quality: u8,
    pub connectivity: String,
    pub pass_running: bool,
}

pub struct SyncService {
    engine: Arc<ReconciliationEngine>,
    scheduler: Option<SchedulerHandle>,
    default_priority: i32,
}

impl SyncService {
    pub fn new(engine: Arc<ReconciliationEngine>, default_priority: i32) -> Self {
        Self {
            engine,
            scheduler: None,
            default_priority,
        }
    }

    /// Lets queued mutations wake the scheduler
    pub fn with_scheduler(mut self, handle: SchedulerHandle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Records a local mutation for later upload
    ///
    /// The caller has already written the change to the local store. A
    /// `None` priority uses the configured default; lower drains first.
    pub async fn enqueue_mutation(
        &self,
        data_type: DataType,
        id: &str,
        operation: Operation,
        payload: Payload,
        priority: Option<i32>,
    ) -> Result<SyncQueueItem, SyncError> {
        let key = EntityKey::new(data_type, id)?;
        let item = self
            .engine
            .queue()
            .enqueue(&key, operation, payload, priority.unwrap_or(self.default_priority))
            .await?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.notify_mutation();
        }
        Ok(item)
    }

    /// Marks an entity as device-only; it is never queued or pulled
    pub async fn track_local(&self, data_type: DataType, id: &str) -> Result<(), SyncError> {
        let key = EntityKey::new(data_type, id)?;
        let metadata = self.engine.metadata();
        let previous = metadata.get(&key).await?.map(|m| m.status);
        let meta = SyncMetadata::new_local(key, self.engine.clock().now());
        metadata.put(&meta, previous).await?;
        Ok(())
    }

    /// Runs a pass now; `force` only requires being online
    pub async fn request_sync(&self, force: bool) -> Result<PassResult, SyncError> {
        self.engine
            .run_pass(PassOptions {
                force,
                full_refresh: false,
            })
            .await
    }

    /// Runs a pass that also adopts remote entities unknown to this device
    pub async fn request_full_refresh(&self) -> Result<PassResult, SyncError> {
        self.engine.run_pass(PassOptions::full_refresh()).await
    }

    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        Ok(self.engine.queue().pending_count().await?)
    }

    pub async fn conflict_items(&self) -> Result<Vec<ConflictItem>, SyncError> {
        let conflicted = self
            .engine
            .metadata()
            .all_with_status(SyncStatus::Conflict)
            .await?;
        Ok(conflicted.iter().filter_map(ConflictItem::from_metadata).collect())
    }

    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.engine.last_sync_time().await?)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.engine.events().subscribe()
    }

    pub async fn summary(&self) -> Result<SyncSummary, SyncError> {
        let metadata = self.engine.metadata();
        let conflicts = metadata.all_with_status(SyncStatus::Conflict).await?.len();
        let errors = metadata.all_with_status(SyncStatus::Error).await?.len();
        let connectivity = self.engine.connectivity().state();
        Ok(SyncSummary {
            pending: self.pending_count().await?,
            conflicts,
            errors,
            last_sync: self.last_sync_time().await?,
            online: connectivity.online,
            quality: connectivity.quality,
            connectivity: connectivity.describe(),
            pass_running: self.engine.is_running(),
        })
    }

    /// Applies a caller-chosen resolution to a conflicted entity
    ///
    /// # Errors
    ///
    /// `SyncError::ConflictNotFound` when the entity is not in `conflict`;
    /// `SyncError::Conflict` when `UseLocal` finds neither a local snapshot
    /// nor queued mutations to push.
    pub async fn resolve_conflict(
        &self,
        data_type: DataType,
        id: &str,
        resolution: ConflictResolution,
    ) -> Result<(), SyncError> {
        let key = EntityKey::new(data_type, id)?;
        let metadata = self.engine.metadata();
        let meta = match metadata.get(&key).await? {
            Some(meta) if meta.status == SyncStatus::Conflict => meta,
            _ => return Err(SyncError::ConflictNotFound(key.to_string())),
        };

        let local = self.engine.local();
        let snapshot = match resolution {
            ConflictResolution::UseLocal => local.snapshot(data_type, id).await?,
            _ => None,
        };
        let has_queued = self.engine.queue().has_items_for(&key).await?;
        let strategy = resolution.name();
        let previous = Some(meta.status);

        let plan = ConflictResolver::plan(
            &meta,
            resolution,
            snapshot,
            has_queued,
            self.engine.clock().now(),
        )?;

        match plan {
            ResolutionPlan::Keep => return Ok(()),
            ResolutionPlan::Push {
                metadata: resolved,
                operation,
                payload,
                apply_locally,
            } => {
                if let Some(merged) = apply_locally {
                    local.apply_remote(data_type, id, &merged).await?;
                }
                self.engine
                    .queue()
                    .enqueue_resolved(&resolved, previous, operation, payload, self.default_priority)
                    .await?;
                if let Some(scheduler) = &self.scheduler {
                    scheduler.notify_mutation();
                }
            }
            ResolutionPlan::Release { metadata: resolved } => {
                metadata.put(&resolved, previous).await?;
                if let Some(scheduler) = &self.scheduler {
                    scheduler.notify_mutation();
                }
            }
            ResolutionPlan::Adopt {
                metadata: resolved,
                payload,
            } => {
                local.apply_remote(data_type, id, &payload).await?;
                // Rolled back as a whole if the entity left conflict meanwhile
                self.engine
                    .queue()
                    .settle(&key, QueueChange::RemoveAllForEntity, &|current, _| {
                        match current {
                            Some(meta) if meta.status == SyncStatus::Conflict => {
                                Ok(MetadataWrite::Save(resolved.clone()))
                            }
                            _ => anyhow::bail!("{} is no longer in conflict", key),
                        }
                    })
                    .await?;
                info!(key = %key, "Local mutations discarded in favor of remote");
            }
        }

        info!(key = %key, strategy, "Conflict resolved");
        Ok(())
    }

    /// Wipes all sync state of the current user (e.g. on sign-out)
    pub async fn clear_all_sync_state(&self) -> Result<(), SyncError> {
        self.engine.clear_all().await
    }
}
