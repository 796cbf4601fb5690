//! Persistent sync queue
//!
//! [`SyncQueue`] is the only way mutations enter the queue. It pairs every
//! queue write with the entity's metadata write in one repository
//! transaction, so a crash never leaves a queued item without `pending`
//! metadata (or the reverse).
//!
//! Creation timestamps handed out by the queue are strictly increasing,
//! which keeps derived item ids unique even when two mutations of the same
//! entity land within the same clock tick.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use planwise_core::domain::{
    EntityKey, Operation, Payload, QueueItemId, SyncMetadata, SyncQueueItem, SyncStatus,
};
use planwise_core::ports::{Clock, EntityUpdate, ISyncStateRepository, MetadataUpdate, QueueChange};

use crate::metadata::MetadataStore;
use crate::SyncError;

#[derive(Clone)]
pub struct SyncQueue {
    repo: Arc<dyn ISyncStateRepository>,
    metadata: MetadataStore,
    clock: Arc<dyn Clock>,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl SyncQueue {
    pub fn new(
        repo: Arc<dyn ISyncStateRepository>,
        metadata: MetadataStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            metadata,
            clock,
            last_stamp: Arc::new(Mutex::new(None)),
        }
    }

    /// Next creation timestamp: the clock's time, bumped past the previous
    /// stamp when the clock has not moved
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let mut last = self.last_stamp.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    /// Records a local mutation
    ///
    /// Marks the entity's metadata dirty (creating it as `pending` on first
    /// sight) and appends a queue item, atomically. Entities in `conflict`
    /// stay in `conflict`; their items wait until the conflict is resolved.
    ///
    /// # Errors
    ///
    /// `SyncError::LocalOnly` for entities tracked as `local`, or a storage
    /// error when the transaction fails (nothing is written in that case).
    pub async fn enqueue(
        &self,
        key: &EntityKey,
        operation: Operation,
        payload: Payload,
        priority: i32,
    ) -> Result<SyncQueueItem, SyncError> {
        let created_at = self.next_stamp();
        let existing = self.metadata.get(key).await?;
        let previous = existing.as_ref().map(|m| m.status);

        if previous == Some(SyncStatus::Local) {
            return Err(SyncError::LocalOnly(key.to_string()));
        }

        let mut meta = existing.unwrap_or_else(|| SyncMetadata::new_pending(key.clone(), created_at));
        meta.mark_dirty(created_at);

        let item = SyncQueueItem::new(key, operation, payload, priority, created_at);
        self.repo.enqueue_with_metadata(&item, &meta).await?;
        self.metadata.notify(&meta, previous);

        debug!(
            id = %item.id,
            key = %key,
            operation = %operation,
            priority,
            "Mutation queued"
        );
        Ok(item)
    }

    /// Enqueues `payload` for an entity whose metadata was already updated
    /// by the caller (conflict resolution)
    pub async fn enqueue_resolved(
        &self,
        meta: &SyncMetadata,
        previous: Option<SyncStatus>,
        operation: Operation,
        payload: Payload,
        priority: i32,
    ) -> Result<SyncQueueItem> {
        let created_at = self.next_stamp();
        let item = SyncQueueItem::new(&meta.key, operation, payload, priority, created_at);
        self.repo.enqueue_with_metadata(&item, meta).await?;
        self.metadata.notify(meta, previous);
        Ok(item)
    }

    /// All items in drain order (priority, then creation time)
    pub async fn dequeue_all(&self) -> Result<Vec<SyncQueueItem>> {
        let mut items = self.repo.queue_items().await?;
        items.sort_by(SyncQueueItem::drain_order);
        Ok(items)
    }

    pub async fn remove(&self, id: &QueueItemId) -> Result<()> {
        self.repo.remove_queue_item(id).await
    }

    /// Applies `change` and rewrites the entity's metadata in one
    /// transaction
    ///
    /// `update` receives the metadata as stored at that point, so a
    /// mutation recorded while the item was in flight is never overwritten.
    pub async fn settle(
        &self,
        key: &EntityKey,
        change: QueueChange,
        update: &MetadataUpdate<'_>,
    ) -> Result<EntityUpdate> {
        let outcome = self.repo.update_entity(key, &change, update).await?;
        self.metadata.notify_update(key, &outcome);
        if let QueueChange::Requeue(item) = &change {
            info!(
                id = %item.id,
                retry_count = item.retry_count,
                "Queue item requeued with backoff"
            );
        }
        Ok(outcome)
    }

    /// Whether any mutation of `key` is still queued
    pub async fn has_items_for(&self, key: &EntityKey) -> Result<bool> {
        let items = self.repo.queue_items().await?;
        Ok(items
            .iter()
            .any(|i| i.data_type == key.data_type() && i.data_id == key.id()))
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.repo.queue_len().await
    }
}
