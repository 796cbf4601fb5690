//! Sync state repository port (driven/secondary port)
//!
//! Durable storage for the two maps the engine owns: sync metadata keyed by
//! `dataType_id` and queued mutations keyed by queue item id, plus a small
//! key/value area for engine bookkeeping.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific and
//!   don't need domain-level classification.
//! - The compound writes (`enqueue_with_metadata`, `update_entity`) must be
//!   atomic: a crash may never leave a queue item without dirty metadata,
//!   nor a removed item whose metadata still says `pending`.
//! - `update_entity` computes the metadata write from the state stored
//!   inside its transaction, never from a copy the caller read before an
//!   await. A mutation recorded while a request was in flight is therefore
//!   seen by the write that settles that request.
//! - An implementation is scoped to a single user.

use crate::domain::{EntityKey, QueueItemId, SyncMetadata, SyncQueueItem, SyncStatus};

/// Key under which the last completed pass time is stored
pub const LAST_SYNC_COMPLETED_KEY: &str = "last_sync_completed";

/// Queue side of an [`ISyncStateRepository::update_entity`] transaction
#[derive(Debug, Clone, PartialEq)]
pub enum QueueChange {
    /// Leave the queue untouched
    Keep,
    /// Remove one delivered or dropped item
    Remove(QueueItemId),
    /// Replace an item with its requeued copy
    Requeue(SyncQueueItem),
    /// Remove every queued item of the entity
    RemoveAllForEntity,
}

/// Metadata side of an [`ISyncStateRepository::update_entity`] transaction
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataWrite {
    Keep,
    Save(SyncMetadata),
    Delete,
}

/// Outcome of an [`ISyncStateRepository::update_entity`] transaction
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    /// Status stored before the transaction
    pub previous: Option<SyncStatus>,
    /// What was written
    pub write: MetadataWrite,
}

/// Computes a metadata write from the entity's stored metadata and the
/// number of its items still queued after the queue change
pub type MetadataUpdate<'a> =
    dyn Fn(Option<SyncMetadata>, u64) -> anyhow::Result<MetadataWrite> + Send + Sync + 'a;

#[async_trait::async_trait]
pub trait ISyncStateRepository: Send + Sync {
    // ------------------------------------------------------------------
    // Sync metadata
    // ------------------------------------------------------------------

    /// Returns the metadata of one entity
    async fn get_metadata(&self, key: &EntityKey) -> anyhow::Result<Option<SyncMetadata>>;

    /// Inserts or replaces metadata
    async fn save_metadata(&self, metadata: &SyncMetadata) -> anyhow::Result<()>;

    /// Returns every tracked entity
    async fn all_metadata(&self) -> anyhow::Result<Vec<SyncMetadata>>;

    /// Returns entities whose local state diverged from the remote
    async fn dirty_metadata(&self) -> anyhow::Result<Vec<SyncMetadata>>;

    /// Returns entities currently in `status`
    async fn metadata_with_status(&self, status: SyncStatus) -> anyhow::Result<Vec<SyncMetadata>>;

    // ------------------------------------------------------------------
    // Sync queue
    // ------------------------------------------------------------------

    /// Appends a queue item and upserts the entity's metadata in one
    /// transaction
    async fn enqueue_with_metadata(
        &self,
        item: &SyncQueueItem,
        metadata: &SyncMetadata,
    ) -> anyhow::Result<()>;

    /// Inserts or replaces a queue item (used for backoff requeues)
    async fn save_queue_item(&self, item: &SyncQueueItem) -> anyhow::Result<()>;

    /// Returns all queue items ordered by priority, then creation time
    async fn queue_items(&self) -> anyhow::Result<Vec<SyncQueueItem>>;

    /// Removes one queue item
    async fn remove_queue_item(&self, id: &QueueItemId) -> anyhow::Result<()>;

    /// Applies `change` to the queue, then reads the entity's metadata and
    /// remaining item count and applies the write `update` computes from
    /// them, all in one transaction
    ///
    /// Nothing is written when `update` fails. Metadata is only ever
    /// deleted through this method, for delivered entity deletions.
    async fn update_entity(
        &self,
        key: &EntityKey,
        change: &QueueChange,
        update: &MetadataUpdate<'_>,
    ) -> anyhow::Result<EntityUpdate>;

    /// Number of queued mutations
    async fn queue_len(&self) -> anyhow::Result<u64>;

    // ------------------------------------------------------------------
    // Engine bookkeeping
    // ------------------------------------------------------------------

    async fn get_state(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set_state(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Deletes all metadata, queue items and bookkeeping for this user
    async fn clear_all(&self) -> anyhow::Result<()>;
}
