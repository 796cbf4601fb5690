//! Sync metadata store
//!
//! Thin facade over the metadata half of [`ISyncStateRepository`]. Writes
//! that go through [`MetadataStore::put`] publish a `StatusChanged` event
//! when the stored status actually changes.

use std::sync::Arc;

use anyhow::Result;
use planwise_core::domain::{EntityKey, SyncMetadata, SyncStatus};
use planwise_core::ports::{
    EntityUpdate, ISyncStateRepository, MetadataUpdate, MetadataWrite, QueueChange,
};

use crate::events::EventBus;

#[derive(Clone)]
pub struct MetadataStore {
    repo: Arc<dyn ISyncStateRepository>,
    events: EventBus,
}

impl MetadataStore {
    pub fn new(repo: Arc<dyn ISyncStateRepository>, events: EventBus) -> Self {
        Self { repo, events }
    }

    pub async fn get(&self, key: &EntityKey) -> Result<Option<SyncMetadata>> {
        self.repo.get_metadata(key).await
    }

    /// Upserts `meta`; `previous` is the status it had before the change
    pub async fn put(&self, meta: &SyncMetadata, previous: Option<SyncStatus>) -> Result<()> {
        self.repo.save_metadata(meta).await?;
        self.notify(meta, previous);
        Ok(())
    }

    /// Rewrites metadata from its stored state in one transaction
    pub async fn update(&self, key: &EntityKey, update: &MetadataUpdate<'_>) -> Result<EntityUpdate> {
        let outcome = self.repo.update_entity(key, &QueueChange::Keep, update).await?;
        self.notify_update(key, &outcome);
        Ok(outcome)
    }

    pub async fn all(&self) -> Result<Vec<SyncMetadata>> {
        self.repo.all_metadata().await
    }

    pub async fn all_dirty(&self) -> Result<Vec<SyncMetadata>> {
        self.repo.dirty_metadata().await
    }

    pub async fn all_with_status(&self, status: SyncStatus) -> Result<Vec<SyncMetadata>> {
        self.repo.metadata_with_status(status).await
    }

    /// Publishes a status change for a write made elsewhere (e.g. inside a
    /// queue transaction)
    pub fn notify(&self, meta: &SyncMetadata, previous: Option<SyncStatus>) {
        self.events.status_changed(&meta.key, previous, meta.status);
    }

    pub fn notify_update(&self, key: &EntityKey, outcome: &EntityUpdate) {
        match &outcome.write {
            MetadataWrite::Save(meta) => self.notify(meta, outcome.previous),
            MetadataWrite::Delete => {
                tracing::debug!(key = %key, "Sync metadata removed")
            }
            MetadataWrite::Keep => {}
        }
    }
}
