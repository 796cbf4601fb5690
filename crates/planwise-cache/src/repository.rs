//! SQLite implementation of ISyncStateRepository
//!
//! Concrete SQLite-backed storage for the two durable maps of the sync
//! engine. Every query is scoped to the repository's user.
//!
//! ## Type Mapping
//!
//! | Domain Type         | SQL Type | Strategy                                        |
//! |---------------------|----------|-------------------------------------------------|
//! | EntityKey           | TEXT     | `dataType_id` key plus split `data_type`/`entity_id` columns |
//! | QueueItemId         | TEXT     | String via `.as_str()` / `QueueItemId::new()`   |
//! | DataType, Operation | TEXT     | `.as_str()` / `FromStr`                          |
//! | SyncStatus          | TEXT     | `.as_str()` / `FromStr`                          |
//! | DateTime<Utc>       | TEXT     | RFC 3339 with fixed microsecond precision       |
//! | Payload             | TEXT     | serde_json object                               |
//! | bool                | INTEGER  | 0 / 1                                           |

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use planwise_core::domain::{
    DataType, EntityKey, Operation, Payload, QueueItemId, SyncMetadata, SyncQueueItem, SyncStatus,
    UserId,
};
use planwise_core::ports::{
    EntityUpdate, ISyncStateRepository, MetadataUpdate, MetadataWrite, QueueChange,
};

use crate::CacheError;

/// SQLite-based implementation of the sync state repository port
pub struct SqliteSyncRepository {
    pool: SqlitePool,
    user_id: UserId,
}

impl SqliteSyncRepository {
    /// Creates a repository for `user_id` on the given connection pool
    pub fn new(pool: SqlitePool, user_id: UserId) -> Self {
        Self { pool, user_id }
    }

    /// Returns the user this repository is scoped to
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    fn user(&self) -> &str {
        self.user_id.as_str()
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Formats timestamps with a fixed width so that TEXT ordering matches time
/// ordering
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e)))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    s.as_deref().map(parse_datetime).transpose()
}

fn payload_to_string(payload: &Payload) -> Result<String, CacheError> {
    serde_json::to_string(payload)
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize payload: {}", e)))
}

fn payload_from_str(s: &str) -> Result<Payload, CacheError> {
    serde_json::from_str(s)
        .map_err(|e| CacheError::SerializationError(format!("Failed to parse payload: {}", e)))
}

fn domain_err(e: planwise_core::domain::DomainError) -> CacheError {
    CacheError::SerializationError(e.to_string())
}

fn count_to_u32(value: i64, column: &str) -> Result<u32, CacheError> {
    u32::try_from(value)
        .map_err(|_| CacheError::SerializationError(format!("{} out of range: {}", column, value)))
}

// ============================================================================
// Row types
// ============================================================================

/// Owned, storage-ready form of a SyncMetadata record
struct MetadataRow {
    key: String,
    data_type: &'static str,
    entity_id: String,
    status: &'static str,
    last_modified: String,
    last_sync_attempt: Option<String>,
    last_successful_sync: Option<String>,
    server_version: Option<String>,
    retry_count: i64,
    error_message: Option<String>,
    conflict_data: Option<String>,
    is_dirty: bool,
}

impl MetadataRow {
    fn from_domain(meta: &SyncMetadata) -> Result<Self, CacheError> {
        Ok(Self {
            key: meta.key.storage_key(),
            data_type: meta.key.data_type().as_str(),
            entity_id: meta.key.id().to_string(),
            status: meta.status.as_str(),
            last_modified: format_datetime(&meta.last_modified),
            last_sync_attempt: meta.last_sync_attempt.as_ref().map(format_datetime),
            last_successful_sync: meta.last_successful_sync.as_ref().map(format_datetime),
            server_version: meta.server_version.clone(),
            retry_count: i64::from(meta.retry_count),
            error_message: meta.error_message.clone(),
            conflict_data: meta.conflict_data.as_ref().map(payload_to_string).transpose()?,
            is_dirty: meta.is_dirty,
        })
    }

    fn upsert<'q>(&'q self, user: &'q str) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata \
             (user_id, key, data_type, entity_id, status, last_modified, \
              last_sync_attempt, last_successful_sync, server_version, \
              retry_count, error_message, conflict_data, is_dirty) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind(&self.key)
        .bind(self.data_type)
        .bind(&self.entity_id)
        .bind(self.status)
        .bind(&self.last_modified)
        .bind(&self.last_sync_attempt)
        .bind(&self.last_successful_sync)
        .bind(&self.server_version)
        .bind(self.retry_count)
        .bind(&self.error_message)
        .bind(&self.conflict_data)
        .bind(self.is_dirty)
    }
}

fn metadata_from_row(row: &SqliteRow) -> Result<SyncMetadata, CacheError> {
    let data_type: String = row.get("data_type");
    let entity_id: String = row.get("entity_id");
    let status: String = row.get("status");
    let last_modified: String = row.get("last_modified");
    let conflict_data: Option<String> = row.get("conflict_data");
    let retry_count: i64 = row.get("retry_count");

    let data_type: DataType = data_type.parse().map_err(domain_err)?;
    Ok(SyncMetadata {
        key: EntityKey::new(data_type, entity_id).map_err(domain_err)?,
        status: status.parse::<SyncStatus>().map_err(domain_err)?,
        last_modified: parse_datetime(&last_modified)?,
        last_sync_attempt: parse_optional_datetime(row.get("last_sync_attempt"))?,
        last_successful_sync: parse_optional_datetime(row.get("last_successful_sync"))?,
        server_version: row.get("server_version"),
        retry_count: count_to_u32(retry_count, "retry_count")?,
        error_message: row.get("error_message"),
        conflict_data: conflict_data.as_deref().map(payload_from_str).transpose()?,
        is_dirty: row.get("is_dirty"),
    })
}

/// Owned, storage-ready form of a SyncQueueItem
struct QueueRow {
    id: String,
    operation: &'static str,
    data_type: &'static str,
    data_id: String,
    payload: String,
    created_at: String,
    priority: i32,
    retry_count: i64,
    last_attempt: Option<String>,
}

impl QueueRow {
    fn from_domain(item: &SyncQueueItem) -> Result<Self, CacheError> {
        Ok(Self {
            id: item.id.as_str().to_string(),
            operation: item.operation.as_str(),
            data_type: item.data_type.as_str(),
            data_id: item.data_id.clone(),
            payload: payload_to_string(&item.payload)?,
            created_at: format_datetime(&item.created_at),
            priority: item.priority,
            retry_count: i64::from(item.retry_count),
            last_attempt: item.last_attempt.as_ref().map(format_datetime),
        })
    }

    fn upsert<'q>(&'q self, user: &'q str) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_queue \
             (user_id, id, operation, data_type, data_id, payload, \
              created_at, priority, retry_count, last_attempt) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user)
        .bind(&self.id)
        .bind(self.operation)
        .bind(self.data_type)
        .bind(&self.data_id)
        .bind(&self.payload)
        .bind(&self.created_at)
        .bind(self.priority)
        .bind(self.retry_count)
        .bind(&self.last_attempt)
    }
}

fn queue_item_from_row(row: &SqliteRow) -> Result<SyncQueueItem, CacheError> {
    let id: String = row.get("id");
    let operation: String = row.get("operation");
    let data_type: String = row.get("data_type");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");
    let retry_count: i64 = row.get("retry_count");

    Ok(SyncQueueItem {
        id: QueueItemId::new(id).map_err(domain_err)?,
        operation: operation.parse::<Operation>().map_err(domain_err)?,
        data_type: data_type.parse::<DataType>().map_err(domain_err)?,
        data_id: row.get("data_id"),
        payload: payload_from_str(&payload)?,
        created_at: parse_datetime(&created_at)?,
        priority: row.get("priority"),
        retry_count: count_to_u32(retry_count, "retry_count")?,
        last_attempt: parse_optional_datetime(row.get("last_attempt"))?,
    })
}

fn collect_metadata(rows: &[SqliteRow]) -> Result<Vec<SyncMetadata>, CacheError> {
    rows.iter().map(metadata_from_row).collect()
}

// ============================================================================
// ISyncStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl ISyncStateRepository for SqliteSyncRepository {
    async fn get_metadata(&self, key: &EntityKey) -> anyhow::Result<Option<SyncMetadata>> {
        let row = sqlx::query("SELECT * FROM sync_metadata WHERE user_id = ? AND key = ?")
            .bind(self.user())
            .bind(key.storage_key())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(metadata_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn save_metadata(&self, metadata: &SyncMetadata) -> anyhow::Result<()> {
        let row = MetadataRow::from_domain(metadata)?;
        row.upsert(self.user()).execute(&self.pool).await?;
        tracing::trace!(key = %metadata.key, status = %metadata.status, "Saved sync metadata");
        Ok(())
    }

    async fn all_metadata(&self) -> anyhow::Result<Vec<SyncMetadata>> {
        let rows = sqlx::query("SELECT * FROM sync_metadata WHERE user_id = ? ORDER BY key")
            .bind(self.user())
            .fetch_all(&self.pool)
            .await?;
        Ok(collect_metadata(&rows)?)
    }

    async fn dirty_metadata(&self) -> anyhow::Result<Vec<SyncMetadata>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_metadata WHERE user_id = ? AND is_dirty = 1 ORDER BY key",
        )
        .bind(self.user())
        .fetch_all(&self.pool)
        .await?;
        Ok(collect_metadata(&rows)?)
    }

    async fn metadata_with_status(&self, status: SyncStatus) -> anyhow::Result<Vec<SyncMetadata>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_metadata WHERE user_id = ? AND status = ? ORDER BY key",
        )
        .bind(self.user())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(collect_metadata(&rows)?)
    }

    async fn enqueue_with_metadata(
        &self,
        item: &SyncQueueItem,
        metadata: &SyncMetadata,
    ) -> anyhow::Result<()> {
        let queue_row = QueueRow::from_domain(item)?;
        let meta_row = MetadataRow::from_domain(metadata)?;

        let mut tx = self.pool.begin().await?;
        queue_row.upsert(self.user()).execute(&mut *tx).await?;
        meta_row.upsert(self.user()).execute(&mut *tx).await?;
        tx.commit().await?;

        tracing::trace!(item_id = %item.id, key = %metadata.key, "Enqueued mutation");
        Ok(())
    }

    async fn save_queue_item(&self, item: &SyncQueueItem) -> anyhow::Result<()> {
        let row = QueueRow::from_domain(item)?;
        row.upsert(self.user()).execute(&self.pool).await?;
        tracing::trace!(item_id = %item.id, retry_count = item.retry_count, "Saved queue item");
        Ok(())
    }

    async fn queue_items(&self) -> anyhow::Result<Vec<SyncQueueItem>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_queue WHERE user_id = ? \
             ORDER BY priority ASC, created_at ASC, id ASC",
        )
        .bind(self.user())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(queue_item_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn remove_queue_item(&self, id: &QueueItemId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE user_id = ? AND id = ?")
            .bind(self.user())
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        tracing::trace!(item_id = %id, "Removed queue item");
        Ok(())
    }

    async fn update_entity(
        &self,
        key: &EntityKey,
        change: &QueueChange,
        update: &MetadataUpdate<'_>,
    ) -> anyhow::Result<EntityUpdate> {
        let mut tx = self.pool.begin().await?;

        // Queue writes come first so the transaction holds the write lock
        // before it reads
        match change {
            QueueChange::Keep => {}
            QueueChange::Remove(id) => {
                sqlx::query("DELETE FROM sync_queue WHERE user_id = ? AND id = ?")
                    .bind(self.user())
                    .bind(id.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
            QueueChange::Requeue(item) => {
                let row = QueueRow::from_domain(item)?;
                row.upsert(self.user()).execute(&mut *tx).await?;
            }
            QueueChange::RemoveAllForEntity => {
                sqlx::query(
                    "DELETE FROM sync_queue WHERE user_id = ? AND data_type = ? AND data_id = ?",
                )
                .bind(self.user())
                .bind(key.data_type().as_str())
                .bind(key.id())
                .execute(&mut *tx)
                .await?;
            }
        }

        let current = sqlx::query("SELECT * FROM sync_metadata WHERE user_id = ? AND key = ?")
            .bind(self.user())
            .bind(key.storage_key())
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(metadata_from_row)
            .transpose()?;
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sync_queue WHERE user_id = ? AND data_type = ? AND data_id = ?",
        )
        .bind(self.user())
        .bind(key.data_type().as_str())
        .bind(key.id())
        .fetch_one(&mut *tx)
        .await?;

        let previous = current.as_ref().map(|m| m.status);
        let write = update(current, u64::try_from(remaining).unwrap_or(0))?;
        match &write {
            MetadataWrite::Keep => {}
            MetadataWrite::Save(meta) => {
                let row = MetadataRow::from_domain(meta)?;
                row.upsert(self.user()).execute(&mut *tx).await?;
            }
            MetadataWrite::Delete => {
                sqlx::query("DELETE FROM sync_metadata WHERE user_id = ? AND key = ?")
                    .bind(self.user())
                    .bind(key.storage_key())
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        tracing::trace!(key = %key, ?change, remaining, "Updated entity");
        Ok(EntityUpdate { previous, write })
    }

    async fn queue_len(&self) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE user_id = ?")
            .bind(self.user())
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn get_state(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM sync_state WHERE user_id = ? AND key = ?")
                .bind(self.user())
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn set_state(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_state (user_id, key, value, updated_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(self.user())
        .bind(key)
        .bind(value)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["sync_queue", "sync_metadata", "sync_state"] {
            sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table))
                .bind(self.user())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::info!(user_id = %self.user_id, "Cleared all sync state");
        Ok(())
    }
}
