//! Queued mutations and their retry policy
//!
//! A [`SyncQueueItem`] is born when a domain entity is mutated locally and
//! dies once the remote store has accepted it, or once it runs out of
//! retries. Retries back off quadratically: an item that failed `n` times
//! waits `n² × base` before its next attempt.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{DataType, EntityKey, Payload, QueueItemId};

/// Default priority for queued mutations; lower values drain first
pub const DEFAULT_PRIORITY: i32 = 10;

// ============================================================================
// Operation
// ============================================================================

/// Kind of mutation carried by a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(DomainError::InvalidOperation(other.to_string())),
        }
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Retry ceiling and backoff base shared by every queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after which an item is dropped
    pub max_retries: u32,
    /// Base of the quadratic backoff
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Minimum wait before the next attempt of an item that failed
    /// `retry_count` times
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = i32::try_from(retry_count.saturating_mul(retry_count)).unwrap_or(i32::MAX);
        self.backoff_base * factor
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::minutes(5),
        }
    }
}

// ============================================================================
// SyncQueueItem
// ============================================================================

/// One pending mutation awaiting transmission to the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    pub operation: Operation,
    pub data_type: DataType,
    pub data_id: String,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    /// Lower drains first
    pub priority: i32,
    pub retry_count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
}

impl SyncQueueItem {
    /// Creates a fresh item for `key`, deriving its id from the creation time
    pub fn new(
        key: &EntityKey,
        operation: Operation,
        payload: Payload,
        priority: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QueueItemId::derive(key, operation.as_str(), created_at),
            operation,
            data_type: key.data_type(),
            data_id: key.id().to_string(),
            payload,
            created_at,
            priority,
            retry_count: 0,
            last_attempt: None,
        }
    }

    /// Key of the entity this item mutates
    pub fn entity_key(&self) -> Result<EntityKey, DomainError> {
        EntityKey::new(self.data_type, self.data_id.clone())
    }

    /// Whether the item may be attempted at `now`
    ///
    /// True only while under the retry ceiling and once the backoff window
    /// since the last attempt has elapsed. Never-attempted items are always
    /// eligible.
    pub fn should_retry(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> bool {
        if self.retry_count >= policy.max_retries {
            return false;
        }
        match self.last_attempt {
            None => true,
            Some(last) => now - last >= policy.backoff_for(self.retry_count),
        }
    }

    /// Copy of this item after one more failed attempt at `now`
    pub fn requeue_with_backoff(&self, now: DateTime<Utc>) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            last_attempt: Some(now),
            ..self.clone()
        }
    }

    /// Drain order: priority ascending, then creation time ascending
    pub fn drain_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }
}
