//! Per-entity synchronization metadata
//!
//! [`SyncMetadata`] records where an entity stands relative to the remote
//! store. All status changes go through the transition helpers on this type,
//! which keep the record's invariants:
//!
//! - `synced` implies `is_dirty == false` and `conflict_data == None`
//! - `conflict` implies `conflict_data.is_some()`
//! - `retry_count` resets to 0 on every successful sync
//! - nothing but an explicit resolution leaves `conflict`

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{EntityKey, Payload};

// ============================================================================
// SyncStatus
// ============================================================================

/// Synchronization status of a single entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree
    Synced,
    /// Local changes waiting to be sent
    #[default]
    Pending,
    /// Local and remote diverged; waiting for an explicit resolution
    Conflict,
    /// The last attempt failed
    Error,
    /// Never intended for remote sync
    Local,
}

impl SyncStatus {
    /// Returns the stable storage name of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
            SyncStatus::Local => "local",
        }
    }

    /// Returns true for the two states a user should look at
    pub fn needs_attention(&self) -> bool {
        matches!(self, SyncStatus::Conflict | SyncStatus::Error)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "conflict" => Ok(SyncStatus::Conflict),
            "error" => Ok(SyncStatus::Error),
            "local" => Ok(SyncStatus::Local),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SyncMetadata
// ============================================================================

/// Durable sync record for one `(data_type, id)` entity
///
/// Fields are public for storage adapters; status changes must go through
/// the `mark_*` and `resolve_*` helpers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Identity of the entity
    pub key: EntityKey,
    /// Current status
    pub status: SyncStatus,
    /// Time of the last local mutation
    pub last_modified: DateTime<Utc>,
    /// Time of the last sync attempt, successful or not
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// Time of the last successful sync
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Opaque remote version token
    pub server_version: Option<String>,
    /// Consecutive failed attempts since the last success
    pub retry_count: u32,
    /// Message of the last failure
    pub error_message: Option<String>,
    /// Remote payload captured at conflict detection
    pub conflict_data: Option<Payload>,
    /// True when local state diverged from the last successful sync
    pub is_dirty: bool,
}

impl SyncMetadata {
    /// Metadata for an entity's first local mutation (`pending`, dirty)
    pub fn new_pending(key: EntityKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: SyncStatus::Pending,
            last_modified: now,
            last_sync_attempt: None,
            last_successful_sync: None,
            server_version: None,
            retry_count: 0,
            error_message: None,
            conflict_data: None,
            is_dirty: true,
        }
    }

    /// Metadata for an entity that is kept on this device only
    pub fn new_local(key: EntityKey, now: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Local,
            is_dirty: false,
            ..Self::new_pending(key, now)
        }
    }

    /// Metadata for an entity first seen on the remote store
    pub fn discovered(key: EntityKey, server_version: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: SyncStatus::Synced,
            is_dirty: false,
            server_version: Some(server_version.into()),
            last_sync_attempt: Some(now),
            last_successful_sync: Some(now),
            ..Self::new_pending(key, now)
        }
    }

    fn invalid(&self, to: SyncStatus) -> DomainError {
        DomainError::InvalidState {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Records a local mutation
    ///
    /// Moves to `pending` and clears the last error. An entity in `conflict`
    /// stays in `conflict` (only flagged dirty) until it is resolved.
    pub fn mark_dirty(&mut self, now: DateTime<Utc>) {
        self.is_dirty = true;
        self.last_modified = now;
        if self.status != SyncStatus::Conflict {
            self.status = SyncStatus::Pending;
            self.error_message = None;
        }
    }

    /// Records a successful sync
    ///
    /// `server_version` replaces the stored token when present; a remote that
    /// does not report versions keeps the previous one.
    pub fn mark_synced(
        &mut self,
        server_version: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status == SyncStatus::Conflict {
            return Err(self.invalid(SyncStatus::Synced));
        }
        self.status = SyncStatus::Synced;
        self.is_dirty = false;
        self.retry_count = 0;
        self.error_message = None;
        self.conflict_data = None;
        if server_version.is_some() {
            self.server_version = server_version;
        }
        self.last_sync_attempt = Some(now);
        self.last_successful_sync = Some(now);
        Ok(())
    }

    /// Records a failed attempt
    pub fn mark_sync_error(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status == SyncStatus::Conflict {
            return Err(self.invalid(SyncStatus::Error));
        }
        self.status = SyncStatus::Error;
        self.retry_count += 1;
        self.error_message = Some(message.into());
        self.last_sync_attempt = Some(now);
        Ok(())
    }

    /// Records a detected divergence, keeping the remote payload
    pub fn mark_conflict(
        &mut self,
        remote_payload: Payload,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status == SyncStatus::Conflict {
            return Err(self.invalid(SyncStatus::Conflict));
        }
        self.status = SyncStatus::Conflict;
        self.conflict_data = Some(remote_payload);
        self.last_sync_attempt = Some(now);
        Ok(())
    }

    /// Resolves a conflict in favor of local state: back to `pending`
    pub fn resolve_pending(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != SyncStatus::Conflict {
            return Err(self.invalid(SyncStatus::Pending));
        }
        self.status = SyncStatus::Pending;
        self.conflict_data = None;
        self.error_message = None;
        self.retry_count = 0;
        self.is_dirty = true;
        self.last_modified = now;
        Ok(())
    }

    /// Resolves a conflict by adopting the captured remote payload
    ///
    /// Returns the payload the local store must now hold.
    pub fn resolve_with_server(
        &mut self,
        server_version: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Payload, DomainError> {
        if self.status != SyncStatus::Conflict {
            return Err(self.invalid(SyncStatus::Synced));
        }
        let payload = self.conflict_data.take().unwrap_or_default();
        self.status = SyncStatus::Synced;
        self.is_dirty = false;
        self.retry_count = 0;
        self.error_message = None;
        if server_version.is_some() {
            self.server_version = server_version;
        }
        self.last_sync_attempt = Some(now);
        self.last_successful_sync = Some(now);
        Ok(payload)
    }
}
