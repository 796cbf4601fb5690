//! Conflict resolution directives
//!
//! Conflicts are detected by the pull phase and then left alone until the
//! caller decides what to do with them. A [`ConflictResolution`] is that
//! decision: a one-shot directive, never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metadata::SyncMetadata;
use super::newtypes::{EntityKey, Payload};

/// How the caller wants a conflict settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy", content = "data")]
pub enum ConflictResolution {
    /// Push local state to the remote store
    UseLocal,
    /// Adopt the remote payload captured at detection time
    UseServer,
    /// Push a caller-supplied merged payload
    Merge(Payload),
    /// Leave the conflict in place for the user to decide
    AskUser,
}

impl ConflictResolution {
    /// Returns the strategy name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ConflictResolution::UseLocal => "use_local",
            ConflictResolution::UseServer => "use_server",
            ConflictResolution::Merge(_) => "merge",
            ConflictResolution::AskUser => "ask_user",
        }
    }
}

/// Read model of an unresolved conflict, as shown to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictItem {
    pub key: EntityKey,
    /// Remote payload captured when the conflict was detected
    pub remote: Payload,
    /// Remote version token last recorded locally
    pub server_version: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub detected_at: Option<DateTime<Utc>>,
}

impl ConflictItem {
    /// Builds the read model from conflicted metadata; `None` when the
    /// record carries no conflict payload
    pub fn from_metadata(meta: &SyncMetadata) -> Option<Self> {
        let remote = meta.conflict_data.clone()?;
        Some(Self {
            key: meta.key.clone(),
            remote,
            server_version: meta.server_version.clone(),
            last_modified: meta.last_modified,
            detected_at: meta.last_sync_attempt,
        })
    }
}
