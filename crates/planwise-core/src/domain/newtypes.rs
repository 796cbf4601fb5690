//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers the sync engine passes around.
//! Each newtype validates its input at construction time so that storage keys
//! built from them are always well formed.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Arbitrary JSON object carried by queue items, remote records and conflicts
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// DataType
// ============================================================================

/// Kind of entity participating in synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// A course in the user's timetable
    Course,
    /// An academic semester grouping courses
    Semester,
    /// The user's own profile
    Profile,
    /// A scheduled reminder or notification
    Notification,
}

impl DataType {
    /// All data types, in the order full refreshes walk them
    pub const ALL: [DataType; 4] = [
        DataType::Profile,
        DataType::Semester,
        DataType::Course,
        DataType::Notification,
    ];

    /// Returns the stable storage name of this data type
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Course => "course",
            DataType::Semester => "semester",
            DataType::Profile => "profile",
            DataType::Notification => "notification",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(DataType::Course),
            "semester" => Ok(DataType::Semester),
            "profile" => Ok(DataType::Profile),
            "notification" => Ok(DataType::Notification),
            other => Err(DomainError::InvalidDataType(other.to_string())),
        }
    }
}

// ============================================================================
// EntityKey
// ============================================================================

/// Identity of a synchronized entity: `(data_type, id)`
///
/// Its string form `dataType_id` is the durable key of the metadata map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    data_type: DataType,
    id: String,
}

impl EntityKey {
    /// Creates a new key, rejecting empty or whitespace-only ids
    pub fn new(data_type: DataType, id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidId(format!(
                "{} id cannot be empty",
                data_type
            )));
        }
        Ok(Self { data_type, id })
    }

    /// Returns the entity's data type
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the entity's id within its data type
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the durable storage key (`dataType_id`)
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.data_type, self.id)
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.data_type, self.id)
    }
}

impl FromStr for EntityKey {
    type Err = DomainError;

    /// Parses a `dataType_id` key. Data type names never contain `_`, so the
    /// first underscore is the separator and ids may contain more of them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (data_type, id) = s
            .split_once('_')
            .ok_or_else(|| DomainError::InvalidId(format!("Malformed entity key: {}", s)))?;
        EntityKey::new(data_type.parse()?, id)
    }
}

// ============================================================================
// QueueItemId
// ============================================================================

/// Identifier of a queued mutation
///
/// Derived from `dataType_dataId_operation_creationTime` (creation time in
/// microseconds since the epoch), so repeated operations on the same entity
/// receive distinct ids as long as their creation times differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueItemId(String);

impl QueueItemId {
    /// Derives the id for a mutation created at `created_at`
    pub fn derive(key: &EntityKey, operation: &str, created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}_{}_{}",
            key.storage_key(),
            operation,
            created_at.timestamp_micros()
        ))
    }

    /// Wraps an id read back from storage
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidId("queue item id cannot be empty".into()));
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for QueueItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// UserId
// ============================================================================

/// Stable identifier of the authenticated user; scopes every sync key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user id, rejecting empty values and path separators
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::InvalidId("user id cannot be empty".into()));
        }
        if value.contains('/') {
            return Err(DomainError::InvalidId(format!(
                "user id cannot contain '/': {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
