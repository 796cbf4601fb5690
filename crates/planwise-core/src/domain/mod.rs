//! Domain entities and business logic
//!
//! This module contains the core domain types for the sync engine:
//! - Newtypes for entity identity, queue ids and user ids
//! - Per-entity sync metadata and its status state machine
//! - Queued mutations and the retry policy
//! - Conflict resolution directives
//! - Pass results
//! - Domain-specific error types

pub mod conflict;
pub mod errors;
pub mod metadata;
pub mod newtypes;
pub mod pass;
pub mod queue_item;

// Re-export commonly used types
pub use conflict::{ConflictItem, ConflictResolution};
pub use errors::DomainError;
pub use metadata::{SyncMetadata, SyncStatus};
pub use newtypes::*;
pub use pass::PassResult;
pub use queue_item::{Operation, RetryPolicy, SyncQueueItem, DEFAULT_PRIORITY};
