//! Planwise Cache - Durable sync state
//!
//! SQLite-based storage for:
//! - Per-entity sync metadata
//! - The queue of pending mutations
//! - Engine bookkeeping (last completed pass)
//!
//! ## Architecture
//!
//! This crate implements the `ISyncStateRepository` port from `planwise-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteSyncRepository`] - User-scoped `ISyncStateRepository` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use planwise_cache::{DatabasePool, SqliteSyncRepository};
//! use planwise_core::domain::UserId;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/planwise/sync.db")).await?;
//! let repo = SqliteSyncRepository::new(pool.pool().clone(), UserId::new("student-1")?);
//! // Use repo as ISyncStateRepository...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteSyncRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
