//! Local entity store port
//!
//! The domain model owns the actual course, semester, profile and
//! notification records. The engine reads a snapshot when a conflict is
//! resolved in favor of local state and writes remote payloads back when the
//! remote side wins.

use crate::domain::{DataType, Payload};

#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    /// Current local state of an entity, if it still exists
    async fn snapshot(&self, data_type: DataType, id: &str) -> anyhow::Result<Option<Payload>>;

    /// Overwrites local state with a payload received from the remote store
    async fn apply_remote(&self, data_type: DataType, id: &str, payload: &Payload) -> anyhow::Result<()>;
}
