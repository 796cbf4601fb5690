//! Remote store port (driven/secondary port)
//!
//! The remote persistence backend is an opaque document store reachable only
//! through this narrow interface. The engine is agnostic to transport and
//! serialization.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports this one returns a typed [`RemoteError`], so
//!   the engine can tell retryable failures from rejections.
//! - `apply` is assumed idempotent: a queue item may be delivered more than
//!   once when a pass ends between the remote call and the local bookkeeping.

use thiserror::Error;

use crate::domain::{DataType, Operation, Payload};

/// Failure reported by the remote store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, timeout, throttling or server-side error
    #[error("Transient remote failure: {0}")]
    Transient(String),

    /// The remote rejected the operation (validation, malformed payload)
    #[error("Remote rejected operation: {0}")]
    Permanent(String),

    /// Credentials missing, expired or insufficient
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    /// Returns true if the same request may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::Unauthorized(_))
    }
}

/// Result of a successful `apply`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Version token assigned by the remote, when it reports one
    pub server_version: Option<String>,
}

/// A remote entity as returned by `fetch`
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    pub server_version: String,
    pub payload: Payload,
}

/// A remote entity as listed during full-refresh discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub server_version: String,
}

/// Remote persistence backend
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Applies one mutation to the remote copy of `(data_type, id)`
    async fn apply(
        &self,
        data_type: DataType,
        id: &str,
        operation: Operation,
        payload: &Payload,
    ) -> Result<ApplyOutcome, RemoteError>;

    /// Fetches the current remote version; `Ok(None)` when not found
    async fn fetch(&self, data_type: DataType, id: &str) -> Result<Option<RemoteRecord>, RemoteError>;

    /// Lists every remote entity of a data type
    async fn list(&self, data_type: DataType) -> Result<Vec<RemoteEntry>, RemoteError>;
}
