//! Domain error types
//!
//! Validation failures and invalid metadata state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Unknown entity data type name
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Unknown queue operation name
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Unknown sync status name
    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    /// Invalid metadata state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
