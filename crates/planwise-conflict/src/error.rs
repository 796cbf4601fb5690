//! Error types for the conflict engine

use planwise_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur during conflict resolution
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The entity is not in conflict
    #[error("entity is not in conflict: {0}")]
    NotConflicted(String),

    /// No local state is available to push for a use-local resolution
    #[error("no local state to push for {0}")]
    NoLocalState(String),

    /// The metadata state machine refused the transition
    #[error("invalid transition: {0}")]
    Transition(#[from] DomainError),
}
