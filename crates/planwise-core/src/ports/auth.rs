//! Authentication port
//!
//! Sign-in itself happens elsewhere; the engine only needs to know whether a
//! user is signed in and who that is, since every sync key is scoped by the
//! user id.

use crate::domain::UserId;

/// Read-only view of the current authentication state
pub trait IAuthProvider: Send + Sync {
    /// Returns true while a user is signed in
    fn is_authenticated(&self) -> bool;

    /// Returns the signed-in user's stable identifier
    fn user_id(&self) -> Option<UserId>;
}
