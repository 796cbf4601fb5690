//! Bearer token authentication
//!
//! Planwise does not run a sign-in flow itself. The embedding application
//! (or the environment, for the daemon) hands over a user id and an access
//! token; [`TokenAuth`] exposes them through [`IAuthProvider`].

use std::sync::RwLock;

use planwise_core::domain::{DomainError, UserId};
use planwise_core::ports::IAuthProvider;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Credentials {
    user_id: Option<UserId>,
    token: Option<String>,
}

/// Authentication state backed by a user id and a bearer token
#[derive(Debug, Default)]
pub struct TokenAuth {
    inner: RwLock<Credentials>,
}

impl TokenAuth {
    /// Signed-in state for `user_id` holding `token`
    pub fn new(user_id: UserId, token: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Credentials {
                user_id: Some(user_id),
                token: Some(token.into()),
            }),
        }
    }

    /// Signed-out state
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Reads the token from the environment variable `token_env`
    ///
    /// Missing user id or an unset/blank variable yields a signed-out
    /// provider; an invalid user id is an error.
    pub fn from_env(user_id: Option<&str>, token_env: &str) -> Result<Self, DomainError> {
        let token = std::env::var(token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        match (user_id, token) {
            (Some(user), Some(token)) => Ok(Self::new(UserId::new(user)?, token)),
            (user, token) => {
                debug!(
                    has_user = user.is_some(),
                    has_token = token.is_some(),
                    token_env,
                    "No usable credentials, starting signed out"
                );
                Ok(Self::signed_out())
            }
        }
    }

    /// Current bearer token, if signed in
    pub fn token(&self) -> Option<String> {
        self.read(|c| c.token.clone())
    }

    /// Stores new credentials
    pub fn sign_in(&self, user_id: UserId, token: impl Into<String>) {
        info!(user = %user_id, "Signed in");
        self.write(|c| {
            c.user_id = Some(user_id);
            c.token = Some(token.into());
        });
    }

    /// Drops the credentials; passes will refuse to start afterwards
    pub fn sign_out(&self) {
        info!("Signed out");
        self.write(|c| *c = Credentials::default());
    }

    fn read<T>(&self, f: impl FnOnce(&Credentials) -> T) -> T {
        match self.inner.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write(&self, f: impl FnOnce(&mut Credentials)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

impl IAuthProvider for TokenAuth {
    fn is_authenticated(&self) -> bool {
        self.read(|c| c.user_id.is_some() && c.token.is_some())
    }

    fn user_id(&self) -> Option<UserId> {
        self.read(|c| c.user_id.clone())
    }
}
