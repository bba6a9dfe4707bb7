//! Auth context: the signed-in user's bearer token.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::warn;

use super::{SessionStore, keys};
use crate::error::StorageError;

/// Reads the bearer token from local storage on demand.
///
/// The token is looked up on every call so a sign-in in another tab is seen
/// by a wizard that is already mounted.
#[derive(Clone)]
pub struct AuthContext {
    local: Arc<dyn SessionStore>,
}

impl AuthContext {
    pub fn new(local: Arc<dyn SessionStore>) -> Self {
        Self { local }
    }

    /// The current bearer token, if signed in.
    pub async fn token(&self) -> Option<SecretString> {
        match self.local.get(keys::AUTH_TOKEN).await {
            Ok(Some(token)) if !token.trim().is_empty() => Some(SecretString::from(token)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read auth token; treating as signed out");
                None
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token().await.is_some()
    }

    /// Store a token after sign-in.
    pub async fn sign_in(&self, token: &str) -> Result<(), StorageError> {
        self.local.set(keys::AUTH_TOKEN, token).await
    }

    pub async fn sign_out(&self) -> Result<(), StorageError> {
        self.local.remove(keys::AUTH_TOKEN).await.map(|_| ())
    }
}
