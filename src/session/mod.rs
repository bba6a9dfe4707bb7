//! Session and local storage: the explicit replacement for browser
//! `sessionStorage`/`localStorage` lookups.
//!
//! The wizard only ever talks to a [`SessionStore`]; which backend sits behind
//! it is the caller's choice.

pub mod auth;
pub mod libsql_store;

pub use auth::AuthContext;
pub use libsql_store::LibSqlSessionStore;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// Storage keys shared with the web front end.
pub mod keys {
    /// Serialized `BookingData` of a wizard waiting on sign-in (session scope).
    pub const BOOKING_IN_PROGRESS: &str = "booking_in_progress";
    /// Route to come back to after sign-in (session scope).
    pub const BOOKING_RETURN_URL: &str = "booking_return_url";
    /// Bearer token of the signed-in user (local scope).
    pub const AUTH_TOKEN: &str = "auth_token";
}

/// String key/value storage with read-once support.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Read and delete a key in one step, so a value is never consumed twice.
    async fn take(&self, key: &str) -> Result<Option<String>, StorageError>;
}

/// In-memory store, one per tab/session.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.write().await.remove(key))
    }
}
