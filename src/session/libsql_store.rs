//! libSQL-backed [`SessionStore`]: survives a process restart, which is
//! what carries an in-flight booking across the sign-in round trip.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use super::SessionStore;
use crate::error::StorageError;

/// Scope name for `sessionStorage`-like keys.
pub const SESSION_SCOPE: &str = "session";
/// Scope name for `localStorage`-like keys.
pub const LOCAL_SCOPE: &str = "local";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS storage_entries (
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (scope, key)
)";

/// One scope of a shared libSQL key/value table.
#[derive(Clone)]
pub struct LibSqlSessionStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    scope: String,
}

impl LibSqlSessionStore {
    /// Open (or create) a local database file in the session scope.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Open(format!("Failed to create storage directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Session store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StorageError> {
        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;
        conn.execute(SCHEMA, ())
            .await
            .map_err(|e| StorageError::Query(format!("init schema: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            scope: SESSION_SCOPE.to_string(),
        })
    }

    /// The same table, viewed through another scope.
    pub fn with_scope(&self, scope: &str) -> Self {
        Self {
            db: Arc::clone(&self.db),
            conn: self.conn.clone(),
            scope: scope.to_string(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl SessionStore for LibSqlSessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM storage_entries WHERE scope = ?1 AND key = ?2",
                params![self.scope.as_str(), key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| StorageError::Serialization(format!("get: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO storage_entries (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (scope, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.scope.as_str(), key, value, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("set: {e}")))?;
        debug!(scope = %self.scope, key, "Stored entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM storage_entries WHERE scope = ?1 AND key = ?2",
                params![self.scope.as_str(), key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("remove: {e}")))?;
        Ok(count > 0)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StorageError> {
        // A single DELETE ... RETURNING keeps read-and-clear atomic.
        let mut rows = self
            .conn
            .query(
                "DELETE FROM storage_entries WHERE scope = ?1 AND key = ?2 RETURNING value",
                params![self.scope.as_str(), key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("take: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| StorageError::Serialization(format!("take: {e}")))?;
                debug!(scope = %self.scope, key, "Consumed entry");
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("take: {e}"))),
        }
    }
}
