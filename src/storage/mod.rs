//! Storage layer for conversation snapshots and session identity.
//!
//! A conversation is persisted as one flat serialized snapshot keyed by
//! session. The logged-in username is a single-row record.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// A serialized conversation stored under a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Storage key, e.g. `history:alice`.
    pub key: String,
    /// Serialized message sequence (JSON array).
    pub payload: String,
    /// When the snapshot was last written.
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            updated_at: Utc::now(),
        }
    }
}

/// The user whose session is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveUser {
    /// Opaque username.
    pub username: String,
    /// When the user logged in.
    pub logged_in_at: DateTime<Utc>,
}

impl ActiveUser {
    /// Create an active-user record stamped with the current time
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            logged_in_at: Utc::now(),
        }
    }
}

/// Snapshot key for a user's conversation history
pub fn history_key(username: &str) -> String {
    format!("history:{}", username)
}

/// Persistence backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a snapshot by key
    async fn get_snapshot(&self, key: &str) -> StorageResult<Option<Snapshot>>;

    /// Insert or replace a snapshot
    async fn put_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Remove a snapshot; removing a missing key is not an error
    async fn delete_snapshot(&self, key: &str) -> StorageResult<()>;

    /// Read the logged-in user, if any
    async fn get_active_user(&self) -> StorageResult<Option<ActiveUser>>;

    /// Record the logged-in user, replacing any previous one
    async fn set_active_user(&self, user: &ActiveUser) -> StorageResult<()>;

    /// Forget the logged-in user
    async fn clear_active_user(&self) -> StorageResult<()>;
}
