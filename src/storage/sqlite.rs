use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use super::{ActiveUser, Snapshot, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create a storage instance backed by a private in-memory database
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                StorageError::Connection {
                    message: format!("Invalid database URL: {}", e),
                }
            })?;

        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_snapshot(&self, key: &str) -> StorageResult<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT key, payload, updated_at
            FROM snapshots
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn put_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (key, payload, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&snapshot.key)
        .bind(&snapshot.payload)
        .bind(snapshot.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(key = %snapshot.key, bytes = snapshot.payload.len(), "Snapshot written");
        Ok(())
    }

    async fn delete_snapshot(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM snapshots WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_active_user(&self) -> StorageResult<Option<ActiveUser>> {
        let row: Option<ActiveUserRow> = sqlx::query_as(
            r#"
            SELECT username, logged_in_at
            FROM active_user
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn set_active_user(&self, user: &ActiveUser) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO active_user (id, username, logged_in_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                logged_in_at = excluded.logged_in_at
            "#,
        )
        .bind(&user.username)
        .bind(user.logged_in_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_active_user(&self) -> StorageResult<()> {
        sqlx::query("DELETE FROM active_user WHERE id = 1")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// Internal row types for SQLx mapping
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    key: String,
    payload: String,
    updated_at: String,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            key: row.key,
            payload: row.payload,
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActiveUserRow {
    username: String,
    logged_in_at: String,
}

impl From<ActiveUserRow> for ActiveUser {
    fn from(row: ActiveUserRow) -> Self {
        Self {
            username: row.username,
            logged_in_at: parse_timestamp(&row.logged_in_at),
        }
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
