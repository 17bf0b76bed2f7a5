//! Room Store
//!
//! This module defines the hub's view of the external store of record and a
//! SQLite implementation of it. The store owns room identity and message
//! ids; the hub only ever asks "does this room exist" and "persist this
//! message".

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::Result;
use crate::protocol::RoomId;

/// External store of record for rooms and chat messages.
///
/// `persist_message` is the single source of truth for message ids and
/// ordering within a room; the hub never assigns ids itself. No retry policy
/// lives behind this trait: transient failures surface to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Whether a room exists in the store
    async fn room_exists(&self, room: RoomId) -> Result<bool>;

    /// Persist one chat message, returning the canonical message id
    async fn persist_message(&self, room: RoomId, user_id: &str, body: &str) -> Result<i64>;
}

/// SQLite-backed room store
pub struct SqliteRoomStore {
    pool: SqlitePool,
}

impl SqliteRoomStore {
    /// Create a store over an existing pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chats_room_id ON chats(room_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Verify the database answers queries; used by the startup health check
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create a room and return its id.
    ///
    /// Room creation belongs to the CRUD service; this exists for local
    /// bootstrap and tests.
    pub async fn create_room(&self, slug: &str) -> Result<RoomId> {
        let result = sqlx::query(
            r#"
            INSERT INTO rooms (slug, created_at) VALUES (?, ?)
            "#,
        )
        .bind(slug)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(RoomId::new(result.last_insert_rowid()))
    }

    /// Number of messages persisted for a room
    pub async fn message_count(&self, room: RoomId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chats WHERE room_id = ?")
            .bind(room.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("n"))
    }
}

#[async_trait]
impl RoomStore for SqliteRoomStore {
    async fn room_exists(&self, room: RoomId) -> Result<bool> {
        let row = sqlx::query("SELECT id FROM rooms WHERE id = ?")
            .bind(room.get())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    async fn persist_message(&self, room: RoomId, user_id: &str, body: &str) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO chats (room_id, user_id, message, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(room.get())
        .bind(user_id)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
