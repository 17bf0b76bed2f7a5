//! Error types for scrawl-hub
//!
//! This module provides error types for hub operations. Handshake failures
//! are fatal to the connection; everything the dispatcher produces is
//! reported back to the sender as an `error` frame and the session stays
//! open.

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::RoomId;

/// Hub error type
#[derive(Debug, Error)]
pub enum Error {
    /// Handshake token missing or invalid. Fatal: the connection is closed
    /// before it is ever registered.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Inbound text could not be parsed as a protocol frame
    #[error("invalid frame: {0}")]
    MalformedFrame(String),

    /// Room id is not a positive integer
    #[error("invalid room id: {0}")]
    MalformedRoomId(String),

    /// Room does not exist in the store of record
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// Connection tried to chat in a room it has not joined
    #[error("join room {0} before sending messages to it")]
    NotJoined(RoomId),

    /// Chat body was empty after trimming
    #[error("message must not be empty")]
    EmptyMessage,

    /// Store call failed or exceeded its time bound
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The same connection id was registered twice. Internal invariant
    /// breach: logged server-side, never surfaced to clients.
    #[error("connection {0} already registered")]
    DuplicateConnection(Uuid),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error ends the connection instead of producing an
    /// `error` frame.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    /// Stable machine-readable code for logs and metrics
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthFailure(_) => "auth_failure",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::MalformedRoomId(_) => "malformed_room_id",
            Self::RoomNotFound(_) => "room_not_found",
            Self::NotJoined(_) => "not_joined",
            Self::EmptyMessage => "empty_message",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::DuplicateConnection(_) => "duplicate_connection",
            Self::Database(_) => "database_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;
