//! WebSocket Protocol Frames
//!
//! This module defines the client/server frame types for the hub WebSocket
//! API. One JSON object per frame, discriminated by the `type` field; field
//! names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifier of a collaboration room.
///
/// Always a positive integer. Room entities are owned by the external store
/// of record; the hub never creates or deletes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(i64);

impl RoomId {
    /// Wrap a raw id. Wire input should go through [`parse_room_id`] instead.
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw integer id
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coerce a wire room id into a validated [`RoomId`].
///
/// Clients send room ids as JSON numbers or numeric strings; anything that
/// does not coerce to a positive integer is rejected.
pub fn parse_room_id(raw: &serde_json::Value) -> Result<RoomId> {
    let id = match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match id {
        Some(id) if id > 0 => Ok(RoomId::new(id)),
        _ => Err(Error::MalformedRoomId(raw.to_string())),
    }
}

/// Frames sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe this connection to a room
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room id; number or numeric string, validated before use
        room_id: serde_json::Value,
    },

    /// Drop this connection's membership in a room
    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        /// Room id; number or numeric string, validated before use
        room_id: serde_json::Value,
    },

    /// Send a chat/drawing event into a room
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Target room id
        room_id: serde_json::Value,
        /// Opaque event body, relayed verbatim after trimming
        message: String,
    },

    /// Any unrecognized frame type: logged and ignored, never an error
    #[serde(other)]
    Unknown,
}

/// Frames sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake confirmation carrying the authenticated user id
    #[serde(rename_all = "camelCase")]
    Connected {
        /// The authenticated user id for this connection
        user_id: String,
    },

    /// Join confirmation, sent to the requester only
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        /// Room that was joined
        room_id: RoomId,
    },

    /// Leave confirmation, sent to the requester only
    #[serde(rename_all = "camelCase")]
    LeftRoom {
        /// Room that was left
        room_id: RoomId,
    },

    /// A persisted chat event, fanned out to every member of the room
    /// (sender included)
    #[serde(rename_all = "camelCase")]
    Chat {
        /// Canonical message id assigned by the store of record
        chat_id: i64,
        /// Trimmed event body
        message: String,
        /// Room the event belongs to
        room_id: RoomId,
        /// User id of the sender
        user_id: String,
        /// Server-assigned RFC 3339 timestamp
        timestamp: String,
    },

    /// Error report, sent to the originating connection only
    Error {
        /// Human-readable description of what was rejected
        message: String,
    },
}

impl ServerFrame {
    /// Create an error frame
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Lifecycle state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress; nothing registered yet
    Connecting,
    /// Authenticated, registered, processing frames
    Active,
    /// Terminal; no further processing
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_room_deserialization() {
        let json = r#"{"type":"join_room","roomId":5}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::JoinRoom { room_id } => {
                assert_eq!(parse_room_id(&room_id).unwrap(), RoomId::new(5));
            }
            other => unreachable!("expected JoinRoom, got {:?}", other),
        }
    }

    #[test]
    fn test_chat_deserialization() {
        let json = r#"{"type":"chat","roomId":"12","message":"hello"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Chat { room_id, message } => {
                assert_eq!(parse_room_id(&room_id).unwrap(), RoomId::new(12));
                assert_eq!(message, "hello");
            }
            other => unreachable!("expected Chat, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_frame_type_is_not_an_error() {
        let json = r#"{"type":"draw_cursor","x":3,"y":9}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        assert!(matches!(frame, ClientFrame::Unknown));
    }

    #[test]
    fn test_missing_field_fails_to_parse() {
        let json = r#"{"type":"chat","roomId":5}"#;
        assert!(serde_json::from_str::<ClientFrame>(json).is_err());
    }

    #[test]
    fn test_parse_room_id_accepts_number_and_numeric_string() {
        assert_eq!(parse_room_id(&json!(42)).unwrap(), RoomId::new(42));
        assert_eq!(parse_room_id(&json!("42")).unwrap(), RoomId::new(42));
        assert_eq!(parse_room_id(&json!(" 7 ")).unwrap(), RoomId::new(7));
    }

    #[test]
    fn test_parse_room_id_rejects_garbage() {
        assert!(parse_room_id(&json!("abc")).is_err());
        assert!(parse_room_id(&json!(0)).is_err());
        assert!(parse_room_id(&json!(-3)).is_err());
        assert!(parse_room_id(&json!(1.5)).is_err());
        assert!(parse_room_id(&json!(null)).is_err());
        assert!(parse_room_id(&json!({"id": 1})).is_err());
    }

    #[test]
    fn test_connected_serialization() {
        let frame = ServerFrame::Connected {
            user_id: "user-1".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"userId\":\"user-1\""));
    }

    #[test]
    fn test_chat_serialization_uses_camel_case() {
        let frame = ServerFrame::Chat {
            chat_id: 9,
            message: "hi".to_string(),
            room_id: RoomId::new(5),
            user_id: "user-1".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"chatId\":9"));
        assert!(json.contains("\"roomId\":5"));
        assert!(json.contains("\"userId\":\"user-1\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_error_frame_serialization() {
        let frame = ServerFrame::error("room 9 not found");
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"message\":\"room 9 not found\""));
    }

    #[test]
    fn test_server_frame_roundtrip() {
        let frame = ServerFrame::JoinedRoom {
            room_id: RoomId::new(3),
        };
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: ServerFrame = serde_json::from_str(&json).unwrap();
        match parsed {
            ServerFrame::JoinedRoom { room_id } => assert_eq!(room_id, RoomId::new(3)),
            other => unreachable!("expected JoinedRoom, got {:?}", other),
        }
    }
}
