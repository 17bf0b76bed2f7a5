//! Scrawl Hub - Real-time Connection Hub
//!
//! This crate provides the real-time hub for Scrawl:
//! - Protocol: WebSocket client/server frame types
//! - Registry: live connections and their room memberships
//! - Broadcast: room fan-out to the current subscriber set
//! - Dispatch: validation and handling of inbound frames
//! - WebSocket: connection lifecycle (handshake, serve loop, teardown)
//! - Auth: bearer-token identity verification seam
//! - Store: room/message store of record seam, with a SQLite implementation
//! - Error: error types for hub operations
//!
//! ## Usage
//!
//! ```ignore
//! use scrawl_hub::{HmacTokenVerifier, HubState, SqliteRoomStore, hub_ws_handler};
//! use axum::{Router, routing::get};
//! use std::sync::Arc;
//!
//! let verifier = Arc::new(HmacTokenVerifier::new(b"secret".to_vec()));
//! let store = Arc::new(SqliteRoomStore::new(pool));
//! let state = Arc::new(HubState::new(verifier, store));
//!
//! let app: Router<()> = Router::new()
//!     .route("/ws", get(hub_ws_handler))
//!     .with_state(state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod broadcast;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod websocket;

// Re-export main types
pub use auth::{HmacTokenVerifier, IdentityVerifier};
pub use broadcast::Broadcaster;
pub use error::{Error, Result};
pub use protocol::{parse_room_id, ClientFrame, ConnectionState, RoomId, ServerFrame};
pub use registry::{FrameSender, Member, RoomRegistry};
pub use store::{RoomStore, SqliteRoomStore};
pub use websocket::{hub_ws_handler, HubConfig, HubState};
