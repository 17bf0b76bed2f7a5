//! Frame Dispatch
//!
//! This module validates and handles inbound frames from active
//! connections. Every validation and store lookup completes before any
//! registry mutation or persist call, so a failed operation mutates
//! nothing. Failures are answered with an `error` frame on the originating
//! connection and never end the session.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{parse_room_id, ClientFrame, RoomId, ServerFrame};
use crate::registry::FrameSender;
use crate::websocket::HubState;

/// Handle one inbound text frame from an active connection.
///
/// `reply` is the connection's own outbound sender: confirmations and error
/// reports go there; chat events go through the broadcaster to the whole
/// room.
pub async fn handle_frame(
    state: &HubState,
    conn_id: Uuid,
    user_id: &str,
    reply: &FrameSender,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(conn_id = %conn_id, error = %e, "unparseable frame");
            send_error(reply, &Error::MalformedFrame(e.to_string()));
            return;
        }
    };

    let result = match frame {
        ClientFrame::JoinRoom { room_id } => handle_join(state, conn_id, reply, &room_id).await,
        ClientFrame::LeaveRoom { room_id } => handle_leave(state, conn_id, reply, &room_id),
        ClientFrame::Chat { room_id, message } => {
            handle_chat(state, conn_id, user_id, &room_id, &message).await
        }
        ClientFrame::Unknown => {
            debug!(conn_id = %conn_id, "ignoring unrecognized frame type");
            Ok(())
        }
    };

    if let Err(e) = result {
        debug!(conn_id = %conn_id, code = e.code(), "frame rejected: {e}");
        send_error(reply, &e);
    }
}

async fn handle_join(
    state: &HubState,
    conn_id: Uuid,
    reply: &FrameSender,
    raw_room: &serde_json::Value,
) -> Result<()> {
    let room = parse_room_id(raw_room)?;

    if !bounded(state.config.store_timeout, state.store.room_exists(room)).await? {
        return Err(Error::RoomNotFound(room));
    }

    if state.registry.join(conn_id, room) {
        debug!(conn_id = %conn_id, room = %room, "joined room");
    }
    let _ = reply.send(ServerFrame::JoinedRoom { room_id: room });
    Ok(())
}

fn handle_leave(
    state: &HubState,
    conn_id: Uuid,
    reply: &FrameSender,
    raw_room: &serde_json::Value,
) -> Result<()> {
    let room = parse_room_id(raw_room)?;

    // No existence check: leaving a room that never existed is harmless.
    state.registry.leave(conn_id, room);
    let _ = reply.send(ServerFrame::LeftRoom { room_id: room });
    Ok(())
}

async fn handle_chat(
    state: &HubState,
    conn_id: Uuid,
    user_id: &str,
    raw_room: &serde_json::Value,
    message: &str,
) -> Result<()> {
    let body = message.trim();
    if body.is_empty() {
        return Err(Error::EmptyMessage);
    }

    let room = parse_room_id(raw_room)?;

    if !bounded(state.config.store_timeout, state.store.room_exists(room)).await? {
        return Err(Error::RoomNotFound(room));
    }

    if !state.registry.is_member(conn_id, room) {
        return Err(Error::NotJoined(room));
    }

    let chat_id = bounded(
        state.config.store_timeout,
        state.store.persist_message(room, user_id, body),
    )
    .await?;

    let frame = ServerFrame::Chat {
        chat_id,
        message: body.to_string(),
        room_id: room,
        user_id: user_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };

    let delivered = state.broadcaster.broadcast(room, &frame);
    debug!(
        conn_id = %conn_id,
        room = %room,
        chat_id,
        delivered,
        "chat persisted and fanned out"
    );
    Ok(())
}

/// Run a store call under the configured time bound.
///
/// Both a timeout and a store-side failure surface as `StoreUnavailable`:
/// the client may resubmit, the hub never retries.
async fn bounded<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(error = %e, "store call failed");
            Err(Error::StoreUnavailable(e.to_string()))
        }
        Err(_) => Err(Error::StoreUnavailable(format!(
            "store call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

fn send_error(reply: &FrameSender, err: &Error) {
    // A closed channel means the connection is already tearing down; the
    // frame has nowhere to go and that is fine.
    let _ = reply.send(ServerFrame::error(err.to_string()));
}
