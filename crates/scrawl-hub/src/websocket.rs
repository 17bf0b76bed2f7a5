//! WebSocket Connection Lifecycle
//!
//! This module drives accept → handshake → serve loop → teardown for each
//! connection. A connection is only registered after its bearer token
//! verifies; teardown deregisters it exactly once on every exit path (peer
//! close, transport error, heartbeat timeout, process shutdown).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::auth::IdentityVerifier;
use crate::broadcast::Broadcaster;
use crate::dispatch;
use crate::protocol::{ConnectionState, ServerFrame};
use crate::registry::RoomRegistry;
use crate::store::RoomStore;

/// WebSocket close code for a failed handshake (policy violation)
const HANDSHAKE_REJECT_CODE: u16 = 1008;

/// Max time without receiving anything before the connection is considered dead.
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 60;
/// How often to send server-side pings.
pub const PING_INTERVAL_SECS: u64 = 30;
/// Upper bound on any single store call.
pub const STORE_TIMEOUT_SECS: u64 = 5;

/// Tuning knobs for the hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on any single store call; expiry surfaces as
    /// `StoreUnavailable` to the sender
    pub store_timeout: Duration,
    /// How often the server pings each connection
    pub ping_interval: Duration,
    /// Max silence before a connection is torn down
    pub heartbeat_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(STORE_TIMEOUT_SECS),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs(HEARTBEAT_TIMEOUT_SECS),
        }
    }
}

/// Shared state for the hub WebSocket handler
pub struct HubState {
    /// Live connections and room memberships
    pub registry: Arc<RoomRegistry>,
    /// Room fan-out over the registry
    pub broadcaster: Broadcaster,
    /// Bearer-token identity verification
    pub verifier: Arc<dyn IdentityVerifier>,
    /// External store of record
    pub store: Arc<dyn RoomStore>,
    /// Tuning knobs
    pub config: HubConfig,
}

impl HubState {
    /// Create hub state over the given collaborators
    #[must_use]
    pub fn new(verifier: Arc<dyn IdentityVerifier>, store: Arc<dyn RoomStore>) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Self {
            registry,
            broadcaster,
            verifier,
            store,
            config: HubConfig::default(),
        }
    }

    /// Override the default tuning knobs
    #[must_use]
    pub fn with_config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }
}

/// WebSocket upgrade handler for the hub endpoint.
///
/// The bearer token travels in the `?token=` query parameter or the
/// `Authorization: Bearer` header; verification happens before anything is
/// registered.
pub async fn hub_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    let token = extract_token(&params, &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, token, state))
}

/// Extract the bearer token from the upgrade request
fn extract_token(params: &HashMap<String, String>, headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    params.get("token").map(|t| t.trim().to_string())
}

/// Handle one WebSocket connection from handshake to teardown
async fn handle_socket(mut socket: WebSocket, token: Option<String>, state: Arc<HubState>) {
    let mut conn_state = ConnectionState::Connecting;

    let verified = match token.as_deref() {
        Some(token) => state.verifier.verify(token),
        None => Err(crate::error::Error::AuthFailure("missing token".to_string())),
    };

    let user_id = match verified {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!(error = %e, state = ?conn_state, "rejecting connection at handshake");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: HANDSHAKE_REJECT_CODE,
                    reason: "invalid token".into(),
                })))
                .await;
            return;
        }
    };

    let conn_id = Uuid::new_v4();
    let (tx, mut outbound) = mpsc::unbounded_channel::<ServerFrame>();

    if let Err(e) = state.registry.register(conn_id, user_id.clone(), tx.clone()) {
        // Fresh UUIDs make this unreachable in practice; if it ever fires,
        // the first registration wins and this socket goes away quietly.
        warn!(conn_id = %conn_id, error = %e, "registration refused");
        return;
    }
    conn_state = ConnectionState::Active;
    info!(conn_id = %conn_id, user_id = %user_id, "connection established");

    // Deregistration must run on every exit path, exactly once.
    let _teardown = TeardownGuard {
        registry: Arc::clone(&state.registry),
        conn_id,
    };

    let _ = tx.send(ServerFrame::Connected {
        user_id: user_id.clone(),
    });

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut ping_interval = tokio::time::interval(state.config.ping_interval);
    // The first tick fires immediately; skip it so the ping cadence starts
    // one interval after connect.
    ping_interval.tick().await;
    let mut last_recv = tokio::time::Instant::now();

    while conn_state == ConnectionState::Active {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_recv = tokio::time::Instant::now();
                        trace!(conn_id = %conn_id, len = text.len(), "frame received");
                        dispatch::handle_frame(&state, conn_id, &user_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_recv = tokio::time::Instant::now();
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_recv = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(conn_id = %conn_id, "connection closed by peer");
                        conn_state = ConnectionState::Closed;
                    }
                    Some(Ok(_)) => {
                        // Binary and other transport-level noise: logged
                        // server-side only, never answered with a frame.
                        debug!(conn_id = %conn_id, "ignoring non-text message");
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "transport error");
                        conn_state = ConnectionState::Closed;
                    }
                }
            }
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => match serde_json::to_string(&frame) {
                        Ok(json) => {
                            if ws_tx.send(Message::Text(json)).await.is_err() {
                                conn_state = ConnectionState::Closed;
                            }
                        }
                        Err(e) => {
                            warn!(conn_id = %conn_id, error = %e, "failed to encode outbound frame");
                        }
                    },
                    None => conn_state = ConnectionState::Closed,
                }
            }
            _ = ping_interval.tick() => {
                if last_recv.elapsed() > state.config.heartbeat_timeout {
                    info!(conn_id = %conn_id, "heartbeat timeout, closing");
                    conn_state = ConnectionState::Closed;
                } else if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    conn_state = ConnectionState::Closed;
                }
            }
        }
    }

    info!(conn_id = %conn_id, user_id = %user_id, "connection ended");
}

/// Deregisters the connection when the handler exits, however it exits.
struct TeardownGuard {
    registry: Arc<RoomRegistry>,
    conn_id: Uuid,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.conn_id);
    }
}
