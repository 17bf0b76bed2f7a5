//! WebSocket module for Scrawl
//!
//! Mounts the real-time hub endpoint:
//! - /ws - authenticated room join/leave/chat hub

use axum::{routing::get, Router};
use scrawl_hub::{hub_ws_handler, HubState};
use std::sync::Arc;

/// Create the WebSocket router
pub fn websocket_router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/ws", get(hub_ws_handler))
        .with_state(state)
}
