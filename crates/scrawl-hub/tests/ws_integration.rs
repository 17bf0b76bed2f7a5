//! End-to-end hub tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use scrawl_hub::{hub_ws_handler, HmacTokenVerifier, HubState, RoomId, SqliteRoomStore};

const SECRET: &[u8] = b"integration-test-secret";
const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Sign a bearer token the way the issuing service would
fn sign_token(user_id: &str) -> String {
    let payload = format!(r#"{{"userId":"{user_id}"}}"#);
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(sig)
    )
}

/// Boot a hub server on an ephemeral port and return its WS URL, the shared
/// state, and the id of a pre-created room.
async fn boot_hub() -> (String, Arc<HubState>, RoomId) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteRoomStore::new(pool);
    store.init().await.unwrap();
    let room = store.create_room("integration").await.unwrap();

    let verifier = Arc::new(HmacTokenVerifier::new(SECRET.to_vec()));
    let state = Arc::new(HubState::new(verifier, Arc::new(store)));

    let app: Router = Router::new()
        .route("/ws", get(hub_ws_handler))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("ws://{addr}/ws"), state, room)
}

async fn connect_as(ws_url: &str, user_id: &str) -> WsStream {
    let url = format!("{ws_url}?token={}", sign_token(user_id));
    let (stream, _) = timeout(TIMEOUT, connect_async(url)).await.unwrap().unwrap();
    stream
}

/// Read the next JSON frame, skipping protocol-level ping/pong noise
async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("transport error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_handshake_confirms_identity() {
    let (ws_url, _state, _room) = boot_hub().await;

    let mut ws = connect_as(&ws_url, "alice").await;
    let frame = recv_json(&mut ws).await;

    assert_eq!(frame["type"], "connected");
    assert_eq!(frame["userId"], "alice");
}

#[tokio::test]
async fn test_invalid_token_closes_with_policy_violation() {
    let (ws_url, state, _room) = boot_hub().await;

    let (mut ws, _) = timeout(TIMEOUT, connect_async(format!("{ws_url}?token=forged")))
        .await
        .unwrap()
        .unwrap();

    match timeout(TIMEOUT, ws.next()).await.unwrap() {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 1008);
        }
        other => panic!("expected close frame, got {other:?}"),
    }

    // Nothing was ever registered
    assert_eq!(state.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_missing_token_closes_before_any_frame() {
    let (ws_url, state, _room) = boot_hub().await;

    let (mut ws, _) = timeout(TIMEOUT, connect_async(ws_url)).await.unwrap().unwrap();

    match timeout(TIMEOUT, ws.next()).await.unwrap() {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 1008);
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(state.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_join_chat_fans_out_to_both_members() {
    let (ws_url, _state, room) = boot_hub().await;
    let room_id = room.get();

    let mut alice = connect_as(&ws_url, "alice").await;
    let mut bob = connect_as(&ws_url, "bob").await;
    recv_json(&mut alice).await; // connected
    recv_json(&mut bob).await; // connected

    send_json(&mut alice, json!({"type": "join_room", "roomId": room_id})).await;
    assert_eq!(recv_json(&mut alice).await["type"], "joined_room");
    send_json(&mut bob, json!({"type": "join_room", "roomId": room_id})).await;
    assert_eq!(recv_json(&mut bob).await["type"], "joined_room");

    send_json(
        &mut alice,
        json!({"type": "chat", "roomId": room_id, "message": "  hello  "}),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let frame = recv_json(ws).await;
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["message"], "hello");
        assert_eq!(frame["roomId"], room_id);
        assert_eq!(frame["userId"], "alice");
        assert!(frame["chatId"].is_i64());
        assert!(frame["timestamp"].is_string());
    }
}

#[tokio::test]
async fn test_chat_without_join_is_rejected() {
    let (ws_url, _state, room) = boot_hub().await;

    let mut ws = connect_as(&ws_url, "alice").await;
    recv_json(&mut ws).await; // connected

    send_json(
        &mut ws,
        json!({"type": "chat", "roomId": room.get(), "message": "hi"}),
    )
    .await;

    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().contains("join room"));
}

#[tokio::test]
async fn test_disconnect_releases_memberships() {
    let (ws_url, state, room) = boot_hub().await;

    let mut ws = connect_as(&ws_url, "alice").await;
    recv_json(&mut ws).await; // connected

    send_json(&mut ws, json!({"type": "join_room", "roomId": room.get()})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "joined_room");
    assert_eq!(state.registry.connection_count(), 1);
    assert_eq!(state.registry.members_of(room).len(), 1);

    ws.close(None).await.unwrap();

    // Teardown runs in the server task; give it a moment
    timeout(TIMEOUT, async {
        while state.registry.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was never deregistered");

    assert!(state.registry.members_of(room).is_empty());
}

#[tokio::test]
async fn test_nonexistent_room_and_bad_room_id_are_reported() {
    let (ws_url, _state, _room) = boot_hub().await;

    let mut ws = connect_as(&ws_url, "alice").await;
    recv_json(&mut ws).await; // connected

    send_json(&mut ws, json!({"type": "join_room", "roomId": 999999})).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().contains("not found"));

    send_json(&mut ws, json!({"type": "join_room", "roomId": "abc"})).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().contains("invalid room id"));

    // The session survives both rejections
    send_json(&mut ws, json!({"type": "leave_room", "roomId": 1})).await;
    assert_eq!(recv_json(&mut ws).await["type"], "left_room");
}
