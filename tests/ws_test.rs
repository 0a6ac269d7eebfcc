//! Integration tests for WebSocket connection, auth, ping/pong, room
//! subscription, presence fan-out, and notification delivery over REST + WS.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use connect_server::directory::SqliteDirectory;
use connect_server::notifications::SqliteNotificationStore;
use connect_server::realtime::RealtimeHub;
use connect_server::state::AppState;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsReader = futures_util::stream::SplitStream<WsStream>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;

/// Start the server on a random port and return (state, addr).
async fn start_test_server() -> (AppState, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = connect_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = connect_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let realtime = Arc::new(RealtimeHub::new(
        Arc::new(SqliteDirectory::new(db.clone())),
        Arc::new(SqliteNotificationStore::new(db.clone())),
    ));

    let state = AppState {
        db,
        jwt_secret,
        realtime,
    };

    let app = connect_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (state, addr)
}

fn issue_token(state: &AppState, user_id: &str) -> String {
    connect_server::auth::jwt::issue_access_token(&state.jwt_secret, user_id)
        .expect("Failed to issue token")
}

async fn connect_ws(state: &AppState, addr: SocketAddr, user_id: &str) -> (WsWriter, WsReader) {
    let token = issue_token(state, user_id);
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

/// Read the next event envelope (skipping pings) within a timeout.
async fn expect_event(read: &mut WsReader) -> (String, Value) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Expected event within timeout")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => {
                let envelope: Value = serde_json::from_str(text.as_str()).expect("valid envelope");
                return (
                    envelope["kind"].as_str().expect("kind").to_string(),
                    envelope["payload"].clone(),
                );
            }
            Message::Ping(_) => continue,
            other => panic!("Expected Text event, got: {:?}", other),
        }
    }
}

async fn assert_silent(read: &mut WsReader, window: Duration) {
    let result = tokio::time::timeout(window, read.next()).await;
    assert!(result.is_err(), "Expected no message, got: {:?}", result);
}

async fn send_json(write: &mut WsWriter, frame: Value) {
    write
        .send(Message::Text(frame.to_string().into()))
        .await
        .expect("Failed to send frame");
}

#[tokio::test]
async fn test_ws_connection_with_valid_jwt() {
    let (state, addr) = start_test_server().await;
    let (mut _write, mut read) = connect_ws(&state, addr, "u1").await;

    // Connection stays open with no unsolicited messages
    assert_silent(&mut read, Duration::from_millis(500)).await;
    assert!(state.realtime.is_online("u1"));
}

#[tokio::test]
async fn test_ws_auth_failure_invalid_token() {
    let (_state, addr) = start_test_server().await;

    let ws_url = format!("ws://{}/ws?token=invalid_jwt_token", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket should upgrade even with invalid token");

    let (mut _write, mut read) = ws_stream.split();

    // Server should immediately send a close frame with code 4002 (token invalid)
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close message within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002),
                "Expected close code 4002 (token invalid)"
            );
        }
        other => {
            panic!("Expected close frame with code 4002, got: {:?}", other);
        }
    }
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (state, addr) = start_test_server().await;
    let (mut write, mut read) = connect_ws(&state, addr, "u1").await;

    // Send a client ping
    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    // We should receive a pong back
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => {
            panic!("Expected Pong message, got: {:?}", other);
        }
    }
}

#[tokio::test]
async fn test_join_room_receives_entity_broadcast() {
    let (state, addr) = start_test_server().await;
    let (mut write_a, mut read_a) = connect_ws(&state, addr, "u1").await;
    let (mut write_b, mut read_b) = connect_ws(&state, addr, "u2").await;

    send_json(&mut write_a, json!({"type": "join_room", "room": "entity:task:42"})).await;
    send_json(&mut write_b, json!({"type": "join_room", "room": "entity:task:42"})).await;

    // Wait for the joins to land in the room table
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Domain mutation handler broadcasts after commit
    state
        .realtime
        .broadcast("entity:task:42", "updated", &json!({"status": "done"}));

    for read in [&mut read_a, &mut read_b] {
        let (kind, payload) = expect_event(read).await;
        assert_eq!(kind, "updated");
        assert_eq!(payload["status"], "done");
    }

    // After leaving, the broadcast no longer reaches the client
    send_json(&mut write_a, json!({"type": "leave_room", "room": "entity:task:42"})).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    state
        .realtime
        .broadcast("entity:task:42", "updated", &json!({"status": "archived"}));

    let (_, payload) = expect_event(&mut read_b).await;
    assert_eq!(payload["status"], "archived");
    assert_silent(&mut read_a, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_typing_indicator_relayed_to_chat_room() {
    let (state, addr) = start_test_server().await;
    let (mut write_a, _read_a) = connect_ws(&state, addr, "u1").await;
    let (mut write_b, mut read_b) = connect_ws(&state, addr, "u2").await;

    send_json(&mut write_b, json!({"type": "join_room", "room": "entity:chat:9"})).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_json(
        &mut write_a,
        json!({"type": "typing", "chat_id": "9", "is_typing": true}),
    )
    .await;

    let (kind, payload) = expect_event(&mut read_b).await;
    assert_eq!(kind, "typing");
    assert_eq!(payload["user_id"], "u1");
    assert_eq!(payload["is_typing"], true);
}

#[tokio::test]
async fn test_presence_broadcast_to_contact_watchers() {
    let (state, addr) = start_test_server().await;

    // watcher has u1 in their contact list
    {
        let conn = state.db.lock().unwrap();
        conn.execute(
            "INSERT INTO contacts (user_id, contact_id) VALUES ('watcher', 'u1')",
            [],
        )
        .unwrap();
    }

    let (mut write_w, mut read_w) = connect_ws(&state, addr, "watcher").await;
    send_json(
        &mut write_w,
        json!({"type": "join_room", "room": "notifications:watcher"}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // u1 comes online — watcher hears about it
    let (mut write_u1, _read_u1) = connect_ws(&state, addr, "u1").await;
    let (kind, payload) = expect_event(&mut read_w).await;
    assert_eq!(kind, "presence-changed");
    assert_eq!(payload["identity"], "u1");
    assert_eq!(payload["status"], "online");

    // u1 signals idle
    send_json(&mut write_u1, json!({"type": "status_change", "status": "away"})).await;
    let (_, payload) = expect_event(&mut read_w).await;
    assert_eq!(payload["status"], "away");

    // u1 disconnects — watcher hears offline
    write_u1.send(Message::Close(None)).await.unwrap();
    let (_, payload) = expect_event(&mut read_w).await;
    assert_eq!(payload["status"], "offline");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!state.realtime.is_online("u1"));
}

#[tokio::test]
async fn test_notification_rest_fanout_to_all_devices() {
    let (state, addr) = start_test_server().await;

    // Recipient online with two devices
    let (mut _write_a, mut read_a) = connect_ws(&state, addr, "u1").await;
    let (mut _write_b, mut read_b) = connect_ws(&state, addr, "u1").await;

    let client = reqwest::Client::new();
    let sender_token = issue_token(&state, "u2");
    let resp = client
        .post(format!("http://{}/api/notifications", addr))
        .bearer_auth(&sender_token)
        .json(&json!({"recipient_id": "u1", "payload": {"text": "hi"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();

    for read in [&mut read_a, &mut read_b] {
        let (kind, payload) = expect_event(read).await;
        assert_eq!(kind, "new_notification");
        assert_eq!(payload["id"], created["id"]);
        assert_eq!(payload["payload"]["text"], "hi");
    }

    // The persisted record is fetchable and mutable via REST
    let recipient_token = issue_token(&state, "u1");
    let listed: Vec<Value> = client
        .get(format!("http://{}/api/notifications", addr))
        .bearer_auth(&recipient_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["is_read"], false);

    let resp = client
        .post(format!("http://{}/api/notifications/read-all", addr))
        .bearer_auth(&recipient_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let listed: Vec<Value> = client
        .get(format!("http://{}/api/notifications", addr))
        .bearer_auth(&recipient_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["is_read"], true);
}

#[tokio::test]
async fn test_notify_offline_recipient_persists_only() {
    let (state, addr) = start_test_server().await;

    let client = reqwest::Client::new();
    let token = issue_token(&state, "u2");
    let resp = client
        .post(format!("http://{}/api/notifications", addr))
        .bearer_auth(&token)
        .json(&json!({"recipient_id": "ghost", "payload": {"text": "hello?"}}))
        .send()
        .await
        .unwrap();
    // Live push no-ops; persistence alone is success
    assert_eq!(resp.status(), 201);
    assert_eq!(state.realtime.notifications("ghost").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rest_requires_auth() {
    let (_state, addr) = start_test_server().await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/api/notifications", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_presence_snapshot_endpoint() {
    let (state, addr) = start_test_server().await;
    let (mut _write, _read) = connect_ws(&state, addr, "u1").await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let token = issue_token(&state, "u2");
    let entries: Vec<Value> = client
        .get(format!("http://{}/api/presence", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(entries
        .iter()
        .any(|e| e["identity"] == "u1" && e["status"] == "online"));
}

#[tokio::test]
async fn test_ws_connection_cleanup_on_disconnect() {
    let (state, addr) = start_test_server().await;

    {
        let (mut write, _read) = connect_ws(&state, addr, "u1").await;
        write
            .send(Message::Close(None))
            .await
            .expect("Failed to send close");
    }

    // Give the server a moment to clean up
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!state.realtime.is_online("u1"));
    assert!(state.realtime.connections_of("u1").is_empty());

    // Reconnect works fine after cleanup
    let (mut _write2, mut read2) = connect_ws(&state, addr, "u1").await;
    assert_silent(&mut read2, Duration::from_millis(300)).await;
    assert!(state.realtime.is_online("u1"));
}
