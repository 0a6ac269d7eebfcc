//! Client -> server frame handling.
//!
//! Frames are JSON objects tagged by `type`, matching what the Connect web
//! client emits: room subscription lifecycle, typing indicators, and the
//! idle/active presence signal. Server -> client traffic uses the
//! `{ kind, payload }` envelope produced by the dispatcher.

use serde::Deserialize;
use serde_json::json;

use crate::realtime::entity_room;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe this connection to a room, e.g. entity:task:42.
    JoinRoom { room: String },
    /// Unsubscribe this connection from a room.
    LeaveRoom { room: String },
    /// Typing indicator for a chat, relayed to entity:chat:<chat_id>.
    Typing { chat_id: String, is_typing: bool },
    /// Explicit presence signal: "away" marks idle, anything else active.
    StatusChange { status: String },
}

/// Handle one incoming text frame from an authenticated connection.
/// Malformed frames are logged and dropped; they never close the connection.
pub async fn handle_client_frame(
    text: &str,
    state: &AppState,
    user_id: &str,
    connection_id: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client frame"
            );
            return;
        }
    };

    match frame {
        ClientFrame::JoinRoom { room } => {
            if let Err(e) = state.realtime.join_room(connection_id, &room) {
                // Only possible if the frame raced the actor's teardown
                tracing::warn!(
                    user_id = %user_id,
                    room = %room,
                    error = %e,
                    "Join room failed"
                );
            }
        }
        ClientFrame::LeaveRoom { room } => {
            state.realtime.leave_room(connection_id, &room);
        }
        ClientFrame::Typing { chat_id, is_typing } => {
            state.realtime.broadcast(
                &entity_room("chat", &chat_id),
                "typing",
                &json!({
                    "user_id": user_id,
                    "chat_id": chat_id,
                    "is_typing": is_typing,
                }),
            );
        }
        ClientFrame::StatusChange { status } => {
            if status == "away" {
                state.realtime.set_away(user_id).await;
            } else {
                state.realtime.set_active(user_id).await;
            }
        }
    }
}
