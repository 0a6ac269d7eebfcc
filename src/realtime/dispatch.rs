//! Event dispatcher: fans a typed event out to every connection in a room,
//! or to every device of one identity.
//!
//! Delivery is fire-and-forget per connection. Events are never stored; if
//! nobody is subscribed when an event is emitted it is dropped (at-most-once,
//! no replay — a deliberate design choice, not a gap). Within one room,
//! frames reach each member in the order the broadcast calls were made.

use axum::extract::ws::Message;
use serde::Serialize;
use serde_json::Value;

use super::registry::{Connection, ConnectionRegistry};
use super::rooms::RoomTable;

/// Wire envelope for server-pushed events: `{ "kind": ..., "payload": ... }`.
/// Framing beyond this is the transport's concern.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    kind: &'a str,
    payload: &'a Value,
}

/// Broadcast an event to every connection currently in a room.
/// An unknown or empty room is a silent no-op. A failed send to one
/// connection is logged and never prevents delivery to the others.
pub fn broadcast(
    registry: &ConnectionRegistry,
    rooms: &RoomTable,
    room: &str,
    kind: &str,
    payload: &Value,
) {
    let members = rooms.members_of(room);
    if members.is_empty() {
        return;
    }

    let Some(frame) = encode(kind, payload) else {
        return;
    };

    for connection_id in members {
        // A member may have unregistered between the snapshot and now;
        // delivery to a gone connection degrades to a no-op.
        if let Some(connection) = registry.get(&connection_id) {
            deliver(&connection, frame.clone());
        }
    }
}

/// Deliver an event to every live connection of one identity (multi-device
/// fan-out). An offline identity is a silent no-op.
pub fn broadcast_to_identity(
    registry: &ConnectionRegistry,
    identity: &str,
    kind: &str,
    payload: &Value,
) {
    let connections = registry.connections_of(identity);
    if connections.is_empty() {
        return;
    }

    let Some(frame) = encode(kind, payload) else {
        return;
    };

    for connection in connections {
        deliver(&connection, frame.clone());
    }
}

fn encode(kind: &str, payload: &Value) -> Option<Message> {
    match serde_json::to_string(&Envelope { kind, payload }) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::warn!(kind = %kind, error = %e, "Failed to encode event envelope");
            None
        }
    }
}

fn deliver(connection: &Connection, frame: Message) {
    if connection.sender.send(frame).is_err() {
        // Receiver dropped — the connection's writer task has exited.
        tracing::debug!(
            connection_id = %connection.id,
            identity = %connection.identity,
            "Event delivery failed, connection closing"
        );
    }
}
