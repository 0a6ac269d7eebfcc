//! Realtime core: connection registry, room membership, presence tracking,
//! event dispatch, and notification fan-out.
//!
//! All process-wide realtime state lives inside a constructed [`RealtimeHub`]
//! rather than a global singleton, so tests can spin up independent
//! instances. The hub is the only writer of the underlying maps; transport
//! and route handlers go through its methods.

pub mod dispatch;
pub mod error;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod rooms;

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;

pub use error::RealtimeError;
pub use notify::{Notification, NotificationStore};
pub use presence::{InterestDirectory, PresenceStatus};

use registry::{Connection, ConnectionRegistry};
use rooms::RoomTable;

/// Sender half of a connection's outbound frame channel. The transport's
/// writer task owns the receiving end; anything holding a clone of this can
/// push frames to that client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Room name for a domain entity, e.g. `entity:task:42`.
/// Must stay bit-exact — connected clients derive the same names.
pub fn entity_room(kind: &str, id: &str) -> String {
    format!("entity:{}:{}", kind, id)
}

/// Personal notification room for an identity, e.g. `notifications:u1`.
pub fn notification_room(identity: &str) -> String {
    format!("notifications:{}", identity)
}

/// The realtime hub. Owns registry, room table, and presence state;
/// orchestrates the side effects between them (disconnect => room teardown
/// => presence re-evaluation => fan-out).
pub struct RealtimeHub {
    registry: ConnectionRegistry,
    rooms: RoomTable,
    presence: presence::PresenceTracker,
    directory: Arc<dyn InterestDirectory>,
    store: Arc<dyn NotificationStore>,
}

impl RealtimeHub {
    pub fn new(directory: Arc<dyn InterestDirectory>, store: Arc<dyn NotificationStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomTable::new(),
            presence: presence::PresenceTracker::new(),
            directory,
            store,
        }
    }

    // --- Transport lifecycle ---

    /// Register a freshly authenticated connection. Fires a single `online`
    /// presence transition when this is the identity's first connection;
    /// additional devices of an already-online identity fire none.
    pub async fn connect(
        &self,
        identity: &str,
        connection_id: &str,
        sender: ConnectionSender,
    ) -> Result<(), RealtimeError> {
        // First-connection detection uses the count the register computed
        // under its identity guard; a separate count read here could see a
        // concurrent register from another worker and miss the transition.
        let count = self.registry.register(identity, connection_id, sender)?;
        if count == 1 && self.presence.transition(identity, PresenceStatus::Online) {
            self.announce_presence(identity, PresenceStatus::Online).await;
        }
        Ok(())
    }

    /// Unregister a connection. Idempotent. Tears down its room memberships
    /// and fires a single `offline` transition when it was the identity's
    /// last connection.
    pub async fn disconnect(&self, connection_id: &str) {
        let Some(connection) = self.registry.unregister(connection_id) else {
            return;
        };
        self.rooms.teardown(connection_id);
        if !self.registry.is_online(&connection.identity)
            && self.presence.transition(&connection.identity, PresenceStatus::Offline)
        {
            self.announce_presence(&connection.identity, PresenceStatus::Offline)
                .await;
        }
    }

    // --- Room membership ---

    /// Subscribe a connection to a room. Idempotent for repeat joins.
    pub fn join_room(&self, connection_id: &str, room: &str) -> Result<(), RealtimeError> {
        if self.registry.get(connection_id).is_none() {
            return Err(RealtimeError::UnknownConnection(connection_id.to_string()));
        }
        self.rooms.join(connection_id, room);
        // A disconnect can interleave between the registry check and the
        // join, in which case its teardown ran before the membership existed
        // and the dead id would sit in the room forever. Re-check and undo.
        if self.registry.get(connection_id).is_none() {
            self.rooms.teardown(connection_id);
            return Err(RealtimeError::UnknownConnection(connection_id.to_string()));
        }
        Ok(())
    }

    /// Unsubscribe a connection from a room. Idempotent; a connection that
    /// is already gone is treated as already-left.
    pub fn leave_room(&self, connection_id: &str, room: &str) {
        self.rooms.leave(connection_id, room);
    }

    // --- Presence signals ---

    /// Explicit idle signal from a client. Only meaningful while the
    /// identity is connected; ignored for offline identities.
    pub async fn set_away(&self, identity: &str) {
        if self.registry.is_online(identity)
            && self.presence.transition(identity, PresenceStatus::Away)
        {
            self.announce_presence(identity, PresenceStatus::Away).await;
        }
    }

    /// Explicit active signal: away -> online. No-op unless connected.
    pub async fn set_active(&self, identity: &str) {
        if self.registry.is_online(identity)
            && self.presence.transition(identity, PresenceStatus::Online)
        {
            self.announce_presence(identity, PresenceStatus::Online).await;
        }
    }

    /// Broadcast a presence transition into every interested room. The
    /// local state change has already been applied; if the interested-party
    /// lookup fails, the announcement is skipped and logged, not retried —
    /// a later transition re-broadcasts naturally.
    async fn announce_presence(&self, identity: &str, status: PresenceStatus) {
        let directory = self.directory.clone();
        let ident = identity.to_string();
        let looked_up =
            tokio::task::spawn_blocking(move || directory.interested_rooms_for(&ident)).await;

        let rooms = match looked_up {
            Ok(Ok(rooms)) => rooms,
            Ok(Err(e)) => {
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    "Interested-party lookup failed, presence change not announced"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    error = %e,
                    "Interested-party lookup task failed, presence change not announced"
                );
                return;
            }
        };

        let payload = json!({
            "identity": identity,
            "status": status.as_str(),
            "timestamp": Utc::now().timestamp_millis(),
        });
        for room in rooms {
            self.broadcast(&room, "presence-changed", &payload);
        }
    }

    // --- Event dispatch ---

    /// Broadcast a typed event to every connection in a room. Called by
    /// domain mutation handlers after a commit, and internally for presence
    /// and typing fan-out.
    pub fn broadcast(&self, room: &str, kind: &str, payload: &Value) {
        dispatch::broadcast(&self.registry, &self.rooms, room, kind, payload);
    }

    /// Deliver an event to every device of one identity.
    pub fn broadcast_to_identity(&self, identity: &str, kind: &str, payload: &Value) {
        dispatch::broadcast_to_identity(&self.registry, identity, kind, payload);
    }

    // --- Notification fan-out ---

    /// Persist a notification, then push it live to the recipient's devices.
    /// Persistence failure fails the whole operation; the live push is
    /// best-effort and silently no-ops for an offline recipient.
    pub async fn notify(
        &self,
        recipient: &str,
        payload: Value,
    ) -> Result<Notification, RealtimeError> {
        let store = self.store.clone();
        let rec = recipient.to_string();
        let stored = tokio::task::spawn_blocking(move || store.insert(&rec, &payload))
            .await
            .map_err(|e| RealtimeError::Persistence(Box::new(e)))?
            .map_err(RealtimeError::Persistence)?;

        let event = serde_json::to_value(&stored)
            .unwrap_or_else(|_| json!({ "id": stored.id }));
        self.broadcast_to_identity(recipient, "new_notification", &event);
        Ok(stored)
    }

    /// Mark one notification read. Persisted state only — read-state sync
    /// across devices does not broadcast.
    pub async fn mark_read(&self, id: &str, recipient: &str) -> Result<bool, RealtimeError> {
        let store = self.store.clone();
        let (id, rec) = (id.to_string(), recipient.to_string());
        tokio::task::spawn_blocking(move || store.mark_read(&id, &rec))
            .await
            .map_err(|e| RealtimeError::Persistence(Box::new(e)))?
            .map_err(RealtimeError::Persistence)
    }

    /// Mark all of a recipient's notifications read.
    pub async fn mark_all_read(&self, recipient: &str) -> Result<usize, RealtimeError> {
        let store = self.store.clone();
        let rec = recipient.to_string();
        tokio::task::spawn_blocking(move || store.mark_all_read(&rec))
            .await
            .map_err(|e| RealtimeError::Persistence(Box::new(e)))?
            .map_err(RealtimeError::Persistence)
    }

    /// All notifications for a recipient, newest first.
    pub async fn notifications(&self, recipient: &str) -> Result<Vec<Notification>, RealtimeError> {
        let store = self.store.clone();
        let rec = recipient.to_string();
        tokio::task::spawn_blocking(move || store.list(&rec))
            .await
            .map_err(|e| RealtimeError::Persistence(Box::new(e)))?
            .map_err(RealtimeError::Persistence)
    }

    // --- Introspection ---

    pub fn is_online(&self, identity: &str) -> bool {
        self.registry.is_online(identity)
    }

    pub fn status_of(&self, identity: &str) -> PresenceStatus {
        self.presence.status_of(identity)
    }

    /// Current presence for all online/away identities.
    pub fn presence_snapshot(&self) -> Vec<(String, PresenceStatus)> {
        self.presence.snapshot()
    }

    /// Connection ids currently subscribed to a room.
    pub fn members_of(&self, room: &str) -> Vec<String> {
        self.rooms.members_of(room)
    }

    /// Live connections of an identity.
    pub fn connections_of(&self, identity: &str) -> Vec<Connection> {
        self.registry.connections_of(identity)
    }
}
