//! Room membership table: room name <-> set of subscribed connections.
//!
//! Rooms are not persisted entities. They come into existence on first join
//! and disappear when their member set empties. Membership is kept as a
//! bidirectional index so both lookup directions cost O(one room) /
//! O(one connection's rooms) instead of scanning every room.

use std::collections::HashSet;

use dashmap::DashMap;

#[derive(Default)]
pub struct RoomTable {
    /// room name -> member connection ids
    members: DashMap<String, HashSet<String>>,
    /// connection id -> joined room names
    joined: DashMap<String, HashSet<String>>,
}

impl RoomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Idempotent for repeat joins.
    /// Registration of the connection id is checked by the hub before this
    /// is called.
    pub fn join(&self, connection_id: &str, room: &str) {
        self.members
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());
        self.joined
            .entry(connection_id.to_string())
            .or_default()
            .insert(room.to_string());

        tracing::debug!(connection_id = %connection_id, room = %room, "Joined room");
    }

    /// Remove a connection from a room. Idempotent — leaving a room that was
    /// never joined, or leaving after the connection is gone, is a no-op.
    pub fn leave(&self, connection_id: &str, room: &str) {
        let mut drop_room = false;
        if let Some(mut members) = self.members.get_mut(room) {
            members.remove(connection_id);
            drop_room = members.is_empty();
        }
        if drop_room {
            self.members.remove(room);
        }

        let mut drop_connection = false;
        if let Some(mut rooms) = self.joined.get_mut(connection_id) {
            rooms.remove(room);
            drop_connection = rooms.is_empty();
        }
        if drop_connection {
            self.joined.remove(connection_id);
        }
    }

    /// Snapshot of a room's member connection ids. An unknown or emptied
    /// room yields an empty set, never an error.
    pub fn members_of(&self, room: &str) -> Vec<String> {
        self.members
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Room names a connection currently belongs to.
    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.joined
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a connection from every room it belonged to. Called exactly
    /// once per connection, from the hub's unregister path.
    pub fn teardown(&self, connection_id: &str) {
        let rooms = match self.joined.remove(connection_id) {
            Some((_, rooms)) => rooms,
            None => return,
        };
        for room in rooms {
            let mut drop_room = false;
            if let Some(mut members) = self.members.get_mut(&room) {
                members.remove(connection_id);
                drop_room = members.is_empty();
            }
            if drop_room {
                self.members.remove(&room);
            }
        }

        tracing::debug!(connection_id = %connection_id, "Room membership torn down");
    }
}
