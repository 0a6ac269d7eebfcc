//! Connection registry: tracks all live transport connections per identity.
//! A user can have multiple concurrent connections (multiple devices/tabs).

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::error::RealtimeError;
use super::ConnectionSender;

/// One live transport session. Belongs to exactly one identity for its
/// lifetime; the sender is the delivery handle the dispatcher pushes frames
/// through.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: String,
    pub identity: String,
    pub sender: ConnectionSender,
    pub created_at: DateTime<Utc>,
}

/// Registry of live connections, indexed both by connection id and by owning
/// identity. The registry itself performs no broadcasting — presence and
/// dispatch side effects are orchestrated by the hub.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// connection id -> connection
    connections: DashMap<String, Connection>,
    /// identity -> connection ids owned by that identity
    by_identity: DashMap<String, Vec<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection with an empty room set.
    /// Fails if the connection id is already taken. Returns the identity's
    /// connection count after the insert, computed under the identity entry
    /// guard — callers detecting the first connection must use this value,
    /// not a separate count read that could interleave with a concurrent
    /// register on another worker.
    pub fn register(
        &self,
        identity: &str,
        connection_id: &str,
        sender: ConnectionSender,
    ) -> Result<usize, RealtimeError> {
        match self.connections.entry(connection_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(RealtimeError::DuplicateConnection(connection_id.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Connection {
                    id: connection_id.to_string(),
                    identity: identity.to_string(),
                    sender,
                    created_at: Utc::now(),
                });
            }
        }

        let count = {
            let mut ids = self.by_identity.entry(identity.to_string()).or_default();
            ids.push(connection_id.to_string());
            ids.len()
        };

        tracing::debug!(
            identity = %identity,
            connection_id = %connection_id,
            connections = count,
            "Connection registered"
        );
        Ok(count)
    }

    /// Remove a connection. Idempotent — returns None if the id was already
    /// absent. Room teardown and presence re-evaluation are the hub's job.
    pub fn unregister(&self, connection_id: &str) -> Option<Connection> {
        let (_, connection) = self.connections.remove(connection_id)?;

        let mut remove_identity = false;
        if let Some(mut ids) = self.by_identity.get_mut(&connection.identity) {
            ids.retain(|id| id != connection_id);
            if ids.is_empty() {
                remove_identity = true;
            }
        }
        if remove_identity {
            self.by_identity.remove(&connection.identity);
        }

        tracing::debug!(
            identity = %connection.identity,
            connection_id = %connection_id,
            "Connection unregistered"
        );
        Some(connection)
    }

    /// Look up a single connection by id.
    pub fn get(&self, connection_id: &str) -> Option<Connection> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    /// All live connections owned by an identity, across devices.
    pub fn connections_of(&self, identity: &str) -> Vec<Connection> {
        // Snapshot the id list first so no guard is held across the second map.
        let ids: Vec<String> = match self.by_identity.get(identity) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|c| c.clone()))
            .collect()
    }

    pub fn connection_count(&self, identity: &str) -> usize {
        self.by_identity.get(identity).map(|ids| ids.len()).unwrap_or(0)
    }

    /// True iff the identity owns at least one live connection.
    pub fn is_online(&self, identity: &str) -> bool {
        self.connection_count(identity) > 0
    }
}
