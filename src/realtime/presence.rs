//! Presence tracking: derived online/offline/away status per identity.
//!
//! Status is never set directly by clients. It is derived from the
//! connection registry (first connection => online, last disconnect =>
//! offline) plus an explicit idle/active signal (online <-> away) that has
//! no effect on connection count. The hub owns the derivation; this module
//! owns the per-identity state and the interested-party seam.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// Presence status values, serialized with the wire names the Connect
/// client expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

/// Lookup of the rooms that should hear about an identity's presence
/// transitions (contacts + shared teams). Owned by the persistence
/// collaborator; queried fresh on every transition so the announcement
/// reflects current relationships. Calls may block (database access) and
/// are run on the blocking pool by the hub.
pub trait InterestDirectory: Send + Sync + 'static {
    fn interested_rooms_for(&self, identity: &str) -> Result<Vec<String>, StoreError>;
}

/// Per-identity presence state. Identities with no entry are offline;
/// an identity's entry is dropped again when it goes offline, so the map
/// only holds users that are currently online or away.
#[derive(Default)]
pub struct PresenceTracker {
    statuses: DashMap<String, PresenceStatus>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a status transition. Returns false when the identity is
    /// already in the given state, so callers can suppress duplicate
    /// announcements.
    pub fn transition(&self, identity: &str, status: PresenceStatus) -> bool {
        if self.status_of(identity) == status {
            return false;
        }
        if status == PresenceStatus::Offline {
            self.statuses.remove(identity);
        } else {
            self.statuses.insert(identity.to_string(), status);
        }

        tracing::debug!(identity = %identity, status = status.as_str(), "Presence transition");
        true
    }

    pub fn status_of(&self, identity: &str) -> PresenceStatus {
        self.statuses
            .get(identity)
            .map(|s| *s)
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Current presence for all tracked (non-offline) identities.
    pub fn snapshot(&self) -> Vec<(String, PresenceStatus)> {
        self.statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
