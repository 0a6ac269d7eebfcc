//! Notification records and the persistence seam for notification fan-out.
//!
//! The fan-out itself lives on the hub: persist first (a failure fails the
//! whole operation), then best-effort live push to the recipient's devices.
//! The persisted record is the durability backstop — a recipient that was
//! offline for the push fetches it on the next poll/reconnect.

use serde::Serialize;

use super::error::StoreError;

/// A persisted notification for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    pub created_at: String,
}

/// Persistence collaborator for notifications. Calls may block (database
/// access) and are run on the blocking pool by the hub.
pub trait NotificationStore: Send + Sync + 'static {
    /// Persist a new unread notification and return the stored record.
    fn insert(&self, recipient: &str, payload: &serde_json::Value)
        -> Result<Notification, StoreError>;

    /// Mark one notification read. Returns false if no row matched the
    /// (id, recipient) pair.
    fn mark_read(&self, id: &str, recipient: &str) -> Result<bool, StoreError>;

    /// Mark all of a recipient's notifications read. Returns the number of
    /// rows changed.
    fn mark_all_read(&self, recipient: &str) -> Result<usize, StoreError>;

    /// All notifications for a recipient, newest first.
    fn list(&self, recipient: &str) -> Result<Vec<Notification>, StoreError>;
}
