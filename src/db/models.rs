/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.

/// Notification record in the notifications table. The payload column holds
/// the JSON payload as stored text; decoding happens at the store boundary.
#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub payload: String,
    pub is_read: bool,
    pub created_at: String,
}
