//! Interested-party directory backed by SQLite.
//!
//! Resolves the rooms that should hear about an identity's presence
//! transitions: the personal notification room of every user who has the
//! identity in their contact list, plus the room of every team the identity
//! belongs to. Queried fresh on every transition so announcements follow
//! current relationships.

use crate::db::DbPool;
use crate::realtime::error::StoreError;
use crate::realtime::presence::InterestDirectory;
use crate::realtime::{entity_room, notification_room};

pub struct SqliteDirectory {
    db: DbPool,
}

impl SqliteDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl InterestDirectory for SqliteDirectory {
    fn interested_rooms_for(&self, identity: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.db.lock().map_err(|e| format!("DB lock error: {}", e))?;

        let mut rooms = Vec::new();

        // Users who have this identity as a contact
        let mut stmt = conn.prepare("SELECT user_id FROM contacts WHERE contact_id = ?1")?;
        let watchers = stmt.query_map([identity], |row| row.get::<_, String>(0))?;
        for watcher in watchers {
            rooms.push(notification_room(&watcher?));
        }

        // Teams the identity belongs to
        let mut stmt = conn.prepare("SELECT team_id FROM team_members WHERE user_id = ?1")?;
        let teams = stmt.query_map([identity], |row| row.get::<_, String>(0))?;
        for team_id in teams {
            rooms.push(entity_room("team", &team_id?));
        }

        Ok(rooms)
    }
}
