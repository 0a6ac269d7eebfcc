use std::sync::Arc;

use crate::db::DbPool;
use crate::realtime::RealtimeHub;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Realtime core: connection registry, rooms, presence, dispatch
    pub realtime: Arc<RealtimeHub>,
}
