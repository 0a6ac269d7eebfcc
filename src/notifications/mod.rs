//! Notification persistence and REST surface.
//!
//! The store is the durability backstop for the realtime fan-out: `notify`
//! persists here first, then pushes live. Clients that missed the push fetch
//! from these endpoints on their next poll/reconnect.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::DbPool;
use crate::db::models::NotificationRow;
use crate::realtime::error::StoreError;
use crate::realtime::{Notification, NotificationStore};
use crate::state::AppState;

/// SQLite-backed notification store.
pub struct SqliteNotificationStore {
    db: DbPool,
}

impl SqliteNotificationStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

fn to_notification(row: NotificationRow) -> Notification {
    Notification {
        id: row.id,
        recipient_id: row.recipient_id,
        payload: serde_json::from_str(&row.payload).unwrap_or(Value::Null),
        is_read: row.is_read,
        created_at: row.created_at,
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn insert(&self, recipient: &str, payload: &Value) -> Result<Notification, StoreError> {
        let conn = self.db.lock().map_err(|e| format!("DB lock error: {}", e))?;

        let row = NotificationRow {
            id: Uuid::now_v7().to_string(),
            recipient_id: recipient.to_string(),
            payload: serde_json::to_string(payload)?,
            is_read: false,
            created_at: Utc::now().to_rfc3339(),
        };

        conn.execute(
            "INSERT INTO notifications (id, recipient_id, payload, is_read, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            rusqlite::params![row.id, row.recipient_id, row.payload, row.created_at],
        )?;

        Ok(to_notification(row))
    }

    fn mark_read(&self, id: &str, recipient: &str) -> Result<bool, StoreError> {
        let conn = self.db.lock().map_err(|e| format!("DB lock error: {}", e))?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
            rusqlite::params![id, recipient],
        )?;
        Ok(changed > 0)
    }

    fn mark_all_read(&self, recipient: &str) -> Result<usize, StoreError> {
        let conn = self.db.lock().map_err(|e| format!("DB lock error: {}", e))?;
        let changed = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
            rusqlite::params![recipient],
        )?;
        Ok(changed)
    }

    fn list(&self, recipient: &str) -> Result<Vec<Notification>, StoreError> {
        let conn = self.db.lock().map_err(|e| format!("DB lock error: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT id, recipient_id, payload, is_read, created_at
             FROM notifications WHERE recipient_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([recipient], |row| {
            Ok(NotificationRow {
                id: row.get(0)?,
                recipient_id: row.get(1)?,
                payload: row.get(2)?,
                is_read: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
            })
        })?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(to_notification(row?));
        }
        Ok(notifications)
    }
}

// --- REST endpoint handlers ---

/// GET /api/notifications — The caller's notifications, newest first.
/// JWT auth required.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    state
        .realtime
        .notifications(&claims.sub)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list notifications");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: String,
    pub payload: Value,
}

/// POST /api/notifications — Persist a notification for a recipient and push
/// it live to their connected devices. JWT auth required.
/// Body: { "recipient_id": "...", "payload": {...} }
pub async fn create_notification(
    State(state): State<AppState>,
    _claims: Claims,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), StatusCode> {
    match state.realtime.notify(&body.recipient_id, body.payload).await {
        Ok(notification) => Ok((StatusCode::CREATED, Json(notification))),
        Err(e) => {
            tracing::error!(recipient = %body.recipient_id, error = %e, "Failed to create notification");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/notifications/{id}/read — Mark one of the caller's
/// notifications read. JWT auth required.
pub async fn mark_notification_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    match state.realtime.mark_read(&id, &claims.sub).await {
        Ok(true) => Ok(StatusCode::OK),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(id = %id, error = %e, "Failed to mark notification read");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/notifications/read-all — Mark all of the caller's
/// notifications read. JWT auth required.
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<StatusCode, StatusCode> {
    match state.realtime.mark_all_read(&claims.sub).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::error!(error = %e, "Failed to mark notifications read");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
