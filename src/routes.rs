use axum::{middleware, Json, Router};
use serde::Serialize;

use crate::auth::middleware::{Claims, JwtSecret};
use crate::notifications;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// One entry in the presence snapshot.
#[derive(Debug, Serialize)]
pub struct PresenceEntry {
    pub identity: String,
    pub status: &'static str,
}

/// GET /api/presence — Current presence for all online/away identities.
/// Used by clients as the initial snapshot; later changes arrive as
/// presence-changed events. JWT auth required.
async fn get_presence(
    axum::extract::State(state): axum::extract::State<AppState>,
    _claims: Claims,
) -> Json<Vec<PresenceEntry>> {
    let entries = state
        .realtime
        .presence_snapshot()
        .into_iter()
        .map(|(identity, status)| PresenceEntry {
            identity,
            status: status.as_str(),
        })
        .collect();
    Json(entries)
}

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Authenticated routes (JWT required — Claims extractor validates token)
    let api_routes = Router::new()
        .route(
            "/api/notifications",
            axum::routing::get(notifications::list_notifications),
        )
        .route(
            "/api/notifications",
            axum::routing::post(notifications::create_notification),
        )
        .route(
            "/api/notifications/{id}/read",
            axum::routing::post(notifications::mark_notification_read),
        )
        .route(
            "/api/notifications/read-all",
            axum::routing::post(notifications::mark_all_notifications_read),
        )
        .route("/api/presence", axum::routing::get(get_presence));

    // WebSocket endpoint (auth via query param, not JWT header)
    let ws_routes = Router::new().route("/ws", axum::routing::get(ws_handler::ws_upgrade));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(api_routes)
        .merge(ws_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
