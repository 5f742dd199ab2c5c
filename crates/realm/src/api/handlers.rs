//! HTTP request handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::session::SessionView;
use crate::ws::{PeerInfo, Position};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Sessions currently cached, expired ones included until swept.
    pub sessions: usize,
    /// Live WebSocket connections.
    pub connections: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.sessions.len().await,
        connections: state.registry.len(),
    })
}

/// Resolve the caller's session (minting one if needed), refresh its
/// lifetime and re-issue the cookie.
///
/// GET /api/session
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let resolved = state
        .sessions
        .resolve_or_create(state.cookie.session_id(&headers))
        .await;
    let session = state.sessions.save(&resolved.id, resolved.session).await;
    debug!(created = resolved.created, "Session resolved");

    (
        AppendHeaders([(SET_COOKIE, state.cookie.issue(&resolved.id))]),
        Json(SessionView::from(&session)),
    )
}

/// Delete the caller's session and clear the cookie.
///
/// POST /api/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(session_id) = state.cookie.session_id(&headers) {
        state.sessions.remove(session_id).await;
        info!("Session logged out");
    }

    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, state.cookie.clear())]),
    )
}

/// Snapshot of connected peers.
///
/// GET /api/peers
pub async fn list_peers(State(state): State<AppState>) -> Json<Vec<PeerInfo>> {
    Json(state.registry.snapshot())
}

/// Update the position of the caller's live connection.
///
/// POST /api/position
pub async fn update_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(position): Json<Position>,
) -> ApiResult<StatusCode> {
    let session_id = state
        .cookie
        .session_id(&headers)
        .ok_or_else(|| ApiError::bad_request("missing session cookie"))?;

    state
        .registry
        .update_position(session_id, position.x, position.y)?;

    Ok(StatusCode::NO_CONTENT)
}
