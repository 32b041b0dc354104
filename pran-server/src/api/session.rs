//! Session snapshot endpoint

use axum::{extract::State, Json};

use pran_common::SessionSnapshot;

use crate::AppState;

/// GET /api/session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.hub.snapshot().await)
}
