//! Admin override endpoints (bearer token required)

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use pran_common::{BusEvent, Phase, SessionSnapshot};

use crate::error::Result;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ForcePhaseRequest {
    pub phase: Phase,
}

/// POST /api/admin/force-phase
///
/// Forcing the current phase is a no-op. Phases whose prerequisites are
/// missing are refused with 409.
pub async fn force_phase(
    State(state): State<AppState>,
    Json(request): Json<ForcePhaseRequest>,
) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.hub.force_phase(request.phase).await?))
}

/// POST /api/admin/reset
pub async fn reset(State(state): State<AppState>) -> Result<Json<SessionSnapshot>> {
    Ok(Json(state.hub.reset().await?))
}

/// POST /api/admin/pause
pub async fn pause(State(state): State<AppState>) -> Json<Value> {
    state.hub.broadcast(BusEvent::AudioPause);
    Json(json!({ "status": "paused" }))
}

/// POST /api/admin/resume
pub async fn resume(State(state): State<AppState>) -> Json<Value> {
    state.hub.broadcast(BusEvent::AudioResume);
    Json(json!({ "status": "resumed" }))
}
