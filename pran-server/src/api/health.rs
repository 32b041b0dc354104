//! Liveness plus a glance at the room

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use pran_common::Phase;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Phase of the live session
    pub phase: Phase,
    /// Open bus and event-stream subscriptions
    pub subscribers: usize,
}

/// GET /health
///
/// Does NOT require authentication.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let session = state.hub.snapshot().await;
    Json(HealthResponse {
        status: "ok",
        module: "pran-server",
        version: env!("CARGO_PKG_VERSION"),
        phase: session.current_phase,
        subscribers: state.bus().subscriber_count(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
