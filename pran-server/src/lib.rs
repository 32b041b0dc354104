//! pran-server library - session authority for the installation
//!
//! Hosts the Session State Machine behind the room hub and exposes the
//! Dispatch Bus (WebSocket), the observer stream (SSE), the catalog query
//! surface and the admin override endpoints.

use axum::Router;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use pran_common::catalog::CatalogManifest;
use pran_common::db::catalog::replace_catalog;
use pran_common::EventBus;

pub mod api;
pub mod error;
pub mod hub;
pub mod state_machine;

pub use error::{Error, Result};
pub use hub::Hub;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub hub: Arc<Hub>,
    /// Hex SHA-256 digest of the admin token
    pub admin_digest: Arc<str>,
}

impl AppState {
    /// Restore the session and wire the hub to a new event bus
    pub async fn new(db: SqlitePool, admin_digest: String, event_capacity: usize) -> Result<Self> {
        let bus = EventBus::new(event_capacity);
        let hub = Hub::restore(db.clone(), bus).await?;
        Ok(Self {
            db,
            hub: Arc::new(hub),
            admin_digest: Arc::from(admin_digest),
        })
    }

    pub fn bus(&self) -> &EventBus {
        self.hub.bus()
    }
}

/// Build application router
///
/// Health, session snapshot, catalog, bus and event stream are public; the
/// admin routes require the bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let admin = Router::new()
        .route("/api/admin/force-phase", post(api::admin::force_phase))
        .route("/api/admin/reset", post(api::admin::reset))
        .route("/api/admin/pause", post(api::admin::pause))
        .route("/api/admin/resume", post(api::admin::resume))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/bus", get(api::ws::bus_socket))
        .route("/api/events", get(api::sse::event_stream))
        .route("/api/session", get(api::session::get_session))
        .route("/api/catalog/audio/:category", get(api::catalog::list_clips))
        .route("/api/catalog/audio/clip/:id", get(api::catalog::get_clip))
        .route("/api/catalog/prans/:category", get(api::catalog::list_prans))
        .merge(api::health_routes());

    Router::new()
        .merge(admin)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Replace the catalog with the contents of a TOML manifest
///
/// Returns the number of clips and prans loaded.
pub async fn seed_catalog(db: &SqlitePool, manifest_path: &Path) -> Result<(usize, usize)> {
    let content = std::fs::read_to_string(manifest_path).map_err(pran_common::Error::from)?;
    let manifest = CatalogManifest::from_toml_str(&content)?;
    replace_catalog(db, &manifest).await?;

    info!(
        "Seeded catalog from {}: {} clips, {} prans",
        manifest_path.display(),
        manifest.clips.len(),
        manifest.prans.len()
    );
    Ok((manifest.clips.len(), manifest.prans.len()))
}
