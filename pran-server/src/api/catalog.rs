//! Catalog query surface
//!
//! Read-only; the catalog is owned by the seeding tool, not by the session.

use axum::{
    extract::{Path, State},
    Json,
};

use pran_common::catalog::{AudioClip, ClipCategory, Pran};
use pran_common::db::catalog;
use pran_common::Category;

use crate::error::{Error, Result};
use crate::AppState;

/// GET /api/catalog/audio/:category
///
/// Clips sorted by ascending sequence.
pub async fn list_clips(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<AudioClip>>> {
    let category: ClipCategory = category.to_uppercase().parse()?;
    Ok(Json(catalog::list_clips(&state.db, category).await?))
}

/// GET /api/catalog/audio/clip/:id
pub async fn get_clip(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AudioClip>> {
    catalog::get_clip(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound(format!("clip {}", id)))
}

/// GET /api/catalog/prans/:category
pub async fn list_prans(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Pran>>> {
    let category: Category = category.to_uppercase().parse()?;
    Ok(Json(catalog::list_prans(&state.db, category).await?))
}
