//! Audio and pran catalog queries
//!
//! This is the query surface the core consumes: clips per category in sequence
//! order, a clip by id, and the pran options of a category.

use crate::catalog::{AudioClip, CatalogManifest, ClipCategory, CuePoint, Pran};
use crate::session::Category;
use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

type ClipRow = (i64, String, i64, String, String, Option<String>, Option<i64>);
type PranRow = (i64, String, i64, String);

/// List clips for a category sorted by sequence
pub async fn list_clips(db: &SqlitePool, category: ClipCategory) -> Result<Vec<AudioClip>> {
    let rows = sqlx::query_as::<_, ClipRow>(
        r#"
        SELECT id, category, sequence, file_path, cue_point, script_text, duration_ms
        FROM audio_clips
        WHERE category = ?
        ORDER BY sequence ASC
        "#,
    )
    .bind(category.as_str())
    .fetch_all(db)
    .await?;

    rows.into_iter().map(clip_from_row).collect()
}

/// Get a clip by id
pub async fn get_clip(db: &SqlitePool, id: i64) -> Result<Option<AudioClip>> {
    let row = sqlx::query_as::<_, ClipRow>(
        r#"
        SELECT id, category, sequence, file_path, cue_point, script_text, duration_ms
        FROM audio_clips
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(clip_from_row).transpose()
}

/// List pran options for a category sorted by slot
pub async fn list_prans(db: &SqlitePool, category: Category) -> Result<Vec<Pran>> {
    let rows = sqlx::query_as::<_, PranRow>(
        "SELECT id, category, sequence, label FROM prans WHERE category = ? ORDER BY sequence ASC",
    )
    .bind(category.as_str())
    .fetch_all(db)
    .await?;

    rows.into_iter().map(pran_from_row).collect()
}

/// Get a pran by global id
pub async fn get_pran(db: &SqlitePool, id: u8) -> Result<Option<Pran>> {
    let row = sqlx::query_as::<_, PranRow>(
        "SELECT id, category, sequence, label FROM prans WHERE id = ?",
    )
    .bind(i64::from(id))
    .fetch_optional(db)
    .await?;

    row.map(pran_from_row).transpose()
}

/// Replace the whole catalog with a validated manifest in one transaction
pub async fn replace_catalog(db: &SqlitePool, manifest: &CatalogManifest) -> Result<()> {
    manifest.validate()?;

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM audio_clips").execute(&mut *tx).await?;
    sqlx::query("DELETE FROM prans").execute(&mut *tx).await?;

    for clip in &manifest.clips {
        sqlx::query(
            r#"
            INSERT INTO audio_clips (id, category, sequence, file_path, cue_point, script_text, duration_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(clip.id)
        .bind(clip.category.as_str())
        .bind(i64::from(clip.sequence))
        .bind(&clip.file_path)
        .bind(clip.cue_point.as_str())
        .bind(clip.script_text.as_deref())
        .bind(clip.duration_ms.map(|d| d as i64))
        .execute(&mut *tx)
        .await?;
    }

    for pran in &manifest.prans {
        sqlx::query("INSERT INTO prans (id, category, sequence, label) VALUES (?, ?, ?, ?)")
            .bind(i64::from(pran.id))
            .bind(pran.category.as_str())
            .bind(i64::from(pran.sequence))
            .bind(&pran.label)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(
        "Catalog replaced: {} clips, {} prans",
        manifest.clips.len(),
        manifest.prans.len()
    );
    Ok(())
}

fn clip_from_row(row: ClipRow) -> Result<AudioClip> {
    let (id, category, sequence, file_path, cue_point, script_text, duration_ms) = row;
    Ok(AudioClip {
        id,
        category: category.parse::<ClipCategory>()?,
        sequence: u32::try_from(sequence)
            .map_err(|_| Error::Internal(format!("Clip {} has invalid sequence", id)))?,
        file_path,
        cue_point: cue_point.parse::<CuePoint>()?,
        script_text,
        duration_ms: duration_ms.map(|d| d.max(0) as u64),
    })
}

fn pran_from_row(row: PranRow) -> Result<Pran> {
    let (id, category, sequence, label) = row;
    Ok(Pran {
        id: u8::try_from(id).map_err(|_| Error::Internal(format!("Invalid pran id {}", id)))?,
        category: category.parse::<Category>()?,
        sequence: u8::try_from(sequence)
            .map_err(|_| Error::Internal(format!("Pran {} has invalid sequence", id)))?,
        label,
    })
}
