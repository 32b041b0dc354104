//! Database initialization
//!
//! Creates the database file on first run and brings the schema up idempotently
//! on every start, so the server can be pointed at an empty root folder.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // Session writes come from the hub while catalog reads are served concurrently
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_session_table(pool).await?;
    create_audio_clips_table(pool).await?;
    create_prans_table(pool).await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_session_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session (
            room_key TEXT PRIMARY KEY,
            current_phase TEXT NOT NULL DEFAULT 'INIT',
            age_group TEXT,
            mood TEXT,
            category TEXT,
            pran INTEGER,
            current_audio TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (category IS NULL OR mood IS NOT NULL),
            CHECK (pran IS NULL OR category IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audio_clips_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audio_clips (
            id INTEGER PRIMARY KEY,
            category TEXT NOT NULL CHECK (category IN ('COMMON', 'POSITIVE', 'NEGATIVE', 'NEUTRAL')),
            sequence INTEGER NOT NULL CHECK (sequence >= 1),
            file_path TEXT NOT NULL,
            cue_point TEXT NOT NULL DEFAULT 'NONE',
            script_text TEXT,
            duration_ms INTEGER,
            UNIQUE (category, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_prans_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prans (
            id INTEGER PRIMARY KEY CHECK (id BETWEEN 1 AND 12),
            category TEXT NOT NULL CHECK (category IN ('POSITIVE', 'NEGATIVE', 'NEUTRAL')),
            sequence INTEGER NOT NULL CHECK (sequence BETWEEN 1 AND 4),
            label TEXT NOT NULL,
            UNIQUE (category, sequence)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
