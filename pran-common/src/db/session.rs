//! Persisted session record
//!
//! One row per room key. The server restores it on start and rewrites it after
//! every accepted transition.

use crate::session::{AgeGroup, Category, Mood, Phase, SessionSnapshot};
use crate::{Error, Result};
use sqlx::SqlitePool;

type SessionRow = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
);

/// Load the session for `room_key`, creating a default row when absent
pub async fn load_session(db: &SqlitePool, room_key: &str) -> Result<SessionSnapshot> {
    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        SELECT current_phase, age_group, mood, category, pran, current_audio
        FROM session
        WHERE room_key = ?
        "#,
    )
    .bind(room_key)
    .fetch_optional(db)
    .await?;

    match row {
        Some(row) => from_row(row),
        None => {
            let snapshot = SessionSnapshot::default();
            save_session(db, room_key, &snapshot).await?;
            Ok(snapshot)
        }
    }
}

/// Insert or replace the session row
pub async fn save_session(db: &SqlitePool, room_key: &str, snapshot: &SessionSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO session (room_key, current_phase, age_group, mood, category, pran, current_audio, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(room_key) DO UPDATE SET
            current_phase = excluded.current_phase,
            age_group = excluded.age_group,
            mood = excluded.mood,
            category = excluded.category,
            pran = excluded.pran,
            current_audio = excluded.current_audio,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(room_key)
    .bind(snapshot.current_phase.as_str())
    .bind(snapshot.age_group.map(|a| a.as_str()))
    .bind(snapshot.mood.map(|m| m.as_str()))
    .bind(snapshot.category.map(|c| c.as_str()))
    .bind(snapshot.pran.map(i64::from))
    .bind(snapshot.current_audio.as_deref())
    .bind(chrono::Utc::now())
    .execute(db)
    .await?;

    Ok(())
}

fn from_row(row: SessionRow) -> Result<SessionSnapshot> {
    let (phase, age_group, mood, category, pran, current_audio) = row;

    let pran = pran
        .map(|p| {
            u8::try_from(p).map_err(|_| Error::Internal(format!("Stored pran out of range: {}", p)))
        })
        .transpose()?;

    Ok(SessionSnapshot {
        current_phase: phase.parse::<Phase>()?,
        age_group: age_group.map(|s| s.parse::<AgeGroup>()).transpose()?,
        mood: mood.map(|s| s.parse::<Mood>()).transpose()?,
        category: category.map(|s| s.parse::<Category>()).transpose()?,
        pran,
        current_audio,
    })
}
