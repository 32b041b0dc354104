//! Database initialization, session persistence and catalog query tests

use pran_common::api::{load_or_init_admin_digest, token_matches};
use pran_common::catalog::{AudioClip, CatalogManifest, ClipCategory, CuePoint, Pran};
use pran_common::db::{catalog, init_database, session, settings};
use pran_common::{AgeGroup, Category, Mood, Phase, SessionSnapshot, ROOM_KEY};
use sqlx::SqlitePool;

async fn setup_db() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("tempdir");
    let pool = init_database(&dir.path().join("pran.db"))
        .await
        .expect("Database should initialize");
    (dir, pool)
}

fn clip(id: i64, category: ClipCategory, sequence: u32, cue_point: CuePoint) -> AudioClip {
    AudioClip {
        id,
        category,
        sequence,
        file_path: format!("audio/{}/{}.mp3", category.as_str().to_lowercase(), sequence),
        cue_point,
        script_text: Some(format!("line {}", sequence)),
        duration_ms: Some(3000),
    }
}

fn manifest() -> CatalogManifest {
    CatalogManifest {
        clips: vec![
            clip(12, ClipCategory::Negative, 3, CuePoint::PranSelection),
            clip(10, ClipCategory::Negative, 1, CuePoint::ShowNegImages),
            clip(11, ClipCategory::Negative, 2, CuePoint::None),
            clip(1, ClipCategory::Common, 1, CuePoint::None),
            clip(2, ClipCategory::Common, 2, CuePoint::MoodSelection),
        ],
        prans: vec![
            Pran {
                id: 1,
                category: Category::Negative,
                sequence: 1,
                label: "I will ask for help".to_string(),
            },
            Pran {
                id: 2,
                category: Category::Negative,
                sequence: 2,
                label: "I will take a breath".to_string(),
            },
        ],
    }
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pran.db");

    let first = init_database(&path).await.unwrap();
    first.close().await;

    let second = init_database(&path).await.unwrap();
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&second)
            .await
            .unwrap();

    for expected in ["audio_clips", "prans", "session", "settings"] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_session_defaults_then_round_trips() {
    let (_dir, db) = setup_db().await;

    let initial = session::load_session(&db, ROOM_KEY).await.unwrap();
    assert_eq!(initial, SessionSnapshot::default());

    let updated = SessionSnapshot {
        age_group: Some(AgeGroup::Kids),
        mood: Some(Mood::Sad),
        category: Some(Category::Negative),
        pran: Some(3),
        current_phase: Phase::PranSelection,
        current_audio: Some("audio/negative/4.mp3".to_string()),
    };
    session::save_session(&db, ROOM_KEY, &updated).await.unwrap();

    let loaded = session::load_session(&db, ROOM_KEY).await.unwrap();
    assert_eq!(loaded, updated);
}

#[tokio::test]
async fn test_session_table_rejects_inconsistent_rows() {
    let (_dir, db) = setup_db().await;

    let broken = SessionSnapshot {
        pran: Some(1),
        ..Default::default()
    };
    assert!(session::save_session(&db, ROOM_KEY, &broken).await.is_err());
}

#[tokio::test]
async fn test_catalog_lists_in_sequence_order() {
    let (_dir, db) = setup_db().await;
    catalog::replace_catalog(&db, &manifest()).await.unwrap();

    let negative = catalog::list_clips(&db, ClipCategory::Negative).await.unwrap();
    let sequences: Vec<u32> = negative.iter().map(|c| c.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(negative[2].cue_point, CuePoint::PranSelection);

    let clip = catalog::get_clip(&db, 2).await.unwrap().expect("clip 2 exists");
    assert_eq!(clip.cue_point, CuePoint::MoodSelection);
    assert!(catalog::get_clip(&db, 99).await.unwrap().is_none());

    let prans = catalog::list_prans(&db, Category::Negative).await.unwrap();
    assert_eq!(prans.len(), 2);
    assert!(catalog::list_prans(&db, Category::Positive).await.unwrap().is_empty());
    assert_eq!(catalog::get_pran(&db, 2).await.unwrap().unwrap().sequence, 2);
}

#[tokio::test]
async fn test_replace_catalog_rejects_gaps_without_touching_rows() {
    let (_dir, db) = setup_db().await;
    catalog::replace_catalog(&db, &manifest()).await.unwrap();

    let mut broken = manifest();
    broken.clips.retain(|c| c.id != 11);
    assert!(catalog::replace_catalog(&db, &broken).await.is_err());

    let negative = catalog::list_clips(&db, ClipCategory::Negative).await.unwrap();
    assert_eq!(negative.len(), 3);
}

#[tokio::test]
async fn test_settings_round_trip() {
    let (_dir, db) = setup_db().await;

    assert_eq!(settings::get_setting::<String>(&db, "missing").await.unwrap(), None);
    settings::set_setting(&db, "answer", 42).await.unwrap();
    settings::set_setting(&db, "answer", 43).await.unwrap();
    assert_eq!(settings::get_setting::<i64>(&db, "answer").await.unwrap(), Some(43));
}

#[tokio::test]
async fn test_admin_digest_generated_once_then_reused() {
    let (_dir, db) = setup_db().await;

    let (digest, generated) = load_or_init_admin_digest(&db, None).await.unwrap();
    let token = generated.expect("first start generates a token");
    assert!(token_matches(&token, &digest));

    let (again, generated) = load_or_init_admin_digest(&db, None).await.unwrap();
    assert_eq!(again, digest);
    assert!(generated.is_none());

    let (configured, generated) = load_or_init_admin_digest(&db, Some("console")).await.unwrap();
    assert!(generated.is_none());
    assert!(token_matches("console", &configured));
    assert!(!token_matches(&token, &configured));
}
