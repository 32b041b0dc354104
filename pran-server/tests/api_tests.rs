//! Integration tests for the pran-server HTTP API and Dispatch Bus
//!
//! Covers health, session snapshot, catalog queries, admin auth and overrides,
//! and a live WebSocket relay between two devices.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

use pran_common::api::digest_token;
use pran_common::catalog::{AudioClip, CatalogManifest, ClipCategory, CuePoint, Pran};
use pran_common::db::{catalog::replace_catalog, init_database};
use pran_common::Category;
use pran_server::{build_router, AppState};

const TOKEN: &str = "test-admin-token";

async fn setup() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = init_database(&dir.path().join("pran.db"))
        .await
        .expect("Database should initialize");

    let clip = |id: i64, category: ClipCategory, sequence: u32, cue_point: CuePoint| AudioClip {
        id,
        category,
        sequence,
        file_path: format!("audio/{}/{}.mp3", category.as_str().to_lowercase(), sequence),
        cue_point,
        script_text: None,
        duration_ms: Some(1500),
    };

    let manifest = CatalogManifest {
        clips: vec![
            clip(2, ClipCategory::Common, 2, CuePoint::MoodSelection),
            clip(1, ClipCategory::Common, 1, CuePoint::None),
            clip(10, ClipCategory::Negative, 1, CuePoint::ShowNegImages),
        ],
        prans: vec![Pran {
            id: 1,
            category: Category::Negative,
            sequence: 1,
            label: "I will ask for help".to_string(),
        }],
    };
    replace_catalog(&db, &manifest).await.unwrap();

    let state = AppState::new(db, digest_token(TOKEN), 64).await.unwrap();
    (dir, state)
}

async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let mut request = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        request = request.header("authorization", format!("Bearer {}", token));
    }

    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json_body = if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(&bytes).ok()
    };
    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, state) = setup().await;
    let app = build_router(state);

    let (status, body) = make_request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pran-server");
    assert!(body["version"].is_string());
    assert_eq!(body["phase"], "INIT");
    assert_eq!(body["subscribers"], 0);
}

#[tokio::test]
async fn test_health_reports_live_phase() {
    let (_dir, state) = setup().await;
    let app = build_router(state.clone());

    let (status, _) = make_request(
        &app,
        "POST",
        "/api/admin/force-phase",
        Some(TOKEN),
        Some(json!({ "phase": "COMMON_FLOW" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let _observer = state.bus().subscribe();
    let (status, body) = make_request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["phase"], "COMMON_FLOW");
    assert_eq!(body["subscribers"], 1);
}

#[tokio::test]
async fn test_session_snapshot_starts_at_init() {
    let (_dir, state) = setup().await;
    let app = build_router(state);

    let (status, body) = make_request(&app, "GET", "/api/session", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["currentPhase"], "INIT");
    assert!(body["mood"].is_null());
    assert!(body["pran"].is_null());
}

#[tokio::test]
async fn test_catalog_queries() {
    let (_dir, state) = setup().await;
    let app = build_router(state);

    let (status, body) = make_request(&app, "GET", "/api/catalog/audio/common", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let clips = body.unwrap();
    assert_eq!(clips[0]["sequence"], 1);
    assert_eq!(clips[1]["sequence"], 2);
    assert_eq!(clips[1]["cuePoint"], "MOOD_SELECTION");

    let (status, body) = make_request(&app, "GET", "/api/catalog/audio/clip/10", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["category"], "NEGATIVE");

    let (status, _) = make_request(&app, "GET", "/api/catalog/audio/clip/99", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = make_request(&app, "GET", "/api/catalog/audio/joyful", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = make_request(&app, "GET", "/api/catalog/prans/NEGATIVE", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()[0]["label"], "I will ask for help");
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let (_dir, state) = setup().await;
    let app = build_router(state);

    let (status, body) = make_request(&app, "POST", "/api/admin/reset", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.unwrap()["error"].is_string());

    let (status, _) = make_request(&app, "POST", "/api/admin/reset", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = make_request(&app, "POST", "/api/admin/reset", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["currentPhase"], "INIT");
}

#[tokio::test]
async fn test_force_phase_rules() {
    let (_dir, state) = setup().await;
    let app = build_router(state.clone());

    let (status, body) = make_request(
        &app,
        "POST",
        "/api/admin/force-phase",
        Some(TOKEN),
        Some(json!({"phase": "PRAN_SELECTION"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("category"));

    let (status, body) = make_request(
        &app,
        "POST",
        "/api/admin/force-phase",
        Some(TOKEN),
        Some(json!({"phase": "COMMON_FLOW"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["currentPhase"], "COMMON_FLOW");

    // Forcing the current phase broadcasts nothing
    let mut rx = state.bus().subscribe();
    let (status, _) = make_request(
        &app,
        "POST",
        "/api/admin/force-phase",
        Some(TOKEN),
        Some(json!({"phase": "COMMON_FLOW"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_pause_broadcasts_to_devices() {
    let (_dir, state) = setup().await;
    let mut rx = state.bus().subscribe();
    let app = build_router(state);

    let (status, _) = make_request(&app, "POST", "/api/admin/pause", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let envelope = rx.try_recv().expect("pause should be broadcast");
    assert_eq!(envelope.event.event_type(), "audio_pause");
    assert!(envelope.origin.is_none());
}

async fn next_json<S>(stream: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for bus frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_bus_relays_between_devices() {
    let (_dir, state) = setup().await;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (table, _) = connect_async(format!("ws://{}/bus?role=table", addr))
        .await
        .unwrap();
    let (mirror, _) = connect_async(format!("ws://{}/bus?role=mirror", addr))
        .await
        .unwrap();
    let (mut table_tx, mut table_rx) = table.split();
    let (mut mirror_tx, mut mirror_rx) = mirror.split();

    // Snapshot requests are answered to the requester
    mirror_tx
        .send(Message::Text(json!({"type": "get_session"}).to_string().into()))
        .await
        .unwrap();
    let snapshot = next_json(&mut mirror_rx).await;
    assert_eq!(snapshot["type"], "session_state");
    assert_eq!(snapshot["currentPhase"], "INIT");

    table_tx
        .send(Message::Text(
            json!({"type": "age_selected", "ageGroup": "KIDS"}).to_string().into(),
        ))
        .await
        .unwrap();

    // The mirror sees the relayed selection, then the phase change and snapshot
    assert_eq!(next_json(&mut mirror_rx).await["type"], "age_selected");
    let phase = next_json(&mut mirror_rx).await;
    assert_eq!(phase["type"], "phase_changed");
    assert_eq!(phase["phase"], "AGE_SELECTION");
    assert_eq!(next_json(&mut mirror_rx).await["type"], "session_state");

    // The table does not get its own event back
    let first_for_table = next_json(&mut table_rx).await;
    assert_eq!(first_for_table["type"], "phase_changed");

    // force_phase from a device without the admin token is dropped
    mirror_tx
        .send(Message::Text(
            json!({"type": "force_phase", "phase": "ENDING"}).to_string().into(),
        ))
        .await
        .unwrap();
    mirror_tx
        .send(Message::Text(json!({"type": "get_session"}).to_string().into()))
        .await
        .unwrap();
    let snapshot = next_json(&mut mirror_rx).await;
    assert_eq!(snapshot["currentPhase"], "AGE_SELECTION");
}
