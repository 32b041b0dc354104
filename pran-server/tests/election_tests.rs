//! Master election between device processes that only share the bus
//!
//! Each tab gets its own claim slot, as tabs on different hosts would; the
//! server relays election traffic between their bus connections.

use std::sync::Arc;
use std::time::Duration;

use pran_common::api::digest_token;
use pran_common::client::{BusClient, ClientOptions};
use pran_common::db::init_database;
use pran_common::election::{MasterElection, MemorySlot};
use pran_server::{build_router, AppState};

const PING: Duration = Duration::from_millis(200);

async fn serve() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = init_database(&dir.path().join("pran.db"))
        .await
        .expect("Database should initialize");
    let state = AppState::new(db, digest_token("token"), 64).await.unwrap();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (dir, format!("ws://{}/bus?role=table", addr))
}

async fn wait_connected(client: &BusClient) {
    let mut link = client.connectivity();
    tokio::time::timeout(Duration::from_secs(5), link.wait_for(|up| *up))
        .await
        .expect("timed out waiting for the bus")
        .expect("client task stopped");
}

fn join(client: &BusClient) -> MasterElection {
    MasterElection::start(
        Arc::new(MemorySlot::new()),
        Arc::new(client.siblings()),
        PING,
    )
}

#[tokio::test]
async fn test_claim_before_connect_still_demotes_remote_master() {
    let (_dir, url) = serve().await;

    let (client_a, _events_a) = BusClient::connect(url.clone(), ClientOptions::default());
    wait_connected(&client_a).await;
    let a = join(&client_a);
    a.force_claim().unwrap();

    // B claims before its link is up, so the first announcement is lost
    let (client_b, _events_b) = BusClient::connect(url, ClientOptions::default());
    let b = join(&client_b);
    b.force_claim().unwrap();
    assert!(a.is_master() && b.is_master());

    wait_connected(&client_b).await;
    tokio::time::sleep(PING * 5).await;

    assert!(b.is_master(), "the newest claim keeps audio");
    assert!(!a.is_master(), "the older master must step down");
}

#[tokio::test]
async fn test_connected_tabs_hand_over_on_force_claim() {
    let (_dir, url) = serve().await;

    let (client_a, _events_a) = BusClient::connect(url.clone(), ClientOptions::default());
    let (client_b, _events_b) = BusClient::connect(url, ClientOptions::default());
    wait_connected(&client_a).await;
    wait_connected(&client_b).await;

    let a = join(&client_a);
    let b = join(&client_b);
    a.force_claim().unwrap();
    tokio::time::sleep(PING).await;
    assert!(a.is_master());
    assert!(!b.is_master());

    b.force_claim().unwrap();
    tokio::time::sleep(PING * 3).await;
    assert!(b.is_master());
    assert!(!a.is_master());

    // Later announcements keep the outcome stable
    tokio::time::sleep(PING * 5).await;
    assert_eq!(
        [a.is_master(), b.is_master()],
        [false, true],
        "exactly one master"
    );
}
