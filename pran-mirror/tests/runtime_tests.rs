//! Runtime tests for pran-mirror

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use pran_common::catalog::{ClipCategory, CuePoint};
use pran_common::events::RevealData;
use pran_common::{BusEvent, Category, Mood, Phase, SessionSnapshot};
use pran_mirror::MirrorRuntime;

fn category_flow() -> BusEvent {
    BusEvent::SessionState(SessionSnapshot {
        mood: Some(Mood::Happy),
        category: Some(Category::Positive),
        current_phase: Phase::CategoryFlow,
        ..Default::default()
    })
}

fn reveal(resume: i64) -> BusEvent {
    BusEvent::CueTrigger {
        cue_point: CuePoint::ShowPosImages,
        data: RevealData {
            category: ClipCategory::Positive,
            sequence: 2,
            resume_audio_id: Some(resume),
        }
        .to_value(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_image_display_timer_requests_next_clip() {
    let (bus, inbound) = broadcast::channel(16);
    let (sink, mut sent) = mpsc::unbounded_channel::<BusEvent>();
    let (stop, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(
        MirrorRuntime::new(Duration::from_secs(8), sink).run(inbound, async {
            let _ = stop_rx.await;
        }),
    );

    bus.send(category_flow()).unwrap();
    bus.send(reveal(303)).unwrap();

    tokio::time::sleep(Duration::from_millis(7999)).await;
    assert!(sent.try_recv().is_err());

    let event = tokio::time::timeout(Duration::from_secs(1), sent.recv())
        .await
        .expect("clip request after the display timer")
        .unwrap();
    assert_eq!(event, BusEvent::ClipRequested { audio_id: 303 });

    let _ = stop.send(());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_display_suppresses_request() {
    let (bus, inbound) = broadcast::channel(16);
    let (sink, mut sent) = mpsc::unbounded_channel::<BusEvent>();
    let (stop, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(
        MirrorRuntime::new(Duration::from_secs(8), sink).run(inbound, async {
            let _ = stop_rx.await;
        }),
    );

    bus.send(category_flow()).unwrap();
    bus.send(reveal(303)).unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    bus.send(BusEvent::SessionReset).unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(sent.try_recv().is_err());

    let _ = stop.send(());
    task.await.unwrap();
}
