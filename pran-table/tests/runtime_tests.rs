//! Runtime tests for pran-table
//!
//! Drive the full select loop with a canned catalog, the timed output and
//! paused tokio time; bus traffic is injected on a broadcast channel and
//! captured from an mpsc sink.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use pran_common::catalog::{AudioClip, ClipCategory, CuePoint};
use pran_common::events::RevealData;
use pran_common::{AgeGroup, BusEvent, Category, Mood, Phase, SessionSnapshot};
use pran_table::catalog_client::ClipSource;
use pran_table::output::TimedOutput;
use pran_table::{AmbiencePaths, Error, Result, SchedulerConfig, TableRuntime};

struct CannedCatalog {
    lists: HashMap<ClipCategory, Vec<AudioClip>>,
}

impl ClipSource for CannedCatalog {
    async fn list_clips(&self, category: ClipCategory) -> Result<Vec<AudioClip>> {
        self.lists
            .get(&category)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("no {} clips", category)))
    }
}

fn clip(id: i64, category: ClipCategory, sequence: u32, cue_point: CuePoint) -> AudioClip {
    AudioClip {
        id,
        category,
        sequence,
        file_path: format!("audio/{}/{}.mp3", category.as_str().to_lowercase(), sequence),
        cue_point,
        script_text: None,
        duration_ms: Some(1000),
    }
}

fn catalog() -> CannedCatalog {
    let mut lists = HashMap::new();
    lists.insert(
        ClipCategory::Common,
        vec![
            clip(1, ClipCategory::Common, 1, CuePoint::None),
            clip(2, ClipCategory::Common, 2, CuePoint::None),
            clip(3, ClipCategory::Common, 3, CuePoint::MoodSelection),
        ],
    );
    lists.insert(
        ClipCategory::Negative,
        vec![
            clip(12, ClipCategory::Negative, 2, CuePoint::None),
            clip(11, ClipCategory::Negative, 1, CuePoint::None),
        ],
    );
    CannedCatalog { lists }
}

struct Harness {
    bus: broadcast::Sender<BusEvent>,
    sent: mpsc::UnboundedReceiver<BusEvent>,
    master: watch::Sender<bool>,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl Harness {
    fn start(is_master: bool) -> Self {
        let (bus, inbound) = broadcast::channel(64);
        let (sink, sent) = mpsc::unbounded_channel();
        let (master, master_rx) = watch::channel(is_master);
        let (stop, stop_rx) = oneshot::channel::<()>();
        let (output, output_events) = TimedOutput::new(Duration::from_secs(5));

        let runtime = TableRuntime::new(
            SchedulerConfig::default(),
            AmbiencePaths {
                intro: "intro.mp3".to_string(),
                closing: "closing.mp3".to_string(),
            },
            catalog(),
            output,
            output_events,
            sink,
            master_rx,
        );
        let task = tokio::spawn(runtime.run(inbound, async {
            let _ = stop_rx.await;
        }));

        Self {
            bus,
            sent,
            master,
            stop: Some(stop),
            task,
        }
    }

    fn push(&self, event: BusEvent) {
        self.bus.send(event).unwrap();
    }

    async fn next_sent(&mut self) -> BusEvent {
        tokio::time::timeout(Duration::from_secs(30), self.sent.recv())
            .await
            .expect("timed out waiting for an emitted event")
            .expect("sink closed")
    }

    async fn next_play(&mut self) -> i64 {
        loop {
            if let BusEvent::AudioPlay { audio_id, .. } = self.next_sent().await {
                return audio_id;
            }
        }
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.unwrap();
    }
}

fn common_flow() -> SessionSnapshot {
    SessionSnapshot {
        age_group: Some(AgeGroup::Kids),
        current_phase: Phase::CommonFlow,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_common_queue_plays_through_to_mood_cue() {
    let mut harness = Harness::start(true);
    harness.push(BusEvent::SessionState(common_flow()));

    assert_eq!(harness.next_play().await, 1);
    assert_eq!(
        harness.next_sent().await,
        BusEvent::AudioStop { audio_id: Some(1) }
    );
    assert_eq!(harness.next_play().await, 2);
    assert_eq!(harness.next_play().await, 3);

    assert_eq!(
        harness.next_sent().await,
        BusEvent::AudioStop { audio_id: Some(3) }
    );
    assert_eq!(
        harness.next_sent().await,
        BusEvent::CueTrigger {
            cue_point: CuePoint::MoodSelection,
            data: serde_json::Value::Null,
        }
    );

    // Nothing further until a mood arrives
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.sent.try_recv().is_err());

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_mood_switches_queue_and_reveal_waits_for_request() {
    let mut harness = Harness::start(true);
    harness.push(BusEvent::SessionState(common_flow()));
    assert_eq!(harness.next_play().await, 1);

    let mut session = common_flow();
    session.mood = Some(Mood::Sad);
    session.category = Some(Category::Negative);
    session.current_phase = Phase::CategoryFlow;
    harness.push(BusEvent::SessionState(session));

    assert_eq!(
        harness.next_sent().await,
        BusEvent::AudioStop { audio_id: Some(1) }
    );
    assert_eq!(harness.next_play().await, 11);

    assert_eq!(
        harness.next_sent().await,
        BusEvent::AudioStop { audio_id: Some(11) }
    );
    let BusEvent::CueTrigger { cue_point, data } = harness.next_sent().await else {
        panic!("expected the reveal cue");
    };
    assert_eq!(cue_point, CuePoint::ShowNegImages);
    let reveal = RevealData::from_value(&data).expect("reveal payload");
    assert_eq!(reveal.resume_audio_id, Some(12));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.sent.try_recv().is_err(), "held at the pause point");

    harness.push(BusEvent::ClipRequested { audio_id: 12 });
    assert_eq!(harness.next_play().await, 12);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_follower_plays_silently() {
    let mut harness = Harness::start(false);
    harness.push(BusEvent::SessionState(common_flow()));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.sent.try_recv().is_err());

    // Promotion takes effect for the next emission
    harness.master.send(true).unwrap();
    harness.push(BusEvent::ClipRequested { audio_id: 2 });
    assert_eq!(harness.next_play().await, 2);

    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_pending_gap() {
    let mut harness = Harness::start(true);
    harness.push(BusEvent::SessionState(common_flow()));

    assert_eq!(harness.next_play().await, 1);
    assert_eq!(
        harness.next_sent().await,
        BusEvent::AudioStop { audio_id: Some(1) }
    );

    // The 600 ms gap before clip 2 is armed now
    harness.push(BusEvent::SessionReset);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.sent.try_recv().is_err());

    harness.stop().await;
}
