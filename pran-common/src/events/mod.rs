//! Dispatch Bus event types
//!
//! Provides the shared event vocabulary and the in-process EventBus used by the
//! server to fan events out to every connected device.

mod cue_data;

pub use cue_data::RevealData;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::CuePoint;
use crate::election::ElectionMessage;
use crate::session::{AgeGroup, Category, Mood, Phase, SessionSnapshot};

/// Dispatch Bus events
///
/// Serialized as `{"type": "<snake_case name>", ...camelCase fields}` on the wire.
/// The same enum is used by the server, the devices and the admin observer stream
/// so that every consumer matches exhaustively on one vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BusEvent {
    /// Visitor picked an age group
    AgeSelected { age_group: AgeGroup },

    /// Visitor picked a mood
    ///
    /// Clients send it without a category; the server fills in the derived one when
    /// relaying.
    MoodSelected {
        mood: Mood,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<Category>,
    },

    /// Visitor committed to a pran
    PranSelected { pran_id: u8 },

    /// A clip started playing on the audio master
    AudioPlay { audio_path: String, audio_id: i64 },

    /// Playback paused (admin or table)
    AudioPause,

    /// Playback resumed after a pause
    AudioResume,

    /// Current clip stopped or finished
    AudioStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_id: Option<i64>,
    },

    /// Clip failed to load or play
    AudioError { audio_id: i64, message: String },

    /// Cue point reached at the end of a clip
    CueTrigger {
        cue_point: CuePoint,
        #[serde(default)]
        data: serde_json::Value,
    },

    /// Explicit request for the table to play one clip by id
    ClipRequested { audio_id: i64 },

    /// Session phase changed
    PhaseChanged { phase: Phase },

    /// Every device returns to INIT
    SessionReset,

    /// Admin phase override
    ForcePhase { phase: Phase },

    /// Snapshot request on (re)connect
    GetSession,

    /// Snapshot response and post-mutation broadcast
    SessionState(SessionSnapshot),

    /// Master-election message relayed between sibling tabs
    Election { message: ElectionMessage },

    /// Local connectivity flag change, never sent over the wire
    ConnectionStatus { connected: bool },
}

impl BusEvent {
    /// Get event type as string for filtering and SSE event names
    pub fn event_type(&self) -> &'static str {
        match self {
            BusEvent::AgeSelected { .. } => "age_selected",
            BusEvent::MoodSelected { .. } => "mood_selected",
            BusEvent::PranSelected { .. } => "pran_selected",
            BusEvent::AudioPlay { .. } => "audio_play",
            BusEvent::AudioPause => "audio_pause",
            BusEvent::AudioResume => "audio_resume",
            BusEvent::AudioStop { .. } => "audio_stop",
            BusEvent::AudioError { .. } => "audio_error",
            BusEvent::CueTrigger { .. } => "cue_trigger",
            BusEvent::ClipRequested { .. } => "clip_requested",
            BusEvent::PhaseChanged { .. } => "phase_changed",
            BusEvent::SessionReset => "session_reset",
            BusEvent::ForcePhase { .. } => "force_phase",
            BusEvent::GetSession => "get_session",
            BusEvent::SessionState(_) => "session_state",
            BusEvent::Election { .. } => "election",
            BusEvent::ConnectionStatus { .. } => "connection_status",
        }
    }

    /// Events only the admin surface may originate
    pub fn is_admin_only(&self) -> bool {
        matches!(self, BusEvent::ForcePhase { .. })
    }
}

/// Event plus the bus connection it came from
///
/// `origin` is `None` for events produced by the server itself. Relays skip the
/// originating connection so a device never receives its own events back.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: Option<Uuid>,
    pub event: BusEvent,
}

/// Central event distribution bus for the room
///
/// Uses tokio::broadcast internally: publishing never blocks, slow subscribers
/// observe `Lagged` instead of stalling the producer.
///
/// # Examples
///
/// ```
/// use pran_common::events::{BusEvent, EventBus};
/// use pran_common::Phase;
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(BusEvent::PhaseChanged { phase: Phase::AgeSelection });
/// let envelope = rx.try_recv().unwrap();
/// assert_eq!(envelope.event.event_type(), "phase_changed");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Emit a server-originated event
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: BusEvent) -> Result<usize, broadcast::error::SendError<Envelope>> {
        self.tx.send(Envelope { origin: None, event })
    }

    /// Emit an event on behalf of a connected device
    pub fn emit_from(&self, origin: Uuid, event: BusEvent) {
        let _ = self.tx.send(Envelope {
            origin: Some(origin),
            event,
        });
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: BusEvent) {
        let _ = self.tx.send(Envelope { origin: None, event });
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
