//! Audio-Queue Scheduler
//!
//! A finite-state scheduler over the clip list of the active phase. It performs
//! no I/O: [`Scheduler::advance`] consumes one [`Input`] and returns the
//! [`Action`]s the runtime must carry out (load a queue, play a clip, arm a
//! timer, emit a bus event).
//!
//! Gating never relies on event order. Whether the queue may move past a choice
//! clip is decided by reading the last received session snapshot ("is pran
//! set"), so `pran_selected` and clip-end may arrive in either order.

mod profile;

pub use profile::{FlowProfile, GapPolicy};

use std::time::Duration;
use tracing::debug;

use pran_common::catalog::{sort_clips, AudioClip, ClipCategory, CuePoint};
use pran_common::events::RevealData;
use pran_common::{BusEvent, Phase, SessionSnapshot};

use crate::ambience::AmbienceLane;

/// Something the scheduler reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Fresh authoritative snapshot
    Session(SessionSnapshot),
    SessionReset,
    QueueLoaded {
        category: ClipCategory,
        clips: Vec<AudioClip>,
    },
    CatalogMiss {
        category: ClipCategory,
        reason: String,
    },
    ClipEnded {
        audio_id: i64,
    },
    ClipErrored {
        audio_id: i64,
        message: String,
    },
    /// Explicit external request to play one clip
    ClipRequested {
        audio_id: i64,
    },
    GapElapsed {
        generation: u64,
    },
    AutoResetElapsed {
        epoch: u64,
    },
    Pause,
    Resume,
}

/// Side effect requested by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    LoadQueue(ClipCategory),
    Play(AudioClip),
    StopAll,
    PauseOutput,
    ResumeOutput,
    ScheduleGap { delay: Duration, generation: u64 },
    ScheduleAutoReset { delay: Duration, epoch: u64 },
    CancelTimers,
    /// Switch the ambience lane; `None` silences it
    Ambience(Option<AmbienceLane>),
    Emit(BusEvent),
    /// Recoverable condition worth a warning
    Report(String),
}

/// Why the queue is not advancing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// Image-reveal pause point; waits for an explicit clip request
    ImageReveal,
    AwaitingPran,
    AwaitingMood,
    /// Playback failed on this clip
    Errored { audio_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    index: usize,
    /// Gap already elapsed while output was paused
    ready: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub gaps: GapPolicy,
    pub auto_reset: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gaps: GapPolicy::default(),
            auto_reset: Duration::from_millis(2000),
        }
    }
}

/// Queue state of the table device
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    session: SessionSnapshot,
    synced: bool,
    queue: Vec<AudioClip>,
    cursor: usize,
    /// Category whose queue is loaded; `None` once drained or discarded
    loaded: Option<ClipCategory>,
    loading: Option<ClipCategory>,
    playing: Option<i64>,
    pending: Option<Pending>,
    halt: Option<Halt>,
    /// Set when the mood choice was opened; cleared only by a mood arriving
    awaiting_mood: bool,
    paused: bool,
    gap_generation: u64,
    /// Bumped on every reset; timers from older epochs are ignored
    epoch: u64,
    reset_scheduled: bool,
    ambience: Option<AmbienceLane>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            session: SessionSnapshot::default(),
            synced: false,
            queue: Vec::new(),
            cursor: 0,
            loaded: None,
            loading: None,
            playing: None,
            pending: None,
            halt: None,
            awaiting_mood: false,
            paused: false,
            gap_generation: 0,
            epoch: 0,
            reset_scheduled: false,
            ambience: None,
        }
    }

    pub fn session(&self) -> &SessionSnapshot {
        &self.session
    }

    pub fn queue(&self) -> &[AudioClip] {
        &self.queue
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn loaded(&self) -> Option<ClipCategory> {
        self.loaded
    }

    pub fn playing(&self) -> Option<i64> {
        self.playing
    }

    pub fn halt(&self) -> Option<Halt> {
        self.halt
    }

    pub fn awaiting_mood(&self) -> bool {
        self.awaiting_mood
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Apply one input and return the resulting actions
    pub fn advance(&mut self, input: Input) -> Vec<Action> {
        let mut actions = Vec::new();

        match input {
            Input::Session(snapshot) => self.on_session(snapshot, &mut actions),
            Input::SessionReset => self.reset(&mut actions),
            Input::QueueLoaded { category, clips } => {
                self.on_queue_loaded(category, clips, &mut actions)
            }
            Input::CatalogMiss { category, reason } => {
                if self.loading == Some(category) {
                    self.loading = None;
                    actions.push(Action::Report(format!(
                        "{} queue unavailable, playback halted: {}",
                        category, reason
                    )));
                }
            }
            Input::ClipEnded { audio_id } => self.on_clip_ended(audio_id, &mut actions),
            Input::ClipErrored { audio_id, message } => {
                if self.playing == Some(audio_id) {
                    self.playing = None;
                    self.halt = Some(Halt::Errored { audio_id });
                    actions.push(Action::Report(format!(
                        "clip {} failed, holding: {}",
                        audio_id, message
                    )));
                    actions.push(Action::Emit(BusEvent::AudioError { audio_id, message }));
                }
            }
            Input::ClipRequested { audio_id } => self.on_clip_requested(audio_id, &mut actions),
            Input::GapElapsed { generation } => {
                if generation != self.gap_generation {
                    return actions;
                }
                if let Some(pending) = self.pending {
                    if self.paused {
                        self.pending = Some(Pending {
                            ready: true,
                            ..pending
                        });
                    } else {
                        self.play_index(pending.index, &mut actions);
                    }
                }
            }
            Input::AutoResetElapsed { epoch } => {
                if epoch == self.epoch && self.reset_scheduled && self.session.pran.is_some() {
                    actions.push(Action::Emit(BusEvent::SessionReset));
                    self.reset(&mut actions);
                }
            }
            Input::Pause => {
                if !self.paused {
                    self.paused = true;
                    if self.playing.is_some() {
                        actions.push(Action::PauseOutput);
                    }
                }
            }
            Input::Resume => {
                if self.paused {
                    self.paused = false;
                    if self.playing.is_some() {
                        actions.push(Action::ResumeOutput);
                    } else if let Some(Pending { index, ready: true }) = self.pending {
                        self.play_index(index, &mut actions);
                    }
                }
            }
        }

        actions
    }

    fn on_session(&mut self, snapshot: SessionSnapshot, actions: &mut Vec<Action>) {
        let first = !self.synced;
        self.synced = true;
        let previous = std::mem::replace(&mut self.session, snapshot.clone());
        let current = snapshot;

        if current.current_phase == Phase::Init {
            if first || previous.current_phase != Phase::Init || self.is_active() {
                self.reset(actions);
            }
            return;
        }

        let left_ending = current.pran.is_none()
            || (previous.current_phase == Phase::Ending && current.current_phase != Phase::Ending);
        if self.reset_scheduled && left_ending {
            debug!("Session moved back to {}, auto reset withdrawn", current.current_phase);
            self.disarm_auto_reset();
            if current.current_phase == Phase::CategoryFlow
                && self.loaded.is_none()
                && self.loading.is_none()
            {
                if let Some(category) = current.category {
                    self.request_load(category.into(), actions);
                }
            }
        }

        let lane = AmbienceLane::for_session(&current);
        if lane != self.ambience {
            self.ambience = lane;
            actions.push(Action::Ambience(lane));
        }

        let mood_arrived = if first {
            current.mood.is_some()
                && matches!(
                    current.current_phase,
                    Phase::CategoryFlow | Phase::PranSelection
                )
        } else {
            previous.mood.is_none() && current.mood.is_some()
        };
        let category_switched =
            !first && current.category.is_some() && previous.category != current.category;
        let mood_cleared = !first && previous.mood.is_some() && current.mood.is_none();

        if mood_arrived || category_switched {
            if let Some(category) = current.category {
                debug!("Mood resolved to {}, reloading queue", category);
                self.awaiting_mood = false;
                self.discard_queue(actions);
                self.request_load(category.into(), actions);
            }
            return;
        }

        if mood_cleared {
            self.discard_queue(actions);
            self.awaiting_mood = current.current_phase == Phase::MoodSelection;
        }

        let entered_common = first
            || mood_cleared
            || previous.current_phase.suppresses_queue_reload()
            || previous.current_phase == Phase::Init;
        if current.current_phase.is_common_flow()
            && entered_common
            && self.loaded != Some(ClipCategory::Common)
            && self.loading != Some(ClipCategory::Common)
        {
            self.request_load(ClipCategory::Common, actions);
            return;
        }

        if previous.pran.is_none() && self.session.pran.is_some() {
            if self.halt == Some(Halt::AwaitingPran) {
                self.halt = None;
                self.schedule_next(self.cursor + 1, actions);
            }
        }
    }

    fn on_queue_loaded(
        &mut self,
        category: ClipCategory,
        clips: Vec<AudioClip>,
        actions: &mut Vec<Action>,
    ) {
        if self.loading != Some(category) {
            debug!("Ignoring stale {} queue", category);
            return;
        }

        self.loading = None;
        self.queue = sort_clips(clips);
        self.cursor = 0;
        self.loaded = Some(category);
        self.halt = None;

        if self.queue.is_empty() {
            actions.push(Action::Report(format!("{} queue is empty", category)));
            self.on_exhausted(category, actions);
        } else {
            self.play_index(0, actions);
        }
    }

    fn on_clip_ended(&mut self, audio_id: i64, actions: &mut Vec<Action>) {
        if self.playing != Some(audio_id) {
            debug!("Ignoring end of clip {} (not playing)", audio_id);
            return;
        }
        self.playing = None;
        actions.push(Action::Emit(BusEvent::AudioStop {
            audio_id: Some(audio_id),
        }));

        let Some(clip) = self.queue.get(self.cursor).cloned() else {
            return;
        };
        let profile = FlowProfile::for_category(clip.category);

        if profile.is_pause_point(&clip) {
            let reveal = RevealData {
                category: clip.category,
                sequence: clip.sequence,
                resume_audio_id: self.queue.get(self.cursor + 1).map(|c| c.id),
            };
            actions.push(Action::Emit(BusEvent::CueTrigger {
                cue_point: profile.reveal_cue_for(&clip),
                data: reveal.to_value(),
            }));
            self.halt = Some(Halt::ImageReveal);
            return;
        }

        if clip.cue_point != CuePoint::None {
            actions.push(Action::Emit(BusEvent::CueTrigger {
                cue_point: clip.cue_point,
                data: serde_json::Value::Null,
            }));
        }

        match clip.cue_point {
            CuePoint::PranSelection if self.session.pran.is_none() => {
                self.halt = Some(Halt::AwaitingPran);
            }
            // The cue just emitted moves the phase to MOOD_SELECTION
            CuePoint::MoodSelection if self.session.mood.is_none() => {
                self.halt = Some(Halt::AwaitingMood);
                self.awaiting_mood = true;
            }
            _ => self.schedule_next(self.cursor + 1, actions),
        }
    }

    fn on_clip_requested(&mut self, audio_id: i64, actions: &mut Vec<Action>) {
        let Some(index) = self.queue.iter().position(|c| c.id == audio_id) else {
            actions.push(Action::Report(format!(
                "requested clip {} is not in the loaded queue",
                audio_id
            )));
            return;
        };

        if self.playing == Some(audio_id) {
            debug!("Clip {} already playing, request ignored", audio_id);
            return;
        }

        if let Some(current) = self.playing.take() {
            actions.push(Action::StopAll);
            actions.push(Action::Emit(BusEvent::AudioStop {
                audio_id: Some(current),
            }));
        }
        self.gap_generation += 1;
        self.pending = None;
        self.halt = None;
        self.play_index(index, actions);
    }

    /// Arm the gap before `index`, or finish the queue
    fn schedule_next(&mut self, index: usize, actions: &mut Vec<Action>) {
        let Some(next) = self.queue.get(index) else {
            if let Some(category) = self.loaded {
                self.on_exhausted(category, actions);
            }
            return;
        };

        self.gap_generation += 1;
        self.pending = Some(Pending {
            index,
            ready: false,
        });
        actions.push(Action::ScheduleGap {
            delay: self.config.gaps.gap_before(next),
            generation: self.gap_generation,
        });
    }

    fn play_index(&mut self, index: usize, actions: &mut Vec<Action>) {
        let Some(clip) = self.queue.get(index).cloned() else {
            return;
        };

        self.cursor = index;
        self.pending = None;
        self.playing = Some(clip.id);
        actions.push(Action::Emit(BusEvent::AudioPlay {
            audio_path: clip.file_path.clone(),
            audio_id: clip.id,
        }));
        actions.push(Action::Play(clip));
    }

    fn on_exhausted(&mut self, category: ClipCategory, actions: &mut Vec<Action>) {
        debug!("{} queue exhausted", category);
        self.queue.clear();
        self.cursor = 0;
        self.loaded = None;
        self.pending = None;

        if category == ClipCategory::Common {
            // Fallback: the common flow ran out without opening the mood choice
            if self.session.mood.is_none() && !self.awaiting_mood {
                self.awaiting_mood = true;
                actions.push(Action::Emit(BusEvent::CueTrigger {
                    cue_point: CuePoint::MoodSelection,
                    data: serde_json::Value::Null,
                }));
            }
            return;
        }

        if self.session.pran.is_none() {
            actions.push(Action::Report(format!(
                "{} queue ended before a pran was chosen",
                category
            )));
            return;
        }

        if self.session.current_phase != Phase::Ending {
            actions.push(Action::Emit(BusEvent::CueTrigger {
                cue_point: CuePoint::Ending,
                data: serde_json::Value::Null,
            }));
        }
        if !self.reset_scheduled {
            self.reset_scheduled = true;
            actions.push(Action::ScheduleAutoReset {
                delay: self.config.auto_reset,
                epoch: self.epoch,
            });
        }
    }

    /// Forget the armed auto reset; its timer fires into an old epoch
    fn disarm_auto_reset(&mut self) {
        self.reset_scheduled = false;
        self.epoch += 1;
    }

    fn request_load(&mut self, category: ClipCategory, actions: &mut Vec<Action>) {
        self.loading = Some(category);
        actions.push(Action::LoadQueue(category));
    }

    /// Drop the current queue and anything armed for it
    fn discard_queue(&mut self, actions: &mut Vec<Action>) {
        if let Some(current) = self.playing.take() {
            actions.push(Action::StopAll);
            actions.push(Action::Emit(BusEvent::AudioStop {
                audio_id: Some(current),
            }));
        }
        if self.pending.take().is_some() {
            self.gap_generation += 1;
        }
        self.queue.clear();
        self.cursor = 0;
        self.loaded = None;
        self.loading = None;
        self.halt = None;
    }

    fn is_active(&self) -> bool {
        !self.queue.is_empty()
            || self.loading.is_some()
            || self.playing.is_some()
            || self.pending.is_some()
            || self.reset_scheduled
            || self.ambience.is_some()
            || self.awaiting_mood
    }

    /// Return to the INIT state, invalidating every armed timer
    fn reset(&mut self, actions: &mut Vec<Action>) {
        self.epoch += 1;
        self.gap_generation += 1;
        actions.push(Action::CancelTimers);
        actions.push(Action::StopAll);
        if self.ambience.take().is_some() {
            actions.push(Action::Ambience(None));
        }

        self.session = SessionSnapshot::default();
        self.queue.clear();
        self.cursor = 0;
        self.loaded = None;
        self.loading = None;
        self.playing = None;
        self.pending = None;
        self.halt = None;
        self.awaiting_mood = false;
        self.paused = false;
        self.reset_scheduled = false;
    }
}
