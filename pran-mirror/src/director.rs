//! Mirror director
//!
//! Derives what the mirror shows from bus traffic and owns the image-display
//! timer that releases the table's image-reveal pause point. Like the table
//! scheduler it performs no I/O; [`Director::advance`] returns actions.

use std::fmt;
use std::time::Duration;
use tracing::debug;

use pran_common::catalog::CuePoint;
use pran_common::events::RevealData;
use pran_common::{BusEvent, Category, Phase};

/// Scene on the mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    Idle,
    Ambient,
    MoodPrompt,
    Reflection(Option<Category>),
    /// Visual reveal triggered by a cue
    Images(CuePoint),
    PranPrompt,
    Closing,
}

impl Scene {
    fn for_phase(phase: Phase, category: Option<Category>) -> Self {
        match phase {
            Phase::Init => Scene::Idle,
            Phase::AgeSelection | Phase::CommonFlow => Scene::Ambient,
            Phase::MoodSelection => Scene::MoodPrompt,
            Phase::CategoryFlow => Scene::Reflection(category),
            Phase::PranSelection => Scene::PranPrompt,
            Phase::Ending => Scene::Closing,
        }
    }
}

impl fmt::Display for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scene::Idle => f.write_str("idle"),
            Scene::Ambient => f.write_str("ambient"),
            Scene::MoodPrompt => f.write_str("mood prompt"),
            Scene::Reflection(Some(category)) => write!(f, "reflection ({})", category),
            Scene::Reflection(None) => f.write_str("reflection"),
            Scene::Images(cue) => write!(f, "images ({})", cue),
            Scene::PranPrompt => f.write_str("pran prompt"),
            Scene::Closing => f.write_str("closing"),
        }
    }
}

/// Everything the mirror renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualState {
    pub scene: Scene,
    /// Clip whose dialogue is on screen
    pub speaking: Option<i64>,
}

impl fmt::Display for VisualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.speaking {
            Some(id) => write!(f, "{} + dialogue {}", self.scene, id),
            None => write!(f, "{}", self.scene),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Bus(BusEvent),
    RevealElapsed { token: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Show(VisualState),
    ScheduleReveal { delay: Duration, token: u64 },
    CancelTimers,
    Emit(BusEvent),
}

pub struct Director {
    image_display: Duration,
    visual: VisualState,
    phase: Phase,
    category: Option<Category>,
    /// Clip to request once the images have been up long enough
    pending: Option<i64>,
    token: u64,
}

impl Director {
    pub fn new(image_display: Duration) -> Self {
        Self {
            image_display,
            visual: VisualState {
                scene: Scene::Idle,
                speaking: None,
            },
            phase: Phase::Init,
            category: None,
            pending: None,
            token: 0,
        }
    }

    pub fn visual(&self) -> VisualState {
        self.visual
    }

    pub fn pending(&self) -> Option<i64> {
        self.pending
    }

    pub fn advance(&mut self, input: Input) -> Vec<Action> {
        let before = self.visual;
        let mut actions = Vec::new();

        match input {
            Input::Bus(event) => self.on_event(event, &mut actions),
            Input::RevealElapsed { token } => {
                if token == self.token {
                    if let Some(audio_id) = self.pending.take() {
                        debug!("Image display elapsed, requesting clip {}", audio_id);
                        self.visual.scene = Scene::for_phase(self.phase, self.category);
                        actions.push(Action::Emit(BusEvent::ClipRequested { audio_id }));
                    }
                }
            }
        }

        if self.visual != before {
            actions.push(Action::Show(self.visual));
        }
        actions
    }

    fn on_event(&mut self, event: BusEvent, actions: &mut Vec<Action>) {
        match event {
            BusEvent::SessionState(snapshot) => {
                self.category = snapshot.category;
                self.enter_phase(snapshot.current_phase, actions);
            }
            BusEvent::PhaseChanged { phase } => self.enter_phase(phase, actions),
            BusEvent::SessionReset => self.reset(actions),
            BusEvent::MoodSelected { mood, category } => {
                self.category = category.or(Some(mood.category()));
            }
            BusEvent::AudioPlay { audio_id, .. } => {
                self.visual.speaking = Some(audio_id);
                if self.pending == Some(audio_id) {
                    // Released by someone else (admin or a retry)
                    self.cancel_reveal(actions);
                    self.visual.scene = Scene::for_phase(self.phase, self.category);
                }
            }
            BusEvent::AudioStop { audio_id } => {
                if audio_id.is_none() || audio_id == self.visual.speaking {
                    self.visual.speaking = None;
                }
            }
            BusEvent::CueTrigger { cue_point, data } => self.on_cue(cue_point, &data, actions),
            _ => {}
        }
    }

    fn on_cue(&mut self, cue: CuePoint, data: &serde_json::Value, actions: &mut Vec<Action>) {
        match cue {
            CuePoint::MirrorFade | CuePoint::ShowNegImages | CuePoint::ShowPosImages => {
                self.visual.scene = Scene::Images(cue);

                let resume = RevealData::from_value(data).and_then(|r| r.resume_audio_id);
                let Some(audio_id) = resume else {
                    return;
                };
                if self.pending == Some(audio_id) {
                    debug!("Reveal for clip {} already pending", audio_id);
                    return;
                }
                self.token += 1;
                self.pending = Some(audio_id);
                actions.push(Action::ScheduleReveal {
                    delay: self.image_display,
                    token: self.token,
                });
            }
            CuePoint::MoodSelection => self.visual.scene = Scene::MoodPrompt,
            CuePoint::PranSelection => self.visual.scene = Scene::PranPrompt,
            CuePoint::Ending => self.visual.scene = Scene::Closing,
            CuePoint::None => {}
        }
    }

    fn enter_phase(&mut self, phase: Phase, actions: &mut Vec<Action>) {
        if phase == Phase::Init {
            if self.phase != Phase::Init || self.pending.is_some() {
                self.reset(actions);
            }
            self.visual.scene = Scene::Idle;
            return;
        }

        self.phase = phase;
        // Images stay up until their timer releases the table
        if self.pending.is_some() && phase == Phase::CategoryFlow {
            return;
        }
        if self.pending.is_some() {
            self.cancel_reveal(actions);
        }
        self.visual.scene = Scene::for_phase(phase, self.category);
    }

    fn cancel_reveal(&mut self, actions: &mut Vec<Action>) {
        self.pending = None;
        self.token += 1;
        actions.push(Action::CancelTimers);
    }

    fn reset(&mut self, actions: &mut Vec<Action>) {
        self.token += 1;
        self.pending = None;
        self.phase = Phase::Init;
        self.category = None;
        self.visual = VisualState {
            scene: Scene::Idle,
            speaking: None,
        };
        actions.push(Action::CancelTimers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pran_common::catalog::ClipCategory;
    use pran_common::{Mood, SessionSnapshot};

    fn reveal(cue: CuePoint, resume: Option<i64>) -> Input {
        Input::Bus(BusEvent::CueTrigger {
            cue_point: cue,
            data: RevealData {
                category: ClipCategory::Negative,
                sequence: 1,
                resume_audio_id: resume,
            }
            .to_value(),
        })
    }

    fn in_category_flow() -> Director {
        let mut director = Director::new(Duration::from_secs(8));
        director.advance(Input::Bus(BusEvent::SessionState(SessionSnapshot {
            mood: Some(Mood::Sad),
            category: Some(Category::Negative),
            current_phase: Phase::CategoryFlow,
            ..Default::default()
        })));
        director
    }

    fn reveal_token(actions: &[Action]) -> u64 {
        actions
            .iter()
            .find_map(|a| match a {
                Action::ScheduleReveal { token, delay } => {
                    assert_eq!(*delay, Duration::from_secs(8));
                    Some(*token)
                }
                _ => None,
            })
            .expect("reveal timer scheduled")
    }

    #[test]
    fn test_reveal_requests_resume_clip_after_display() {
        let mut director = in_category_flow();
        assert_eq!(director.visual().scene, Scene::Reflection(Some(Category::Negative)));

        let actions = director.advance(reveal(CuePoint::ShowNegImages, Some(12)));
        assert_eq!(director.visual().scene, Scene::Images(CuePoint::ShowNegImages));
        let token = reveal_token(&actions);

        let actions = director.advance(Input::RevealElapsed { token });
        assert!(actions.contains(&Action::Emit(BusEvent::ClipRequested { audio_id: 12 })));
        assert_eq!(director.visual().scene, Scene::Reflection(Some(Category::Negative)));
        assert_eq!(director.pending(), None);

        // A second firing of the same timer does nothing
        assert!(director.advance(Input::RevealElapsed { token }).is_empty());
    }

    #[test]
    fn test_duplicate_reveal_cue_keeps_one_timer() {
        let mut director = in_category_flow();
        let first = director.advance(reveal(CuePoint::ShowNegImages, Some(12)));
        let token = reveal_token(&first);

        let again = director.advance(reveal(CuePoint::ShowNegImages, Some(12)));
        assert!(!again.iter().any(|a| matches!(a, Action::ScheduleReveal { .. })));

        let actions = director.advance(Input::RevealElapsed { token });
        assert!(actions.contains(&Action::Emit(BusEvent::ClipRequested { audio_id: 12 })));
    }

    #[test]
    fn test_reset_invalidates_reveal_timer() {
        let mut director = in_category_flow();
        let token = reveal_token(&director.advance(reveal(CuePoint::MirrorFade, Some(40))));

        let actions = director.advance(Input::Bus(BusEvent::SessionReset));
        assert!(actions.contains(&Action::CancelTimers));
        assert_eq!(director.visual().scene, Scene::Idle);

        assert!(director.advance(Input::RevealElapsed { token }).is_empty());
    }

    #[test]
    fn test_resume_clip_played_elsewhere_cancels_request() {
        let mut director = in_category_flow();
        let token = reveal_token(&director.advance(reveal(CuePoint::ShowNegImages, Some(12))));

        let actions = director.advance(Input::Bus(BusEvent::AudioPlay {
            audio_path: "audio/negative/2.mp3".to_string(),
            audio_id: 12,
        }));
        assert!(actions.contains(&Action::CancelTimers));
        assert_eq!(director.visual().speaking, Some(12));

        let actions = director.advance(Input::RevealElapsed { token });
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::Emit(BusEvent::ClipRequested { .. }))));
    }

    #[test]
    fn test_phase_drives_scene_and_dialogue_overlay() {
        let mut director = Director::new(Duration::from_secs(8));

        let actions = director.advance(Input::Bus(BusEvent::PhaseChanged {
            phase: Phase::CommonFlow,
        }));
        assert_eq!(
            actions,
            vec![Action::Show(VisualState {
                scene: Scene::Ambient,
                speaking: None
            })]
        );

        director.advance(Input::Bus(BusEvent::AudioPlay {
            audio_path: "audio/common/1.mp3".to_string(),
            audio_id: 1,
        }));
        assert_eq!(director.visual().speaking, Some(1));
        director.advance(Input::Bus(BusEvent::AudioStop { audio_id: Some(1) }));
        assert_eq!(director.visual().speaking, None);

        director.advance(Input::Bus(BusEvent::CueTrigger {
            cue_point: CuePoint::MoodSelection,
            data: serde_json::Value::Null,
        }));
        assert_eq!(director.visual().scene, Scene::MoodPrompt);

        // Unchanged state is not re-shown
        let actions = director.advance(Input::Bus(BusEvent::PhaseChanged {
            phase: Phase::MoodSelection,
        }));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_reveal_without_resume_only_shows_images() {
        let mut director = in_category_flow();
        let actions = director.advance(reveal(CuePoint::ShowPosImages, None));
        assert_eq!(
            actions,
            vec![Action::Show(VisualState {
                scene: Scene::Images(CuePoint::ShowPosImages),
                speaking: None
            })]
        );
    }
}
