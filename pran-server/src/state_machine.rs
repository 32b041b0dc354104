//! Session State Machine
//!
//! Pure transition table over [`SessionSnapshot`]. The room hub is the only
//! caller; it persists and broadcasts whatever this module returns and never
//! writes session fields itself.

use pran_common::catalog::{CuePoint, Pran};
use pran_common::{AgeGroup, Error, Mood, Phase, Result, SessionSnapshot};

/// Something that may move the session
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    AgeSelected(AgeGroup),
    MoodSelected(Mood),
    /// Catalog pran resolved by the caller
    PranSelected(Pran),
    AudioPlay { audio_path: String },
    AudioStop,
    Cue(CuePoint),
    Reset,
    Force(Phase),
}

/// Result of applying a trigger
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing changed; callers must not broadcast
    Unchanged,
    Updated {
        session: SessionSnapshot,
        phase_changed: bool,
    },
}

impl Outcome {
    fn from_change(before: &SessionSnapshot, after: SessionSnapshot) -> Self {
        if *before == after {
            Outcome::Unchanged
        } else {
            Outcome::Updated {
                phase_changed: before.current_phase != after.current_phase,
                session: after,
            }
        }
    }
}

/// Apply one trigger to the current session
///
/// Triggers that do not apply in the current phase, and repeats of transitions
/// already taken, yield [`Outcome::Unchanged`]. Only rule violations are errors.
pub fn apply(current: &SessionSnapshot, trigger: Trigger) -> Result<Outcome> {
    let mut next = current.clone();

    match trigger {
        Trigger::AgeSelected(age_group) => {
            if current.current_phase == Phase::Init {
                next.age_group = Some(age_group);
                next.current_phase = Phase::AgeSelection;
            }
        }

        // No session yet; a late clip from before a reset must not mark it dirty
        Trigger::AudioPlay { .. } | Trigger::AudioStop if current.current_phase == Phase::Init => {}

        Trigger::AudioPlay { audio_path } => {
            next.current_audio = Some(audio_path);
            if current.current_phase == Phase::AgeSelection {
                next.current_phase = Phase::CommonFlow;
            }
        }

        Trigger::AudioStop => {
            next.current_audio = None;
        }

        Trigger::Cue(cue) => match cue {
            CuePoint::MoodSelection if current.current_phase.is_common_flow() => {
                next.current_phase = Phase::MoodSelection;
            }
            CuePoint::PranSelection if current.current_phase == Phase::CategoryFlow => {
                next.current_phase = Phase::PranSelection;
            }
            CuePoint::Ending if current.pran.is_some() => {
                next.current_phase = Phase::Ending;
            }
            _ => {}
        },

        Trigger::MoodSelected(mood) => {
            let accepts = matches!(
                current.current_phase,
                Phase::CommonFlow | Phase::MoodSelection
            );
            if accepts && current.mood.is_none() {
                next.mood = Some(mood);
                next.category = Some(mood.category());
                next.current_phase = Phase::CategoryFlow;
            }
        }

        Trigger::PranSelected(pran) => {
            let category = current.category.ok_or_else(|| {
                Error::InvalidTransition("pran selected before a category exists".to_string())
            })?;
            if pran.category != category {
                return Err(Error::InvalidTransition(format!(
                    "pran {} belongs to {}, session category is {}",
                    pran.id, pran.category, category
                )));
            }
            if current.pran.is_none() {
                next.pran = Some(pran.id);
            }
        }

        Trigger::Reset => {
            next = SessionSnapshot::default();
        }

        Trigger::Force(phase) => return force(current, phase),
    }

    Ok(Outcome::from_change(current, next))
}

/// Admin override
///
/// Clears every field populated after the forced phase, and refuses phases
/// whose prerequisites are missing.
fn force(current: &SessionSnapshot, phase: Phase) -> Result<Outcome> {
    if current.current_phase == phase {
        return Ok(Outcome::Unchanged);
    }

    let mut next = current.clone();
    match phase {
        Phase::Init => return apply(current, Trigger::Reset),
        Phase::AgeSelection | Phase::CommonFlow | Phase::MoodSelection => {
            next.mood = None;
            next.category = None;
            next.pran = None;
        }
        Phase::CategoryFlow | Phase::PranSelection => {
            if current.category.is_none() {
                return Err(Error::InvalidTransition(format!(
                    "{} requires a category",
                    phase
                )));
            }
            next.pran = None;
        }
        Phase::Ending => {
            if current.pran.is_none() {
                return Err(Error::InvalidTransition(
                    "ENDING requires a selected pran".to_string(),
                ));
            }
        }
    }
    next.current_phase = phase;

    debug_assert!(next.is_consistent());
    Ok(Outcome::from_change(current, next))
}
