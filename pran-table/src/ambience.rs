//! Background ambience lanes
//!
//! Two looping tracks run beside the clip queue: the intro lane from session
//! start until a pran is chosen, the closing lane from then until reset. Which
//! one is active is a function of the session alone.

use std::fmt;

use pran_common::{Phase, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbienceLane {
    Intro,
    Closing,
}

impl AmbienceLane {
    pub fn for_session(session: &SessionSnapshot) -> Option<Self> {
        if session.pran.is_some() {
            Some(AmbienceLane::Closing)
        } else if session.current_phase != Phase::Init {
            Some(AmbienceLane::Intro)
        } else {
            None
        }
    }
}

impl fmt::Display for AmbienceLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbienceLane::Intro => f.write_str("intro"),
            AmbienceLane::Closing => f.write_str("closing"),
        }
    }
}
