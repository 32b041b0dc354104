//! Session domain types
//!
//! The live session is owned by the server; devices only ever hold read-only
//! [`SessionSnapshot`] projections received over the Dispatch Bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Named stage of the guided session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Init,
    AgeSelection,
    CommonFlow,
    MoodSelection,
    CategoryFlow,
    PranSelection,
    Ending,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Init,
        Phase::AgeSelection,
        Phase::CommonFlow,
        Phase::MoodSelection,
        Phase::CategoryFlow,
        Phase::PranSelection,
        Phase::Ending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::AgeSelection => "AGE_SELECTION",
            Phase::CommonFlow => "COMMON_FLOW",
            Phase::MoodSelection => "MOOD_SELECTION",
            Phase::CategoryFlow => "CATEGORY_FLOW",
            Phase::PranSelection => "PRAN_SELECTION",
            Phase::Ending => "ENDING",
        }
    }

    /// Phases in which a queue already in flight must not be torn down
    pub fn suppresses_queue_reload(&self) -> bool {
        matches!(
            self,
            Phase::MoodSelection | Phase::CategoryFlow | Phase::PranSelection | Phase::Ending
        )
    }

    /// Phases played against the COMMON clip list
    pub fn is_common_flow(&self) -> bool {
        matches!(self, Phase::AgeSelection | Phase::CommonFlow)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown phase: {}", s)))
    }
}

/// Visitor age group chosen at the start of the journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "KIDS")]
    Kids,
    #[serde(rename = "PRE-TEEN")]
    PreTeen,
    #[serde(rename = "TEEN+")]
    TeenPlus,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Kids => "KIDS",
            AgeGroup::PreTeen => "PRE-TEEN",
            AgeGroup::TeenPlus => "TEEN+",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "KIDS" => Ok(AgeGroup::Kids),
            "PRE-TEEN" => Ok(AgeGroup::PreTeen),
            "TEEN+" => Ok(AgeGroup::TeenPlus),
            other => Err(Error::InvalidInput(format!("Unknown age group: {}", other))),
        }
    }
}

/// Category driving clip, image and pran selection after mood choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Negative,
    Positive,
    Neutral,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Negative, Category::Positive, Category::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Negative => "NEGATIVE",
            Category::Positive => "POSITIVE",
            Category::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown category: {}", s)))
    }
}

/// Emotion tag picked on the mood selection screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Happy,
    Grateful,
    Sad,
    Angry,
    Calm,
    Confused,
}

impl Mood {
    pub const ALL: [Mood; 6] = [
        Mood::Happy,
        Mood::Grateful,
        Mood::Sad,
        Mood::Angry,
        Mood::Calm,
        Mood::Confused,
    ];

    /// Fixed total mapping from mood to category
    pub fn category(&self) -> Category {
        match self {
            Mood::Happy | Mood::Grateful => Category::Positive,
            Mood::Sad | Mood::Angry => Category::Negative,
            Mood::Calm | Mood::Confused => Category::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "HAPPY",
            Mood::Grateful => "GRATEFUL",
            Mood::Sad => "SAD",
            Mood::Angry => "ANGRY",
            Mood::Calm => "CALM",
            Mood::Confused => "CONFUSED",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown mood: {}", s)))
    }
}

/// Persisted session snapshot
///
/// This is the shape delivered by `session_state` and read by admin tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub age_group: Option<AgeGroup>,
    pub mood: Option<Mood>,
    pub category: Option<Category>,
    pub pran: Option<u8>,
    pub current_phase: Phase,
    pub current_audio: Option<String>,
}

impl SessionSnapshot {
    /// Category is only set with a mood, pran only with a category
    pub fn is_consistent(&self) -> bool {
        (self.category.is_none() || self.mood.is_some())
            && (self.pran.is_none() || self.category.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_derivation_is_total_and_deterministic() {
        for mood in Mood::ALL {
            let first = mood.category();
            let second = mood.category();
            assert_eq!(first, second, "{} derived two categories", mood);
        }
        assert_eq!(Mood::Happy.category(), Category::Positive);
        assert_eq!(Mood::Angry.category(), Category::Negative);
        assert_eq!(Mood::Calm.category(), Category::Neutral);
    }

    #[test]
    fn test_phase_round_trips_through_str() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("LOBBY".parse::<Phase>().is_err());
    }

    #[test]
    fn test_reload_suppression_set() {
        assert!(Phase::MoodSelection.suppresses_queue_reload());
        assert!(Phase::Ending.suppresses_queue_reload());
        assert!(!Phase::CommonFlow.suppresses_queue_reload());
        assert!(!Phase::Init.suppresses_queue_reload());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let snapshot = SessionSnapshot {
            age_group: Some(AgeGroup::PreTeen),
            mood: Some(Mood::Happy),
            category: Some(Category::Positive),
            pran: Some(2),
            current_phase: Phase::PranSelection,
            current_audio: Some("audio/positive/4.mp3".to_string()),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["ageGroup"], "PRE-TEEN");
        assert_eq!(json["mood"], "HAPPY");
        assert_eq!(json["category"], "POSITIVE");
        assert_eq!(json["pran"], 2);
        assert_eq!(json["currentPhase"], "PRAN_SELECTION");
        assert_eq!(json["currentAudio"], "audio/positive/4.mp3");
    }

    #[test]
    fn test_snapshot_consistency() {
        let mut snapshot = SessionSnapshot::default();
        assert!(snapshot.is_consistent());

        snapshot.category = Some(Category::Neutral);
        assert!(!snapshot.is_consistent(), "category without mood");

        snapshot.mood = Some(Mood::Calm);
        snapshot.pran = Some(1);
        assert!(snapshot.is_consistent());
    }
}
