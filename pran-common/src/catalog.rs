//! Audio and pran catalog types
//!
//! Clips are ordered per category by a 1-based `sequence`; the scheduler relies on
//! sequences being contiguous so it can address clips by position.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::session::Category;
use crate::{Error, Result};

/// Maximum number of pran options offered per category
pub const MAX_PRANS_PER_CATEGORY: usize = 4;

/// Clip list a clip belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipCategory {
    Common,
    Positive,
    Negative,
    Neutral,
}

impl ClipCategory {
    pub const ALL: [ClipCategory; 4] = [
        ClipCategory::Common,
        ClipCategory::Positive,
        ClipCategory::Negative,
        ClipCategory::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClipCategory::Common => "COMMON",
            ClipCategory::Positive => "POSITIVE",
            ClipCategory::Negative => "NEGATIVE",
            ClipCategory::Neutral => "NEUTRAL",
        }
    }
}

impl From<Category> for ClipCategory {
    fn from(category: Category) -> Self {
        match category {
            Category::Positive => ClipCategory::Positive,
            Category::Negative => ClipCategory::Negative,
            Category::Neutral => ClipCategory::Neutral,
        }
    }
}

impl fmt::Display for ClipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClipCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ClipCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown clip category: {}", s)))
    }
}

/// In-band cue tag carried by an audio clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CuePoint {
    #[default]
    None,
    MirrorFade,
    ShowNegImages,
    ShowPosImages,
    MoodSelection,
    PranSelection,
    Ending,
}

impl CuePoint {
    pub const ALL: [CuePoint; 7] = [
        CuePoint::None,
        CuePoint::MirrorFade,
        CuePoint::ShowNegImages,
        CuePoint::ShowPosImages,
        CuePoint::MoodSelection,
        CuePoint::PranSelection,
        CuePoint::Ending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CuePoint::None => "NONE",
            CuePoint::MirrorFade => "MIRROR_FADE",
            CuePoint::ShowNegImages => "SHOW_NEG_IMAGES",
            CuePoint::ShowPosImages => "SHOW_POS_IMAGES",
            CuePoint::MoodSelection => "MOOD_SELECTION",
            CuePoint::PranSelection => "PRAN_SELECTION",
            CuePoint::Ending => "ENDING",
        }
    }

    /// Cues that open a user choice (mood or pran)
    pub fn opens_choice(&self) -> bool {
        matches!(self, CuePoint::MoodSelection | CuePoint::PranSelection)
    }

    /// Cues the mirror reacts to by revealing visuals
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            CuePoint::MirrorFade | CuePoint::ShowNegImages | CuePoint::ShowPosImages
        )
    }
}

impl fmt::Display for CuePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CuePoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CuePoint::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown cue point: {}", s)))
    }
}

/// Audio catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    pub id: i64,
    pub category: ClipCategory,
    pub sequence: u32,
    #[serde(alias = "file_path")]
    pub file_path: String,
    #[serde(default, alias = "cue_point")]
    pub cue_point: CuePoint,
    #[serde(default, alias = "script_text", skip_serializing_if = "Option::is_none")]
    pub script_text: Option<String>,
    /// Clip length used by the timed output lane when known
    #[serde(default, alias = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Promise option offered near the end of the journey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pran {
    /// Global id (1-12)
    pub id: u8,
    pub category: Category,
    /// Position within the category (1-4)
    pub sequence: u8,
    pub label: String,
}

/// Sort clips into playback order
pub fn sort_clips(mut clips: Vec<AudioClip>) -> Vec<AudioClip> {
    clips.sort_by_key(|c| c.sequence);
    clips
}

/// Check that one category's clips form the contiguous sequence 1..=n
pub fn validate_sequences(category: ClipCategory, clips: &[AudioClip]) -> Result<()> {
    let mut sequences: Vec<u32> = clips
        .iter()
        .filter(|c| c.category == category)
        .map(|c| c.sequence)
        .collect();
    sequences.sort_unstable();

    for (index, sequence) in sequences.iter().enumerate() {
        let expected = index as u32 + 1;
        if *sequence != expected {
            return Err(Error::InvalidCatalog(format!(
                "{} clips: expected sequence {} but found {}",
                category, expected, sequence
            )));
        }
    }
    Ok(())
}

/// Check pran ids are unique and each category offers at most four distinct slots
pub fn validate_prans(prans: &[Pran]) -> Result<()> {
    let mut by_category: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
    let mut ids = Vec::with_capacity(prans.len());

    for pran in prans {
        if ids.contains(&pran.id) {
            return Err(Error::InvalidCatalog(format!("Duplicate pran id {}", pran.id)));
        }
        ids.push(pran.id);

        if pran.sequence == 0 || pran.sequence as usize > MAX_PRANS_PER_CATEGORY {
            return Err(Error::InvalidCatalog(format!(
                "Pran {} has sequence {} outside 1-{}",
                pran.id, pran.sequence, MAX_PRANS_PER_CATEGORY
            )));
        }

        let slots = by_category.entry(pran.category.as_str()).or_default();
        if slots.contains(&pran.sequence) {
            return Err(Error::InvalidCatalog(format!(
                "{} already has a pran in slot {}",
                pran.category, pran.sequence
            )));
        }
        slots.push(pran.sequence);
    }
    Ok(())
}

/// Catalog manifest used to seed the database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogManifest {
    #[serde(default)]
    pub clips: Vec<AudioClip>,
    #[serde(default)]
    pub prans: Vec<Pran>,
}

impl CatalogManifest {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: CatalogManifest = toml::from_str(content)
            .map_err(|e| Error::InvalidCatalog(format!("Failed to parse manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        for category in ClipCategory::ALL {
            validate_sequences(category, &self.clips)?;
        }
        let mut ids: Vec<i64> = self.clips.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.clips.len() {
            return Err(Error::InvalidCatalog("Duplicate clip id".to_string()));
        }
        validate_prans(&self.prans)
    }
}
