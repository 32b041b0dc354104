//! Typed payloads carried in `cue_trigger.data`

use serde::{Deserialize, Serialize};

use crate::catalog::ClipCategory;

/// Payload attached to an image-reveal cue
///
/// Tells the mirror which clip to request once its image-display timer elapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealData {
    pub category: ClipCategory,
    pub sequence: u32,
    /// Clip the table is holding for; `None` when the pause point is the last clip
    pub resume_audio_id: Option<i64>,
}

impl RevealData {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Parse from `cue_trigger.data`; returns `None` for other payload shapes
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
