//! Per-category flow constants
//!
//! The three category flows share one gate algorithm; what differs between them
//! is data: which clip is the image-reveal pause point and which cue the mirror
//! should receive there.

use std::time::Duration;

use pran_common::catalog::{AudioClip, ClipCategory, CuePoint};

/// Flow constants for one clip category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowProfile {
    /// Sequence after which the queue waits for the mirror's explicit request
    pub image_pause_sequence: Option<u32>,
    /// Cue emitted at the pause point when the clip carries none of its own
    pub reveal_cue: CuePoint,
}

impl FlowProfile {
    pub const fn for_category(category: ClipCategory) -> Self {
        match category {
            ClipCategory::Negative => FlowProfile {
                image_pause_sequence: Some(1),
                reveal_cue: CuePoint::ShowNegImages,
            },
            ClipCategory::Neutral => FlowProfile {
                image_pause_sequence: Some(1),
                reveal_cue: CuePoint::MirrorFade,
            },
            ClipCategory::Positive => FlowProfile {
                image_pause_sequence: Some(2),
                reveal_cue: CuePoint::ShowPosImages,
            },
            ClipCategory::Common => FlowProfile {
                image_pause_sequence: None,
                reveal_cue: CuePoint::None,
            },
        }
    }

    pub fn is_pause_point(&self, clip: &AudioClip) -> bool {
        self.image_pause_sequence == Some(clip.sequence)
    }

    /// Cue to emit at a pause point
    pub fn reveal_cue_for(&self, clip: &AudioClip) -> CuePoint {
        if clip.cue_point == CuePoint::None {
            self.reveal_cue
        } else {
            clip.cue_point
        }
    }
}

/// Silence inserted before the next clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapPolicy {
    pub clip_gap: Duration,
    /// Before a clip that opens the mood or pran choice
    pub pre_choice_gap: Duration,
}

impl Default for GapPolicy {
    fn default() -> Self {
        Self {
            clip_gap: Duration::from_millis(600),
            pre_choice_gap: Duration::from_millis(2000),
        }
    }
}

impl GapPolicy {
    pub fn gap_before(&self, next: &AudioClip) -> Duration {
        if next.cue_point.opens_choice() {
            self.pre_choice_gap
        } else {
            self.clip_gap
        }
    }
}
