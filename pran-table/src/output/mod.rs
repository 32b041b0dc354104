//! Audio output seam
//!
//! The scheduler never touches a device. The runtime drives an [`AudioOutput`]
//! and receives [`OutputEvent`]s back when a clip finishes or fails.
//! [`DeviceOutput`] decodes clips and plays them on the sound card;
//! [`TimedOutput`] only keeps time and serves headless hosts.

pub mod decode;
#[cfg(feature = "device")]
mod device;
mod mixer;
mod timed;

#[cfg(feature = "device")]
pub use device::DeviceOutput;
pub use mixer::Mixer;
pub use timed::TimedOutput;

use pran_common::AudioClip;

use crate::ambience::AmbienceLane;
use crate::error::Result;

/// Completion report from an output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Ended { audio_id: i64 },
    Errored { audio_id: i64, message: String },
}

pub trait AudioOutput: Send {
    /// Start a clip, replacing whatever is playing
    fn play(&mut self, clip: &AudioClip) -> Result<()>;

    /// Stop the clip without reporting an end
    fn stop(&mut self);

    fn pause(&mut self);

    fn resume(&mut self);

    /// Non-master instances keep running muted
    fn set_muted(&mut self, muted: bool);

    fn start_ambience(&mut self, lane: AmbienceLane, path: &str) -> Result<()>;

    fn stop_ambience(&mut self);
}
