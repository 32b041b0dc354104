//! Clock-driven output for headless runs
//!
//! Times each clip from its catalog duration instead of decoding it. Used when
//! the table has no sound device and by the runtime tests.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pran_common::AudioClip;

use super::{AudioOutput, OutputEvent};
use crate::ambience::AmbienceLane;
use crate::error::Result;

struct Running {
    audio_id: i64,
    remaining: Duration,
    started: Instant,
    task: Option<JoinHandle<()>>,
}

/// Clock-driven output
pub struct TimedOutput {
    events: mpsc::UnboundedSender<OutputEvent>,
    default_clip: Duration,
    /// When set, clips whose file is missing under this root fail instead of playing
    media_root: Option<PathBuf>,
    running: Option<Running>,
    ambience: Option<AmbienceLane>,
    muted: bool,
}

impl TimedOutput {
    pub fn new(default_clip: Duration) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                default_clip,
                media_root: None,
                running: None,
                ambience: None,
                muted: false,
            },
            rx,
        )
    }

    pub fn with_media_root(mut self, root: PathBuf) -> Self {
        self.media_root = Some(root);
        self
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn ambience(&self) -> Option<AmbienceLane> {
        self.ambience
    }

    fn arm(&self, audio_id: i64, after: Duration) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = events.send(OutputEvent::Ended { audio_id });
        })
    }
}

impl AudioOutput for TimedOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<()> {
        self.stop();

        if let Some(root) = &self.media_root {
            let path = root.join(&clip.file_path);
            if !path.exists() {
                warn!("Clip {} missing at {}", clip.id, path.display());
                let _ = self.events.send(OutputEvent::Errored {
                    audio_id: clip.id,
                    message: format!("file not found: {}", clip.file_path),
                });
                return Ok(());
            }
        }

        let length = clip
            .duration_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_clip);
        info!(
            "Playing clip {} ({} #{}, {} ms){}",
            clip.id,
            clip.category,
            clip.sequence,
            length.as_millis(),
            if self.muted { " [muted]" } else { "" }
        );

        self.running = Some(Running {
            audio_id: clip.id,
            remaining: length,
            started: Instant::now(),
            task: Some(self.arm(clip.id, length)),
        });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            debug!("Stopping clip {}", running.audio_id);
            if let Some(task) = running.task {
                task.abort();
            }
        }
    }

    fn pause(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if let Some(task) = running.task.take() {
            task.abort();
            running.remaining = running.remaining.saturating_sub(running.started.elapsed());
            info!(
                "Paused clip {} ({} ms left)",
                running.audio_id,
                running.remaining.as_millis()
            );
        }
    }

    fn resume(&mut self) {
        let Some((audio_id, remaining)) = self
            .running
            .as_ref()
            .filter(|r| r.task.is_none())
            .map(|r| (r.audio_id, r.remaining))
        else {
            return;
        };

        let task = self.arm(audio_id, remaining);
        if let Some(running) = self.running.as_mut() {
            running.started = Instant::now();
            running.task = Some(task);
        }
        info!("Resumed clip {}", audio_id);
    }

    fn set_muted(&mut self, muted: bool) {
        if self.muted != muted {
            debug!("Output {}", if muted { "muted" } else { "unmuted" });
        }
        self.muted = muted;
    }

    fn start_ambience(&mut self, lane: AmbienceLane, path: &str) -> Result<()> {
        if self.ambience != Some(lane) {
            info!("Ambience: {} lane ({})", lane, path);
            self.ambience = Some(lane);
        }
        Ok(())
    }

    fn stop_ambience(&mut self) {
        if let Some(lane) = self.ambience.take() {
            info!("Ambience: {} lane stopped", lane);
        }
    }
}

impl Drop for TimedOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
