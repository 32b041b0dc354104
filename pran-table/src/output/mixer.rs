//! Sample mixer behind the device stream
//!
//! Holds at most one clip voice and one looping ambience bed and renders them
//! into interleaved device buffers. The audio callback owns the timing: a clip
//! has ended when its last frame has been rendered.

use std::sync::Arc;

use crate::ambience::AmbienceLane;

use super::decode::Pcm;

struct Voice {
    audio_id: i64,
    samples: Arc<[f32]>,
    position: usize,
}

struct Bed {
    lane: AmbienceLane,
    samples: Arc<[f32]>,
    position: usize,
}

pub struct Mixer {
    voice: Option<Voice>,
    bed: Option<Bed>,
    paused: bool,
    muted: bool,
    ambience_volume: f32,
}

impl Mixer {
    pub fn new(ambience_volume: f32) -> Self {
        Self {
            voice: None,
            bed: None,
            paused: false,
            muted: false,
            ambience_volume: ambience_volume.clamp(0.0, 1.0),
        }
    }

    pub fn start_voice(&mut self, audio_id: i64, pcm: &Pcm) {
        self.voice = Some(Voice {
            audio_id,
            samples: Arc::clone(&pcm.samples),
            position: 0,
        });
    }

    /// Drop the clip; returns its id when one was loaded
    pub fn stop_voice(&mut self) -> Option<i64> {
        self.voice.take().map(|v| v.audio_id)
    }

    pub fn voice(&self) -> Option<i64> {
        self.voice.as_ref().map(|v| v.audio_id)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn set_ambience(&mut self, lane: AmbienceLane, pcm: &Pcm) {
        self.bed = Some(Bed {
            lane,
            samples: Arc::clone(&pcm.samples),
            position: 0,
        });
    }

    pub fn clear_ambience(&mut self) {
        self.bed = None;
    }

    pub fn ambience(&self) -> Option<AmbienceLane> {
        self.bed.as_ref().map(|b| b.lane)
    }

    /// Fill `out` with `channels`-wide frames
    ///
    /// Returns the id of a clip whose last frame was rendered in this buffer.
    /// Pausing holds the clip; the ambience bed keeps looping.
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> Option<i64> {
        let mut finished = None;
        let gain = if self.muted { 0.0 } else { 1.0 };
        let bed_gain = gain * self.ambience_volume;

        for frame in out.chunks_mut(channels.max(1)) {
            let (mut left, mut right) = (0.0f32, 0.0f32);

            if !self.paused {
                if let Some(voice) = self.voice.as_mut() {
                    if voice.position + 1 < voice.samples.len() {
                        left += voice.samples[voice.position] * gain;
                        right += voice.samples[voice.position + 1] * gain;
                        voice.position += 2;
                    }
                    if voice.position + 1 >= voice.samples.len() {
                        finished = self.voice.take().map(|v| v.audio_id);
                    }
                }
            }

            if let Some(bed) = self.bed.as_mut() {
                if bed.samples.len() >= 2 {
                    left += bed.samples[bed.position] * bed_gain;
                    right += bed.samples[bed.position + 1] * bed_gain;
                    bed.position = (bed.position + 2) % (bed.samples.len() & !1);
                }
            }

            match frame {
                [] => {}
                [mono] => *mono = ((left + right) * 0.5).clamp(-1.0, 1.0),
                [l, r, rest @ ..] => {
                    *l = left.clamp(-1.0, 1.0);
                    *r = right.clamp(-1.0, 1.0);
                    rest.fill(0.0);
                }
            }
        }

        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(frames: usize, level: f32) -> Pcm {
        Pcm {
            samples: vec![level; frames * 2].into(),
            sample_rate: 48_000,
        }
    }

    #[test]
    fn test_clip_end_reported_once_at_last_frame() {
        let mut mixer = Mixer::new(0.5);
        mixer.start_voice(7, &pcm(3, 0.5));

        let mut buffer = vec![1.0; 4];
        assert_eq!(mixer.render(&mut buffer, 2), None);
        assert_eq!(buffer, vec![0.5; 4]);

        let mut buffer = vec![1.0; 4];
        assert_eq!(mixer.render(&mut buffer, 2), Some(7));
        assert_eq!(buffer, vec![0.5, 0.5, 0.0, 0.0]);
        assert_eq!(mixer.voice(), None);

        assert_eq!(mixer.render(&mut buffer, 2), None);
    }

    #[test]
    fn test_pause_holds_clip_but_not_ambience() {
        let mut mixer = Mixer::new(0.5);
        mixer.start_voice(1, &pcm(2, 0.4));
        mixer.set_ambience(AmbienceLane::Intro, &pcm(5, 0.2));
        mixer.set_paused(true);

        let mut buffer = vec![0.0; 20];
        assert_eq!(mixer.render(&mut buffer, 2), None);
        assert!(buffer.iter().all(|s| (*s - 0.1).abs() < 1e-6));
        assert_eq!(mixer.voice(), Some(1));

        mixer.set_paused(false);
        let mut buffer = vec![0.0; 4];
        assert_eq!(mixer.render(&mut buffer, 2), Some(1));
        assert!((buffer[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_muted_renders_silence_and_keeps_time() {
        let mut mixer = Mixer::new(1.0);
        mixer.start_voice(3, &pcm(2, 0.9));
        mixer.set_ambience(AmbienceLane::Closing, &pcm(2, 0.9));
        mixer.set_muted(true);

        let mut buffer = vec![1.0; 4];
        assert_eq!(mixer.render(&mut buffer, 2), Some(3));
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_ambience_loops_and_stops_cleanly() {
        let mut mixer = Mixer::new(1.0);
        let bed = Pcm {
            samples: vec![0.1, 0.1, 0.2, 0.2].into(),
            sample_rate: 48_000,
        };
        mixer.set_ambience(AmbienceLane::Intro, &bed);

        let mut buffer = vec![0.0; 10];
        mixer.render(&mut buffer, 2);
        assert_eq!(buffer, vec![0.1, 0.1, 0.2, 0.2, 0.1, 0.1, 0.2, 0.2, 0.1, 0.1]);
        assert_eq!(mixer.ambience(), Some(AmbienceLane::Intro));

        mixer.clear_ambience();
        mixer.render(&mut buffer, 2);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_mono_and_surround_layouts() {
        let mut mixer = Mixer::new(0.0);
        mixer.start_voice(5, &pcm(4, 0.6));

        let mut mono = vec![0.0; 1];
        mixer.render(&mut mono, 1);
        assert!((mono[0] - 0.6).abs() < 1e-6);

        let mut surround = vec![1.0; 6];
        mixer.render(&mut surround, 6);
        assert!((surround[0] - 0.6).abs() < 1e-6);
        assert_eq!(&surround[2..], &[0.0; 4]);
    }
}
