//! Sound-card output using cpal
//!
//! The cpal stream lives on its own thread for the lifetime of the output and
//! pulls frames from the shared [`Mixer`]. Decoding runs on the blocking pool;
//! a decode that finishes after its clip was stopped or replaced is dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use pran_common::AudioClip;

use super::decode;
use super::mixer::Mixer;
use super::{AudioOutput, OutputEvent};
use crate::ambience::AmbienceLane;
use crate::error::{Error, Result};

fn lock(mixer: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    mixer.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DeviceOutput {
    mixer: Arc<Mutex<Mixer>>,
    events: mpsc::UnboundedSender<OutputEvent>,
    media_root: PathBuf,
    sample_rate: u32,
    /// Bumped by every play and stop
    voice_request: Arc<AtomicU64>,
    ambience_request: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl DeviceOutput {
    /// Open the default output device
    pub fn open(
        media_root: PathBuf,
        ambience_volume: f32,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OutputEvent>)> {
        let (events, rx) = mpsc::unbounded_channel();
        let mixer = Arc::new(Mutex::new(Mixer::new(ambience_volume)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let sample_rate = spawn_stream(Arc::clone(&mixer), events.clone(), Arc::clone(&shutdown))?;
        info!(
            "Audio device open at {} Hz, media from {}",
            sample_rate,
            media_root.display()
        );

        Ok((
            Self {
                mixer,
                events,
                media_root,
                sample_rate,
                voice_request: Arc::new(AtomicU64::new(0)),
                ambience_request: Arc::new(AtomicU64::new(0)),
                shutdown,
            },
            rx,
        ))
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = self.media_root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::Output(format!("file not found: {}", path.display())))
        }
    }
}

impl AudioOutput for DeviceOutput {
    fn play(&mut self, clip: &AudioClip) -> Result<()> {
        self.stop();
        let request = self.voice_request.load(Ordering::SeqCst);
        let path = self.resolve(&clip.file_path)?;

        info!("Playing clip {} ({} #{})", clip.id, clip.category, clip.sequence);
        let audio_id = clip.id;
        let rate = self.sample_rate;
        let mixer = Arc::clone(&self.mixer);
        let current = Arc::clone(&self.voice_request);
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            let loaded = decode::load(&path, rate);
            let mut mixer = lock(&mixer);
            if current.load(Ordering::SeqCst) != request {
                debug!("Clip {} superseded before it was decoded", audio_id);
                return;
            }
            match loaded {
                Ok(pcm) => {
                    debug!("Clip {} decoded, {} ms", audio_id, pcm.duration().as_millis());
                    mixer.start_voice(audio_id, &pcm);
                }
                Err(e) => {
                    warn!("Clip {} failed: {}", audio_id, e);
                    let _ = events.send(OutputEvent::Errored {
                        audio_id,
                        message: e.to_string(),
                    });
                }
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.voice_request.fetch_add(1, Ordering::SeqCst);
        if let Some(audio_id) = lock(&self.mixer).stop_voice() {
            debug!("Stopped clip {}", audio_id);
        }
    }

    fn pause(&mut self) {
        lock(&self.mixer).set_paused(true);
    }

    fn resume(&mut self) {
        lock(&self.mixer).set_paused(false);
    }

    fn set_muted(&mut self, muted: bool) {
        lock(&self.mixer).set_muted(muted);
        debug!("Output {}", if muted { "muted" } else { "unmuted" });
    }

    fn start_ambience(&mut self, lane: AmbienceLane, path: &str) -> Result<()> {
        if lock(&self.mixer).ambience() == Some(lane) {
            return Ok(());
        }
        let request = self.ambience_request.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.resolve(path)?;

        info!("Ambience: {} lane ({})", lane, path.display());
        let rate = self.sample_rate;
        let mixer = Arc::clone(&self.mixer);
        let current = Arc::clone(&self.ambience_request);

        tokio::task::spawn_blocking(move || {
            let loaded = decode::load(&path, rate);
            let mut mixer = lock(&mixer);
            if current.load(Ordering::SeqCst) != request {
                return;
            }
            match loaded {
                Ok(pcm) => mixer.set_ambience(lane, &pcm),
                Err(e) => warn!("Ambience {} failed: {}", lane, e),
            }
        });
        Ok(())
    }

    fn stop_ambience(&mut self) {
        self.ambience_request.fetch_add(1, Ordering::SeqCst);
        let mut mixer = lock(&self.mixer);
        if let Some(lane) = mixer.ambience() {
            info!("Ambience: {} lane stopped", lane);
            mixer.clear_ambience();
        }
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Start the device thread; returns the device sample rate
fn spawn_stream(
    mixer: Arc<Mutex<Mixer>>,
    events: mpsc::UnboundedSender<OutputEvent>,
    shutdown: Arc<AtomicBool>,
) -> Result<u32> {
    let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

    std::thread::Builder::new()
        .name("pran-audio".to_string())
        .spawn(move || {
            let stream = match open_stream(mixer, events) {
                Ok((stream, rate)) => {
                    let _ = ready_tx.send(Ok(rate));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !shutdown.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(200));
            }
            if let Err(e) = stream.pause() {
                debug!("Pausing stream on shutdown failed: {}", e);
            }
            info!("Audio device closed");
        })
        .map_err(|e| Error::Output(format!("failed to start audio thread: {}", e)))?;

    ready_rx
        .recv()
        .map_err(|_| Error::Output("audio thread exited during setup".to_string()))?
}

fn open_stream(
    mixer: Arc<Mutex<Mixer>>,
    events: mpsc::UnboundedSender<OutputEvent>,
) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Output("no default output device".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::Output(format!("failed to get device config: {}", e)))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, events)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, events)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, events)?,
        other => {
            return Err(Error::Output(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };
    stream
        .play()
        .map_err(|e| Error::Output(format!("failed to start stream: {}", e)))?;
    Ok((stream, rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    events: mpsc::UnboundedSender<OutputEvent>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let failed_mixer = Arc::clone(&mixer);
    let failed_events = events.clone();
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                // Never block the device thread; a contended buffer plays silence
                let finished = match mixer.try_lock() {
                    Ok(mut mixer) => mixer.render(&mut scratch, channels),
                    Err(_) => {
                        scratch.fill(0.0);
                        None
                    }
                };
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*sample);
                }
                if let Some(audio_id) = finished {
                    let _ = events.send(OutputEvent::Ended { audio_id });
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                if let Some(audio_id) = lock(&failed_mixer).stop_voice() {
                    let _ = failed_events.send(OutputEvent::Errored {
                        audio_id,
                        message: format!("audio device error: {}", err),
                    });
                }
            },
            None,
        )
        .map_err(|e| Error::Output(format!("failed to build stream: {}", e)))
}
