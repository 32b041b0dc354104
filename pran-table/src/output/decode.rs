//! Clip decoding with symphonia
//!
//! Clips are short, so a file is decoded whole into interleaved stereo `f32`
//! and resampled to the device rate before it starts playing.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Decoded audio, interleaved stereo
#[derive(Debug, Clone)]
pub struct Pcm {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl Pcm {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Decode `path` and convert it to `sample_rate`
pub fn load(path: &Path, sample_rate: u32) -> Result<Pcm> {
    let (stereo, source_rate) = decode_file(path)?;
    let samples = resample(stereo, source_rate, sample_rate)?;
    Ok(Pcm {
        samples: samples.into(),
        sample_rate,
    })
}

/// Decode every packet of the first audio track
///
/// Returns interleaved stereo samples and the source sample rate. Mono is
/// duplicated to both sides; channels past the second are dropped.
pub fn decode_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    let fail = |what: &str, e: &dyn std::fmt::Display| {
        Error::Decode(format!("{}: {} ({})", path.display(), what, e))
    };

    let file = File::open(path).map_err(|e| fail("open failed", &e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| fail("unrecognised format", &e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode(format!("{}: no audio track", path.display())))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode(format!("{}: sample rate unknown", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail("unsupported codec", &e))?;

    let mut stereo = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(fail("read failed", &e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(fail("decode failed", &e)),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        push_stereo(buffer.samples(), spec.channels.count(), &mut stereo);
    }

    if stereo.is_empty() {
        return Err(Error::Decode(format!("{}: no audio decoded", path.display())));
    }

    debug!(
        "Decoded {} ({} frames at {} Hz)",
        path.display(),
        stereo.len() / 2,
        source_rate
    );
    Ok((stereo, source_rate))
}

fn push_stereo(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            for &sample in samples {
                out.push(sample);
                out.push(sample);
            }
        }
        _ => {
            for frame in samples.chunks_exact(channels) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

/// Convert interleaved stereo between rates
pub fn resample(stereo: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || stereo.is_empty() {
        return Ok(stereo);
    }

    let frames = stereo.len() / 2;
    let mut planar = vec![Vec::with_capacity(frames), Vec::with_capacity(frames)];
    for frame in stereo.chunks_exact(2) {
        planar[0].push(frame[0]);
        planar[1].push(frame[1]);
    }

    let mut resampler = FastFixedIn::<f32>::new(
        to as f64 / from as f64,
        1.0,
        PolynomialDegree::Septic,
        frames,
        2,
    )
    .map_err(|e| Error::Decode(format!("resampler setup failed: {}", e)))?;

    let planar = resampler
        .process(&planar, None)
        .map_err(|e| Error::Decode(format!("resampling failed: {}", e)))?;

    let mut out = Vec::with_capacity(planar[0].len() * 2);
    for (left, right) in planar[0].iter().zip(&planar[1]) {
        out.push(*left);
        out.push(*right);
    }
    debug!("Resampled {} -> {} Hz, {} -> {} frames", from, to, frames, out.len() / 2);
    Ok(out)
}
