//! Audio decoding.
//!
//! Recordings are decoded once into a mono [`Waveform`] at their native sample
//! rate. Nothing here resamples: the feature extractor reads the rate off the
//! waveform and builds its mel filterbank for that rate.
//!
//! Multi-channel files are averaged down to mono frame by frame, the same way
//! a multi-channel capture stream is folded into a single channel.

use std::path::Path;

use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{Result, ScreeningError};

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Created by decoding a file, consumed by feature extraction, then dropped.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Mono f32 samples, nominally in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this waveform in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the waveform contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode a WAV file into a mono waveform at its native sample rate.
///
/// # Errors
/// Returns `ScreeningError::Decode` naming `path` if the file cannot be opened,
/// has an unsupported layout, contains a truncated sample stream, or holds a
/// NaN or infinite float sample.
pub fn decode_wav(path: impl AsRef<Path>) -> Result<Waveform> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(|e| ScreeningError::decode(path, e))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(ScreeningError::decode(path, "file declares zero channels"));
    }
    if spec.sample_rate == 0 {
        return Err(ScreeningError::decode(path, "file declares a zero sample rate"));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| ScreeningError::decode(path, e))?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(ScreeningError::decode(
                    path,
                    format!("unsupported bit depth {}", spec.bits_per_sample),
                ));
            }
            let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| ScreeningError::decode(path, e))?
        }
    };

    if let Some(idx) = interleaved.iter().position(|s| !s.is_finite()) {
        return Err(ScreeningError::decode(
            path,
            format!("non-finite sample at index {idx}"),
        ));
    }

    let samples = downmix(&interleaved, spec.channels as usize);

    debug!(
        path = %path.display(),
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        samples = samples.len(),
        "decoded waveform"
    );

    Ok(Waveform::new(samples, spec.sample_rate))
}

/// Average interleaved frames down to a single channel.
///
/// A trailing partial frame is dropped.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
