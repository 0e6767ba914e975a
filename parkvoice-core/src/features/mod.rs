//! Acoustic fingerprint extraction.
//!
//! Every recording is reduced to a fixed 16-value [`FeatureVector`]:
//!
//! ```text
//! [ mfcc_1 .. mfcc_13 | zcr | spectral_centroid | rms ]
//!   0            12     13    14                  15
//! ```
//!
//! Each entry is the mean of a per-frame quantity. The layout and the frame
//! parameters in [`FrameConfig`] are baked into every trained scaler and
//! classifier; [`FEATURE_SCHEMA`] names this exact layout and is written into
//! persisted artifacts so a drifted extractor is caught at load time.

pub mod spectral;
pub mod temporal;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{decode_wav, Waveform};
use crate::error::{Result, ScreeningError};

use spectral::StftAnalyser;

/// Length of every feature vector.
pub const FEATURE_DIM: usize = 16;

/// Number of cepstral coefficients at the head of the vector.
pub const N_MFCC: usize = 13;

/// Identifies the feature layout + frontend. Bump on any change to either.
pub const FEATURE_SCHEMA: &str = "parkvoice.features.mfcc13-zcr-centroid-rms.v1";

/// Human-readable name of each dimension, in vector order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "mfcc_1",
    "mfcc_2",
    "mfcc_3",
    "mfcc_4",
    "mfcc_5",
    "mfcc_6",
    "mfcc_7",
    "mfcc_8",
    "mfcc_9",
    "mfcc_10",
    "mfcc_11",
    "mfcc_12",
    "mfcc_13",
    "zero_crossing_rate",
    "spectral_centroid",
    "rms",
];

/// Analysis framing shared by all per-frame features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Frame (and FFT) length in samples.
    pub frame_length: usize,
    /// Distance between frame starts in samples.
    pub hop_length: usize,
    /// Mel bands feeding the cepstrum.
    pub n_mels: usize,
    /// Cepstral coefficients kept.
    pub n_mfcc: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: N_MFCC,
        }
    }
}

impl FrameConfig {
    /// Frames produced for `len` samples with centered framing.
    pub fn frame_count(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PadMode {
    Zero,
    Edge,
}

/// Sample `i` of centered frame `t`; the signal is padded by
/// `frame_length / 2` on both sides.
pub(crate) fn centered_frame(
    samples: &[f32],
    config: &FrameConfig,
    t: usize,
    i: usize,
    pad: PadMode,
) -> f64 {
    let idx = (t * config.hop_length + i) as isize - (config.frame_length / 2) as isize;
    if idx >= 0 && (idx as usize) < samples.len() {
        return samples[idx as usize] as f64;
    }
    match pad {
        PadMode::Zero => 0.0,
        PadMode::Edge => match (samples.first(), samples.last()) {
            (Some(&first), _) if idx < 0 => first as f64,
            (_, Some(&last)) => last as f64,
            _ => 0.0,
        },
    }
}

/// Fixed-length acoustic fingerprint. Order is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_DIM]);

impl FeatureVector {
    /// Build from a slice, rejecting any length other than [`FEATURE_DIM`].
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let array: [f64; FEATURE_DIM] =
            values
                .try_into()
                .map_err(|_| ScreeningError::DimensionMismatch {
                    expected: FEATURE_DIM,
                    actual: values.len(),
                })?;
        Ok(Self(array))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn mfcc(&self) -> &[f64] {
        &self.0[..N_MFCC]
    }

    pub fn zero_crossing_rate(&self) -> f64 {
        self.0[13]
    }

    pub fn spectral_centroid(&self) -> f64 {
        self.0[14]
    }

    pub fn rms(&self) -> f64 {
        self.0[15]
    }
}

/// Path reported for waveforms that did not come from a file.
const IN_MEMORY: &str = "<in-memory waveform>";

/// Deterministic waveform → [`FeatureVector`] transform.
///
/// Holds the precomputed window and FFT plan; `Send + Sync`, so one instance
/// can serve concurrent requests.
pub struct FeatureExtractor {
    config: FrameConfig,
    stft: StftAnalyser,
}

impl FeatureExtractor {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            stft: StftAnalyser::new(config),
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Extract the 16-value fingerprint of an already-decoded waveform.
    ///
    /// Degenerate input (empty or all-zero) still yields a finite vector.
    ///
    /// # Errors
    /// `ScreeningError::Decode` if the waveform reports a zero sample rate,
    /// holds a NaN or infinite sample, or any feature comes out non-finite.
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureVector> {
        if waveform.sample_rate == 0 {
            return Err(ScreeningError::decode(IN_MEMORY, "sample rate is zero"));
        }
        if let Some(idx) = waveform.samples.iter().position(|s| !s.is_finite()) {
            return Err(ScreeningError::decode(
                IN_MEMORY,
                format!("non-finite sample at index {idx}"),
            ));
        }

        let spec = self
            .stft
            .power_spectrogram(&waveform.samples, waveform.sample_rate);
        let mfcc = spectral::mean_mfcc(&spec, self.config.n_mels, self.config.n_mfcc);
        let centroid = spectral::mean_spectral_centroid(&spec);
        let zcr = temporal::mean_zero_crossing_rate(&waveform.samples, &self.config);
        let rms = temporal::mean_rms(&waveform.samples, &self.config);

        let mut values = mfcc;
        values.extend_from_slice(&[zcr, centroid, rms]);
        if let Some(dim) = values.iter().position(|v| !v.is_finite()) {
            let name = FEATURE_NAMES.get(dim).copied().unwrap_or("?");
            return Err(ScreeningError::decode(
                IN_MEMORY,
                format!("feature {name} is not finite"),
            ));
        }
        FeatureVector::from_slice(&values)
    }

    /// Decode `path` and extract its fingerprint.
    ///
    /// # Errors
    /// `ScreeningError::Decode` naming `path` when the file is unreadable.
    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<FeatureVector> {
        let path = path.as_ref();
        let waveform = decode_wav(path)?;
        let features = self.extract(&waveform).map_err(|e| match e {
            ScreeningError::Decode { reason, .. } => ScreeningError::decode(path, reason),
            other => other,
        })?;
        debug!(
            path = %path.display(),
            duration_secs = waveform.duration_secs(),
            "features extracted"
        );
        Ok(features)
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FrameConfig::default())
    }
}
