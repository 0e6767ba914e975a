//! Time-domain features: zero-crossing rate and RMS energy.
//!
//! Both use the same centered framing as the STFT so frame `t` of every
//! feature covers the same stretch of audio. ZCR pads by repeating the edge
//! samples (a zero pad would manufacture crossings at the borders); RMS pads
//! with silence.

use super::{centered_frame, FrameConfig, PadMode};

/// Amplitudes at or below this magnitude count as exact zeros.
const ZERO_THRESHOLD: f64 = 1e-10;

/// Mean zero-crossing rate over all frames, in crossings per sample.
pub(crate) fn mean_zero_crossing_rate(samples: &[f32], config: &FrameConfig) -> f64 {
    let n_frames = config.frame_count(samples.len());
    let mut total = 0.0f64;

    for t in 0..n_frames {
        let mut crossings = 0usize;
        let mut prev_negative = is_negative(centered_frame(samples, config, t, 0, PadMode::Edge));
        for i in 1..config.frame_length {
            let negative = is_negative(centered_frame(samples, config, t, i, PadMode::Edge));
            if negative != prev_negative {
                crossings += 1;
            }
            prev_negative = negative;
        }
        total += crossings as f64 / config.frame_length as f64;
    }

    total / n_frames as f64
}

/// Mean per-frame root-mean-square amplitude.
pub(crate) fn mean_rms(samples: &[f32], config: &FrameConfig) -> f64 {
    let n_frames = config.frame_count(samples.len());
    let mut total = 0.0f64;

    for t in 0..n_frames {
        let sum_sq: f64 = (0..config.frame_length)
            .map(|i| centered_frame(samples, config, t, i, PadMode::Zero).powi(2))
            .sum();
        total += (sum_sq / config.frame_length as f64).sqrt();
    }

    total / n_frames as f64
}

/// Sign test with zero (and near-zero) treated as positive.
fn is_negative(x: f64) -> bool {
    x.abs() > ZERO_THRESHOLD && x < 0.0
}
