//! STFT-based features: MFCC and spectral centroid.
//!
//! ## Frontend parameters
//!
//! | Parameter       | Value                          |
//! |-----------------|--------------------------------|
//! | Hann window     | 2048 samples (periodic)        |
//! | FFT size        | 2048                           |
//! | Frequency bins  | 1025 (2048/2+1)                |
//! | Hop length      | 512                            |
//! | Centering       | 1024 zero samples each side    |
//! | Mel bands       | 128, Slaney scale + area norm  |
//! | Mel range       | 0 Hz to Nyquist                |
//! | dB floor        | peak - 80 dB                   |
//! | Cepstrum        | DCT-II (orthonormal), 13 coeffs|

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{centered_frame, FrameConfig, PadMode};

const AMIN: f64 = 1e-10;
const TOP_DB: f64 = 80.0;

/// Short-time power spectra of one waveform, one row per frame.
pub(crate) struct PowerSpectrogram {
    /// `frames[t][k]` = |X_t(k)|², `k` in `0..=n_fft/2`.
    pub frames: Vec<Vec<f64>>,
    pub n_fft: usize,
    pub sample_rate: u32,
}

/// Reusable STFT frontend; the window and FFT plan depend only on the frame
/// length, so one analyser serves every sample rate.
pub(crate) struct StftAnalyser {
    config: FrameConfig,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl StftAnalyser {
    pub fn new(config: FrameConfig) -> Self {
        let window = build_hann_window(config.frame_length);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(config.frame_length);
        Self {
            config,
            window,
            fft,
        }
    }

    pub fn power_spectrogram(&self, samples: &[f32], sample_rate: u32) -> PowerSpectrogram {
        let n_fft = self.config.frame_length;
        let n_freqs = n_fft / 2 + 1;
        let n_frames = self.config.frame_count(samples.len());

        let mut buf = vec![Complex::new(0.0f64, 0.0); n_fft];
        let mut frames = Vec::with_capacity(n_frames);

        for t in 0..n_frames {
            for (i, slot) in buf.iter_mut().enumerate() {
                let s = centered_frame(samples, &self.config, t, i, PadMode::Zero);
                *slot = Complex::new(s * self.window[i], 0.0);
            }
            self.fft.process(&mut buf);
            frames.push(buf[..n_freqs].iter().map(|c| c.norm_sqr()).collect());
        }

        PowerSpectrogram {
            frames,
            n_fft,
            sample_rate,
        }
    }
}

/// Per-coefficient MFCC means across all frames.
pub(crate) fn mean_mfcc(spec: &PowerSpectrogram, n_mels: usize, n_mfcc: usize) -> Vec<f64> {
    let fmax = spec.sample_rate as f64 / 2.0;
    let filters = build_mel_filters(spec.n_fft, spec.sample_rate, n_mels, 0.0, fmax);

    // Mel power → dB, floored relative to the loudest cell of the whole utterance.
    let mut mel_db: Vec<Vec<f64>> = spec
        .frames
        .iter()
        .map(|power| {
            filters
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(AMIN).log10()
                })
                .collect()
        })
        .collect();

    let peak = mel_db
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    for row in mel_db.iter_mut() {
        for v in row.iter_mut() {
            *v = v.max(floor);
        }
    }

    let basis = build_dct_basis(n_mels, n_mfcc);
    let mut sums = vec![0.0f64; n_mfcc];
    for row in &mel_db {
        for (k, coeffs) in basis.iter().enumerate() {
            sums[k] += coeffs.iter().zip(row).map(|(c, v)| c * v).sum::<f64>();
        }
    }

    let n = mel_db.len().max(1) as f64;
    sums.iter().map(|s| s / n).collect()
}

/// Mean spectral centroid (Hz) over all frames. Silent frames contribute 0.
pub(crate) fn mean_spectral_centroid(spec: &PowerSpectrogram) -> f64 {
    let bin_hz = spec.sample_rate as f64 / spec.n_fft as f64;
    let mut total = 0.0f64;

    for power in &spec.frames {
        let mut weighted = 0.0f64;
        let mut mass = 0.0f64;
        for (k, p) in power.iter().enumerate() {
            let magnitude = p.sqrt();
            weighted += k as f64 * bin_hz * magnitude;
            mass += magnitude;
        }
        if mass > f64::MIN_POSITIVE {
            total += weighted / mass;
        }
    }

    total / spec.frames.len().max(1) as f64
}

fn build_hann_window(n: usize) -> Vec<f64> {
    use std::f64::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos()))
        .collect()
}

fn build_mel_filters(
    fft_size: usize,
    sr: u32,
    n_mels: usize,
    fmin: f64,
    fmax: f64,
) -> Vec<Vec<f64>> {
    let n_freqs = fft_size / 2 + 1;
    let mel_min = hz_to_mel_slaney(fmin);
    let mel_max = hz_to_mel_slaney(fmax);

    let hz_pts: Vec<f64> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64)
        .map(mel_to_hz_slaney)
        .collect();
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * sr as f64 / fft_size as f64)
        .collect();

    let mut filters = vec![vec![0f64; n_freqs]; n_mels];
    for (m, filter) in filters.iter_mut().enumerate() {
        let lower = hz_pts[m];
        let center = hz_pts[m + 1];
        let upper = hz_pts[m + 2];
        let down_denom = (center - lower).max(1e-10);
        let up_denom = (upper - center).max(1e-10);
        let enorm = 2.0 / (upper - lower).max(1e-10);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let w = if freq >= lower && freq <= center {
                (freq - lower) / down_denom
            } else if freq > center && freq <= upper {
                (upper - freq) / up_denom
            } else {
                0.0
            };
            filter[k] = (w * enorm).max(0.0);
        }
    }
    filters
}

/// Orthonormal DCT-II rows, truncated to the first `n_out` coefficients.
fn build_dct_basis(n_in: usize, n_out: usize) -> Vec<Vec<f64>> {
    use std::f64::consts::PI;
    let n = n_in as f64;
    (0..n_out)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_in)
                .map(|i| scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos())
                .collect()
        })
        .collect()
}

fn hz_to_mel_slaney(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp; // 15
    let logstep = (6.4_f64).ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz_slaney(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp; // 15
    let logstep = (6.4_f64).ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}
