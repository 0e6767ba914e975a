//! # parkvoice-core
//!
//! Voice-based Parkinson's risk screening: audio in, calibrated risk tier out.
//!
//! ## Architecture
//!
//! ```text
//! WAV file → decode_wav → Waveform → FeatureExtractor → FeatureVector (16)
//!                                                            │
//!                                                 StandardScaler::transform
//!                                                            │
//!                                               Classifier::predict_proba
//!                                                            │
//!                                        RiskTier + label → PredictionResult
//! ```
//!
//! The scaler and classifier travel together as an [`ArtifactPair`] produced by
//! the [`training`] harness and loaded into an [`InferenceContext`]. Nothing
//! here is global: every model lives in a context value the caller owns.
//!
//! This is a screening aid. It is not a diagnostic device.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod artifact;
pub mod audio;
pub mod engine;
pub mod error;
pub mod features;
pub mod model;
pub mod prediction;
pub mod risk;
pub mod scaler;
pub mod training;

// Convenience re-exports for downstream crates
pub use artifact::{ArtifactHeader, ArtifactPair};
pub use audio::{decode_wav, Waveform};
pub use engine::InferenceContext;
pub use error::{Result, ScreeningError};
pub use features::{FeatureExtractor, FeatureVector, FrameConfig, FEATURE_DIM, FEATURE_SCHEMA};
pub use model::{Classifier, ModelFamily, TrainedModel};
pub use prediction::PredictionResult;
pub use risk::RiskTier;
pub use scaler::StandardScaler;
pub use training::{
    corpus::SubjectGroup, split::CvStrategy, TrainingConfig, TrainingHarness, TrainingOutcome,
    TrainingReport,
};
