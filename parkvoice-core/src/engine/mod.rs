//! `InferenceContext`: the loaded screening pipeline.
//!
//! ## Lifecycle
//!
//! ```text
//! InferenceContext::load(dir)
//!     ├─► pair found + consistent → loaded; predict_* return results
//!     └─► anything else           → unloaded (error logged); predict_* → ModelNotLoaded
//! ```
//!
//! There is no global model state. A context is built once and never mutated;
//! it is `Clone + Send + Sync` and all heavy state sits behind `Arc`, so clones
//! handed to worker threads share one extractor and one artifact pair. To pick
//! up a retrained pair, build a new context.

use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, error, info};

use crate::{
    artifact::ArtifactPair,
    audio::{decode_wav, Waveform},
    error::{Result, ScreeningError},
    features::{FeatureExtractor, FeatureVector, FrameConfig, FEATURE_DIM},
    model::Classifier,
    prediction::PredictionResult,
};

#[derive(Clone)]
pub struct InferenceContext {
    extractor: Arc<FeatureExtractor>,
    pair: Option<Arc<ArtifactPair>>,
}

impl InferenceContext {
    /// Load the pair stored in `dir`.
    ///
    /// Never fails: a missing or inconsistent pair is logged and yields an
    /// unloaded context whose every prediction is `ModelNotLoaded`. Use
    /// [`InferenceContext::try_load`] to observe the cause.
    pub fn load(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        match Self::try_load(dir) {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "artifact pair unavailable; screening disabled");
                Self::unloaded()
            }
        }
    }

    /// Load the pair stored in `dir`, surfacing why it could not be used.
    pub fn try_load(dir: impl AsRef<Path>) -> Result<Self> {
        let frame = FrameConfig::default();
        let pair = ArtifactPair::load(dir, &frame)?;
        Ok(Self::from_pair(pair))
    }

    /// Wrap an in-memory pair, e.g. straight out of training.
    pub fn from_pair(pair: ArtifactPair) -> Self {
        info!(model = %pair.model_name, "inference context ready");
        Self {
            extractor: Arc::new(FeatureExtractor::new(pair.header.frame)),
            pair: Some(Arc::new(pair)),
        }
    }

    /// A context with no model. Every prediction returns `ModelNotLoaded`.
    pub fn unloaded() -> Self {
        Self {
            extractor: Arc::new(FeatureExtractor::default()),
            pair: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.pair.is_some()
    }

    pub fn pair(&self) -> Option<&ArtifactPair> {
        self.pair.as_deref()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Scale `features`, run the classifier and stratify its probability.
    pub fn predict_features(&self, features: &FeatureVector) -> Result<PredictionResult> {
        let pair = self.pair.as_ref().ok_or(ScreeningError::ModelNotLoaded)?;
        let scaled = pair.scaler.transform(features);
        let x = Array2::from_shape_vec((1, FEATURE_DIM), scaled.0.to_vec())
            .map_err(|e| ScreeningError::Other(e.into()))?;
        let proba = pair.model.predict_proba(x.view())?;
        let p = proba
            .first()
            .copied()
            .ok_or_else(|| ScreeningError::Other(anyhow::anyhow!("classifier returned no rows")))?;
        debug!(probability = p, "scored");
        PredictionResult::from_probability(p)
    }

    pub fn predict_waveform(&self, waveform: &Waveform) -> Result<PredictionResult> {
        if !self.is_loaded() {
            return Err(ScreeningError::ModelNotLoaded);
        }
        let features = self.extractor.extract(waveform)?;
        self.predict_features(&features)
    }

    /// Decode `path`, extract, and score it.
    ///
    /// # Errors
    /// - `ModelNotLoaded` if the context has no pair (checked before decoding).
    /// - `Decode` naming `path` if the file is unreadable.
    pub fn predict_file(&self, path: impl AsRef<Path>) -> Result<PredictionResult> {
        if !self.is_loaded() {
            return Err(ScreeningError::ModelNotLoaded);
        }
        let path = path.as_ref();
        let waveform = decode_wav(path)?;
        let features = self.extractor.extract(&waveform).map_err(|e| match e {
            ScreeningError::Decode { reason, .. } => ScreeningError::decode(path, reason),
            other => other,
        })?;
        let result = self.predict_features(&features)?;
        info!(
            path = %path.display(),
            probability = result.probability,
            risk = %result.risk_level,
            "screened"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("frame", self.extractor.config())
            .field("model", &self.pair.as_ref().map(|p| p.model_name.as_str()))
            .finish()
    }
}
