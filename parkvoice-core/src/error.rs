use thiserror::Error;

/// All errors produced by parkvoice-core.
#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("could not decode audio at {path}: {reason}")]
    Decode {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("no scaler/classifier pair is loaded")]
    ModelNotLoaded,

    #[error("feature vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("training corpus produced no usable samples ({dropped} dropped)")]
    EmptyCorpus { dropped: usize },

    #[error("not enough samples: {0}")]
    InsufficientSamples(String),

    #[error("artifact file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("artifact pair mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("classifier produced a non-finite probability: {0}")]
    InvalidProbability(f64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScreeningError {
    pub(crate) fn decode(path: impl Into<std::path::PathBuf>, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScreeningError>;
