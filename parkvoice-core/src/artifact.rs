//! Persisted {scaler, classifier} pairs.
//!
//! ## Layout
//!
//! | File          | Contents                                              |
//! |---------------|-------------------------------------------------------|
//! | `scaler.json` | header + fitted `StandardScaler`                      |
//! | `model.json`  | header + winning `TrainedModel` + SHA-256 of scaler   |
//!
//! Both headers carry the feature schema tag, the vector width and the frame
//! parameters in force when the pair was trained. `load` rejects a pair whose
//! headers disagree with the running extractor, and a model whose recorded
//! scaler digest does not match the `scaler.json` sitting next to it. The two
//! files are therefore independently readable but only loadable together.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, ScreeningError};
use crate::features::{FrameConfig, FEATURE_DIM, FEATURE_SCHEMA};
use crate::model::{Classifier, TrainedModel};
use crate::scaler::StandardScaler;
use crate::training::metrics::Metrics;

pub const SCALER_FILE: &str = "scaler.json";
pub const MODEL_FILE: &str = "model.json";

/// Feature-space description shared by both files of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub schema: String,
    pub feature_dim: usize,
    pub frame: FrameConfig,
    pub created_at: DateTime<Utc>,
}

impl ArtifactHeader {
    /// Header describing the extractor compiled into this binary.
    pub fn current(frame: FrameConfig) -> Self {
        Self {
            schema: FEATURE_SCHEMA.to_string(),
            feature_dim: FEATURE_DIM,
            frame,
            created_at: Utc::now(),
        }
    }

    fn check(&self, file: &Path, frame: &FrameConfig) -> Result<()> {
        if self.schema != FEATURE_SCHEMA {
            return Err(ScreeningError::ArtifactMismatch(format!(
                "{} was trained for feature schema '{}', this build extracts '{}'",
                file.display(),
                self.schema,
                FEATURE_SCHEMA
            )));
        }
        if self.feature_dim != FEATURE_DIM {
            return Err(ScreeningError::DimensionMismatch {
                expected: FEATURE_DIM,
                actual: self.feature_dim,
            });
        }
        if &self.frame != frame {
            return Err(ScreeningError::ArtifactMismatch(format!(
                "{} was trained with frame parameters {:?}, extractor uses {:?}",
                file.display(),
                self.frame,
                frame
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub header: ArtifactHeader,
    pub scaler: StandardScaler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub header: ArtifactHeader,
    pub model_name: String,
    /// Lowercase hex SHA-256 of the exact `scaler.json` bytes this model pairs with.
    pub scaler_digest: String,
    /// Held-out metrics recorded at selection time, if any.
    #[serde(default)]
    pub metrics: Option<Metrics>,
    pub model: TrainedModel,
}

/// A loaded, validated scaler + classifier. Immutable once built.
#[derive(Debug, Clone)]
pub struct ArtifactPair {
    pub header: ArtifactHeader,
    pub scaler: StandardScaler,
    pub model: TrainedModel,
    pub model_name: String,
    pub metrics: Option<Metrics>,
}

impl ArtifactPair {
    pub fn new(
        frame: FrameConfig,
        scaler: StandardScaler,
        model: TrainedModel,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            header: ArtifactHeader::current(frame),
            model_name: model.family().display_name().to_string(),
            scaler,
            model,
            metrics,
        }
    }

    /// Write `scaler.json` then `model.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let scaler_bytes = serde_json::to_vec_pretty(&ScalerArtifact {
            header: self.header.clone(),
            scaler: self.scaler.clone(),
        })?;
        let model_bytes = serde_json::to_vec_pretty(&ModelArtifact {
            header: self.header.clone(),
            model_name: self.model_name.clone(),
            scaler_digest: digest_hex(&scaler_bytes),
            metrics: self.metrics.clone(),
            model: self.model.clone(),
        })?;

        write_replacing(&dir.join(SCALER_FILE), &scaler_bytes)?;
        write_replacing(&dir.join(MODEL_FILE), &model_bytes)?;

        info!(
            dir = %dir.display(),
            model = %self.model_name,
            schema = %self.header.schema,
            "artifact pair written"
        );
        Ok(())
    }

    /// Load and cross-check the pair stored in `dir` against `frame`.
    ///
    /// # Errors
    /// - `ModelNotFound` if either file is missing.
    /// - `InvalidArtifact` if either file is not a valid artifact, or the
    ///   model does not fit the 16-wide feature space (wrong weight count,
    ///   out-of-range split feature, broken tree links).
    /// - `ArtifactMismatch` / `DimensionMismatch` if the headers disagree with
    ///   the extractor, or the model was not trained alongside this scaler.
    pub fn load(dir: impl AsRef<Path>, frame: &FrameConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let scaler_path = dir.join(SCALER_FILE);
        let model_path = dir.join(MODEL_FILE);

        let scaler_bytes = read_artifact(&scaler_path)?;
        let model_bytes = read_artifact(&model_path)?;

        let scaler_art: ScalerArtifact = parse(&scaler_path, &scaler_bytes)?;
        let model_art: ModelArtifact = parse(&model_path, &model_bytes)?;

        scaler_art.header.check(&scaler_path, frame)?;
        model_art.header.check(&model_path, frame)?;

        let digest = digest_hex(&scaler_bytes);
        if digest != model_art.scaler_digest {
            return Err(ScreeningError::ArtifactMismatch(format!(
                "{} was trained with a different scaler (expected digest {}, found {})",
                model_path.display(),
                model_art.scaler_digest,
                digest
            )));
        }

        model_art.model.validate(FEATURE_DIM).map_err(|e| {
            ScreeningError::InvalidArtifact(format!("{}: {e}", model_path.display()))
        })?;

        info!(
            dir = %dir.display(),
            model = %model_art.model_name,
            "artifact pair loaded"
        );

        Ok(Self {
            header: model_art.header,
            scaler: scaler_art.scaler,
            model: model_art.model,
            model_name: model_art.model_name,
            metrics: model_art.metrics,
        })
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(ScreeningError::ModelNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read(path)?)
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ScreeningError::InvalidArtifact(format!("{}: {e}", path.display())))
}

/// Write through a sibling temp file so a crash never leaves half a blob.
fn write_replacing(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp: PathBuf = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::blobs;
    use crate::model::ModelFamily;

    fn sample_pair() -> ArtifactPair {
        let (x, y) = blobs(10, 2.0, 1);
        let model = ModelFamily::LogisticRegression.fit(x.view(), &y, 0).unwrap();
        let scaler = StandardScaler::from_parts([0.5; FEATURE_DIM], [2.0; FEATURE_DIM]);
        ArtifactPair::new(FrameConfig::default(), scaler, model, None)
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let pair = sample_pair();
        pair.save(dir.path()).unwrap();

        let loaded = ArtifactPair::load(dir.path(), &FrameConfig::default()).unwrap();
        assert_eq!(loaded.scaler, pair.scaler);
        assert_eq!(loaded.model_name, "Logistic Regression");
        assert_eq!(loaded.header.schema, FEATURE_SCHEMA);
    }

    #[test]
    fn missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        sample_pair().save(dir.path()).unwrap();
        fs::remove_file(dir.path().join(MODEL_FILE)).unwrap();

        match ArtifactPair::load(dir.path(), &FrameConfig::default()) {
            Err(ScreeningError::ModelNotFound { path }) => {
                assert!(path.ends_with(MODEL_FILE))
            }
            other => panic!("expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn swapped_scaler_is_rejected() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        sample_pair().save(a.path()).unwrap();

        let mut other = sample_pair();
        other.scaler = StandardScaler::from_parts([9.0; FEATURE_DIM], [3.0; FEATURE_DIM]);
        other.save(b.path()).unwrap();

        fs::copy(b.path().join(SCALER_FILE), a.path().join(SCALER_FILE)).unwrap();
        assert!(matches!(
            ArtifactPair::load(a.path(), &FrameConfig::default()),
            Err(ScreeningError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn drifted_frame_parameters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        sample_pair().save(dir.path()).unwrap();
        let drifted = FrameConfig {
            hop_length: 256,
            ..FrameConfig::default()
        };
        assert!(matches!(
            ArtifactPair::load(dir.path(), &drifted),
            Err(ScreeningError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn foreign_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut pair = sample_pair();
        pair.header.schema = "someone-elses-features.v9".into();
        pair.save(dir.path()).unwrap();
        assert!(matches!(
            ArtifactPair::load(dir.path(), &FrameConfig::default()),
            Err(ScreeningError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn garbage_json_is_invalid_artifact() {
        let dir = tempfile::tempdir().unwrap();
        sample_pair().save(dir.path()).unwrap();
        fs::write(dir.path().join(MODEL_FILE), b"{ not json").unwrap();
        assert!(matches!(
            ArtifactPair::load(dir.path(), &FrameConfig::default()),
            Err(ScreeningError::InvalidArtifact(_))
        ));
    }

    fn edit_model(dir: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let path = dir.join(MODEL_FILE);
        let mut doc: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        edit(&mut doc["model"]);
        fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    }

    fn forest_pair() -> ArtifactPair {
        let (x, y) = blobs(10, 2.0, 3);
        let model = ModelFamily::RandomForest.fit(x.view(), &y, 0).unwrap();
        let scaler = StandardScaler::from_parts([0.0; FEATURE_DIM], [1.0; FEATURE_DIM]);
        ArtifactPair::new(FrameConfig::default(), scaler, model, None)
    }

    /// Index of the first split node in the first tree.
    fn first_split(model: &serde_json::Value) -> usize {
        model["trees"][0]["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .position(|n| n["kind"] == "split")
            .unwrap()
    }

    fn assert_invalid(dir: &Path) {
        match ArtifactPair::load(dir, &FrameConfig::default()) {
            Err(ScreeningError::InvalidArtifact(msg)) => assert!(msg.contains(MODEL_FILE), "{msg}"),
            other => panic!("expected InvalidArtifact, got {other:?}"),
        }
    }

    #[test]
    fn truncated_coefficients_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        sample_pair().save(dir.path()).unwrap();
        edit_model(dir.path(), |m| {
            m["coefficients"].as_array_mut().unwrap().pop();
        });
        assert_invalid(dir.path());
    }

    #[test]
    fn split_on_unknown_feature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        forest_pair().save(dir.path()).unwrap();
        edit_model(dir.path(), |m| {
            let idx = first_split(m);
            m["trees"][0]["nodes"][idx]["feature"] = serde_json::json!(99);
        });
        assert_invalid(dir.path());
    }

    #[test]
    fn dangling_child_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        forest_pair().save(dir.path()).unwrap();
        edit_model(dir.path(), |m| {
            let idx = first_split(m);
            m["trees"][0]["nodes"][idx]["right"] = serde_json::json!(1_000_000);
        });
        assert_invalid(dir.path());
    }

    #[test]
    fn cyclic_tree_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        forest_pair().save(dir.path()).unwrap();
        edit_model(dir.path(), |m| {
            let idx = first_split(m);
            m["trees"][0]["nodes"][idx]["left"] = serde_json::json!(idx);
        });
        assert_invalid(dir.path());
    }
}
