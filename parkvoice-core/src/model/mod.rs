//! Binary probabilistic classifiers.
//!
//! The `Classifier` trait decouples inference from the estimator family: the
//! inference path only ever calls `predict_proba`. Which family backs it is
//! decided by the training harness and recorded in the persisted artifact.
//!
//! Trained models are immutable. `predict_proba` takes `&self`, and every
//! implementor is `Send + Sync`, so a single `Arc<TrainedModel>` serves
//! concurrent requests without locking.

pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod tree;

pub use boosting::{GradientBoosting, GradientBoostingParams};
pub use forest::{RandomForest, RandomForestParams};
pub use logistic::{LogisticParams, LogisticRegression};

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreeningError};
use crate::features::FEATURE_DIM;

/// Contract for probabilistic binary classifiers.
pub trait Classifier: Send + Sync {
    fn family(&self) -> ModelFamily;

    /// Positive-class probability for each row of an `n × 16` matrix of
    /// scaled features. Every returned value lies in [0, 1].
    ///
    /// # Errors
    /// `ScreeningError::DimensionMismatch` if `x` is not 16 columns wide.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

/// Estimator families the harness can train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression,
    RandomForest,
    GradientBoosting,
}

impl ModelFamily {
    /// Default candidate set, in registration order.
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::LogisticRegression,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
    ];

    /// Stable machine name; identical to the serde tag.
    pub fn key(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression => "Logistic Regression",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::GradientBoosting => "Gradient Boosting",
        }
    }

    /// Fit this family with its default hyperparameters.
    ///
    /// `y` holds 0/1 labels aligned with the rows of `x`. `seed` drives any
    /// randomness (bootstraps, feature subsampling); deterministic families
    /// ignore it.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `x` is not 16 columns wide.
    /// - `InsufficientSamples` if `x` is empty or `y` has the wrong length.
    pub fn fit(self, x: ArrayView2<'_, f64>, y: &[u8], seed: u64) -> Result<TrainedModel> {
        check_width(x.ncols())?;
        if x.nrows() == 0 {
            return Err(ScreeningError::InsufficientSamples(
                "cannot fit a classifier on zero rows".into(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(ScreeningError::InsufficientSamples(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }

        let model = match self {
            ModelFamily::LogisticRegression => {
                TrainedModel::LogisticRegression(LogisticRegression::fit(x, y, &LogisticParams::default())?)
            }
            ModelFamily::RandomForest => TrainedModel::RandomForest(RandomForest::fit(
                x,
                y,
                &RandomForestParams::default(),
                seed,
            )),
            ModelFamily::GradientBoosting => TrainedModel::GradientBoosting(
                GradientBoosting::fit(x, y, &GradientBoostingParams::default()),
            ),
        };
        Ok(model)
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl std::str::FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "logistic_regression" | "logistic" => Ok(ModelFamily::LogisticRegression),
            "random_forest" | "forest" => Ok(ModelFamily::RandomForest),
            "gradient_boosting" | "boosting" | "xgboost" => Ok(ModelFamily::GradientBoosting),
            other => Err(format!("unknown model family: {other}")),
        }
    }
}

/// A fitted model of any family. This is what gets persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl TrainedModel {
    /// Check that the model fits a `n_features`-wide input and can be walked
    /// safely: weight counts, split features, child links, finite parameters.
    ///
    /// # Errors
    /// `ScreeningError::InvalidArtifact` describing the first problem found.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        let checked = match self {
            TrainedModel::LogisticRegression(m) => m.validate(n_features),
            TrainedModel::RandomForest(m) => m.validate(n_features),
            TrainedModel::GradientBoosting(m) => m.validate(n_features),
        };
        checked.map_err(|e| {
            ScreeningError::InvalidArtifact(format!("{} model: {e}", self.family().display_name()))
        })
    }

    fn proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let p = match self {
            TrainedModel::LogisticRegression(m) => m.proba_row(row),
            TrainedModel::RandomForest(m) => m.proba_row(row),
            TrainedModel::GradientBoosting(m) => m.proba_row(row),
        };
        p.clamp(0.0, 1.0)
    }
}

impl Classifier for TrainedModel {
    fn family(&self) -> ModelFamily {
        match self {
            TrainedModel::LogisticRegression(_) => ModelFamily::LogisticRegression,
            TrainedModel::RandomForest(_) => ModelFamily::RandomForest,
            TrainedModel::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_width(x.ncols())?;
        Ok(x.rows().into_iter().map(|row| self.proba_row(row)).collect())
    }
}

fn check_width(ncols: usize) -> Result<()> {
    if ncols != FEATURE_DIM {
        return Err(ScreeningError::DimensionMismatch {
            expected: FEATURE_DIM,
            actual: ncols,
        });
    }
    Ok(())
}

/// Numerically stable logistic function.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::Array2;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::features::FEATURE_DIM;

    /// Two Gaussian-ish blobs separated along the first three dimensions.
    pub fn blobs(n_per_class: usize, shift: f64, seed: u64) -> (Array2<f64>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = n_per_class * 2;
        let mut x = Array2::<f64>::zeros((n, FEATURE_DIM));
        let mut y = Vec::with_capacity(n);
        for r in 0..n {
            let label = (r % 2) as u8;
            for c in 0..FEATURE_DIM {
                let noise: f64 = rng.gen_range(-1.0..1.0);
                let offset = if c < 3 && label == 1 { shift } else { 0.0 };
                x[[r, c]] = noise + offset;
            }
            y.push(label);
        }
        (x, y)
    }

    pub fn accuracy(p: &[f64], y: &[u8]) -> f64 {
        let hits = p
            .iter()
            .zip(y)
            .filter(|(p, y)| (**p >= 0.5) == (**y == 1))
            .count();
        hits as f64 / y.len() as f64
    }
}
