//! Per-dimension standardization of feature vectors.
//!
//! The scaler is fitted once on the training split and then frozen: inference
//! applies exactly the statistics that the classifier saw during training.
//!
//! ## Zero-variance policy
//!
//! A dimension whose training values are all identical has a standard
//! deviation of 0. Rather than divide by zero, `fit` stores a scale of `1.0`
//! for any non-positive or non-finite deviation, so that dimension is merely
//! centered (`x - mean`) at transform time.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScreeningError};
use crate::features::{FeatureVector, FEATURE_DIM};

/// Learned (mean, std) per feature dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; FEATURE_DIM],
    std: [f64; FEATURE_DIM],
}

impl StandardScaler {
    /// Fit population statistics (ddof = 0) over `rows`.
    ///
    /// # Errors
    /// `ScreeningError::EmptyCorpus` when `rows` is empty.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ScreeningError::EmptyCorpus { dropped: 0 });
        }
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.0).collect();
        let x = Array2::from_shape_vec((rows.len(), FEATURE_DIM), flat)
            .map_err(|e| ScreeningError::Other(e.into()))?;

        let mean_col = x
            .mean_axis(Axis(0))
            .ok_or(ScreeningError::EmptyCorpus { dropped: 0 })?;
        let std_col = x.std_axis(Axis(0), 0.0);

        let mean: [f64; FEATURE_DIM] = std::array::from_fn(|i| mean_col[i]);
        let std: [f64; FEATURE_DIM] = std::array::from_fn(|i| std_col[i]);
        Ok(Self::from_parts(mean, std))
    }

    /// Build from explicit parameters, applying the same zero-variance policy.
    pub fn from_parts(mean: [f64; FEATURE_DIM], std: [f64; FEATURE_DIM]) -> Self {
        let std = std.map(|s| if s.is_finite() && s > 0.0 { s } else { 1.0 });
        Self { mean, std }
    }

    pub fn mean(&self) -> &[f64; FEATURE_DIM] {
        &self.mean
    }

    pub fn std(&self) -> &[f64; FEATURE_DIM] {
        &self.std
    }

    pub fn transform(&self, x: &FeatureVector) -> FeatureVector {
        let mut out = [0.0f64; FEATURE_DIM];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (x.0[i] - self.mean[i]) / self.std[i];
        }
        FeatureVector(out)
    }

    /// Length-checked variant for callers holding a raw slice.
    ///
    /// # Errors
    /// `ScreeningError::DimensionMismatch` unless `x.len() == 16`.
    pub fn transform_slice(&self, x: &[f64]) -> Result<FeatureVector> {
        Ok(self.transform(&FeatureVector::from_slice(x)?))
    }

    pub fn inverse_transform(&self, z: &FeatureVector) -> FeatureVector {
        let mut out = [0.0f64; FEATURE_DIM];
        for (i, o) in out.iter_mut().enumerate() {
            *o = z.0[i] * self.std[i] + self.mean[i];
        }
        FeatureVector(out)
    }

    /// Scale every row of an `n × 16` matrix.
    ///
    /// # Errors
    /// `ScreeningError::DimensionMismatch` if the matrix is not 16 columns wide.
    pub fn transform_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != FEATURE_DIM {
            return Err(ScreeningError::DimensionMismatch {
                expected: FEATURE_DIM,
                actual: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        for mut row in out.rows_mut() {
            for (i, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[i]) / self.std[i];
            }
        }
        Ok(out)
    }
}
