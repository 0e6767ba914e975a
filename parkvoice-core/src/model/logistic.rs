//! L2-regularized logistic regression fitted by Newton–Raphson (IRLS).
//!
//! Objective (intercept unpenalized):
//!
//! ```text
//! ½‖w‖² + C · Σ logloss(yᵢ, σ(w·xᵢ + b))
//! ```
//!
//! With 16 features the Hessian is a 17 × 17 SPD matrix, so each Newton step
//! is one small Cholesky solve.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sigmoid;
use crate::error::{Result, ScreeningError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the largest Newton step component falls below this.
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn fit(x: ArrayView2<'_, f64>, y: &[u8], params: &LogisticParams) -> Result<Self> {
        let (n, d) = x.dim();
        let dim = d + 1;
        let mut w = Array1::<f64>::zeros(dim);

        for iter in 0..params.max_iter {
            let mut grad = Array1::<f64>::zeros(dim);
            let mut hess = Array2::<f64>::zeros((dim, dim));

            for j in 0..d {
                grad[j] = w[j];
                hess[[j, j]] = 1.0;
            }

            for i in 0..n {
                let row = x.row(i);
                let z = row.iter().zip(&w).map(|(a, b)| a * b).sum::<f64>() + w[d];
                let p = sigmoid(z);
                let r = params.c * (p - y[i] as f64);
                let s = params.c * (p * (1.0 - p)).max(1e-12);

                for a in 0..dim {
                    let xa = if a < d { row[a] } else { 1.0 };
                    grad[a] += r * xa;
                    for b in a..dim {
                        let xb = if b < d { row[b] } else { 1.0 };
                        hess[[a, b]] += s * xa * xb;
                    }
                }
            }
            for a in 0..dim {
                for b in 0..a {
                    hess[[a, b]] = hess[[b, a]];
                }
            }

            let step = cholesky_solve(&hess, &grad).ok_or_else(|| {
                ScreeningError::Other(anyhow::anyhow!(
                    "logistic regression Hessian is not positive definite"
                ))
            })?;
            w -= &step;

            let max_step = step.iter().fold(0.0f64, |m, v| m.max(v.abs()));
            if max_step < params.tol {
                debug!(iterations = iter + 1, "logistic regression converged");
                return Ok(Self::from_weights(&w, d));
            }
        }

        warn!(
            max_iter = params.max_iter,
            "logistic regression hit the iteration cap before converging"
        );
        Ok(Self::from_weights(&w, d))
    }

    fn from_weights(w: &Array1<f64>, d: usize) -> Self {
        Self {
            coefficients: w.iter().take(d).copied().collect(),
            intercept: w[d],
        }
    }

    pub(crate) fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.coefficients.len() != n_features {
            return Err(format!(
                "{} coefficients for {n_features} features",
                self.coefficients.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("non-finite weight".into());
        }
        Ok(())
    }

    pub(crate) fn proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let z = row
            .iter()
            .zip(&self.coefficients)
            .map(|(x, c)| x * c)
            .sum::<f64>()
            + self.intercept;
        sigmoid(z)
    }
}

/// Solve `A x = b` for symmetric positive definite `A`.
///
/// Returns `None` when a pivot is not positive.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // Forward: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }

    // Backward: Lᵀ x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::blobs;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn cholesky_solves_small_system() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky_solve(&a, &array![1.0, 1.0]).is_none());
    }

    #[test]
    fn gradient_vanishes_at_solution() {
        let (x, y) = blobs(30, 1.0, 11);
        let params = LogisticParams::default();
        let model = LogisticRegression::fit(x.view(), &y, &params).unwrap();

        let d = x.ncols();
        let mut grad = model.coefficients.clone();
        let mut grad_b = 0.0;
        for (i, row) in x.rows().into_iter().enumerate() {
            let r = params.c * (model.proba_row(row) - y[i] as f64);
            for j in 0..d {
                grad[j] += r * row[j];
            }
            grad_b += r;
        }
        for g in grad {
            assert_abs_diff_eq!(g, 0.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(grad_b, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn balanced_constant_input_gives_half() {
        let x = Array2::<f64>::zeros((6, 16));
        let y = [0, 1, 0, 1, 0, 1];
        let model = LogisticRegression::fit(x.view(), &y, &LogisticParams::default()).unwrap();
        assert_abs_diff_eq!(model.proba_row(x.row(0)), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn validate_checks_coefficient_count() {
        let model = LogisticRegression {
            coefficients: vec![0.1; 16],
            intercept: 0.0,
        };
        assert_eq!(model.validate(16), Ok(()));
        let short = LogisticRegression {
            coefficients: vec![0.1; 15],
            intercept: 0.0,
        };
        assert!(short.validate(16).is_err());
        let nan = LogisticRegression {
            coefficients: vec![0.1; 16],
            intercept: f64::NAN,
        };
        assert!(nan.validate(16).is_err());
    }
}
