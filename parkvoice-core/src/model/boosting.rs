//! Gradient-boosted regression trees on the logistic loss.
//!
//! Each round fits a tree to the per-row gradient `g = p - y` and Hessian
//! `h = p(1 - p)` of the current margin, with leaf weight `-G / (H + λ)` and
//! split gain `½ [G_L²/(H_L+λ) + G_R²/(H_R+λ) - G²/(H+λ)]`. Leaf weights are
//! shrunk by the learning rate before they are stored, so prediction is a
//! plain sum of tree outputs passed through the sigmoid.
//!
//! Training uses every row and every feature each round, so the result is
//! fully deterministic.

use ndarray::{ArrayView1, ArrayView2};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::sigmoid;
use super::tree::{SplitObjective, Stats, Tree, TreeBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    /// Minimum Hessian mass on each side of a split.
    pub min_child_weight: f64,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// Margin before any tree, in logits.
    pub base_margin: f64,
    pub trees: Vec<Tree>,
}

struct Newton<'a> {
    grad: &'a [f64],
    hess: &'a [f64],
    lambda: f64,
    min_child_weight: f64,
}

impl Newton<'_> {
    fn score(&self, s: Stats) -> f64 {
        s[0] * s[0] / (s[1] + self.lambda)
    }
}

impl SplitObjective for Newton<'_> {
    fn stats_of(&self, row: usize) -> Stats {
        [self.grad[row], self.hess[row]]
    }

    fn gain(&self, parent: Stats, left: Stats, right: Stats) -> Option<f64> {
        if left[1] < self.min_child_weight || right[1] < self.min_child_weight {
            return None;
        }
        Some(0.5 * (self.score(left) + self.score(right) - self.score(parent)))
    }

    fn leaf_value(&self, stats: Stats) -> f64 {
        -stats[0] / (stats[1] + self.lambda)
    }
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<'_, f64>, y: &[u8], params: &GradientBoostingParams) -> Self {
        let n = x.nrows();
        let builder = TreeBuilder {
            max_depth: Some(params.max_depth),
            min_samples_split: 2,
            max_features: None,
        };
        // Never consulted: every feature is searched at every node.
        let mut rng = StdRng::seed_from_u64(0);

        let base_margin = 0.0;
        let mut margin = vec![base_margin; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(margin[i]);
                grad[i] = p - y[i] as f64;
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }
            let objective = Newton {
                grad: &grad,
                hess: &hess,
                lambda: params.lambda,
                min_child_weight: params.min_child_weight,
            };

            let mut tree = builder.build(x, (0..n).collect(), &objective, &mut rng);
            tree.scale_leaves(params.learning_rate);
            for (i, m) in margin.iter_mut().enumerate() {
                *m += tree.predict(x.row(i));
            }
            trees.push(tree);
        }

        Self { base_margin, trees }
    }

    pub(crate) fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if !self.base_margin.is_finite() {
            return Err(format!("non-finite base margin {}", self.base_margin));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features).map_err(|e| format!("tree {t}: {e}"))?;
        }
        Ok(())
    }

    pub(crate) fn proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let margin = self.base_margin + self.trees.iter().map(|t| t.predict(row)).sum::<f64>();
        sigmoid(margin)
    }
}
