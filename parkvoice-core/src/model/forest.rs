//! Bagged CART trees with Gini impurity.

use ndarray::{ArrayView1, ArrayView2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{SplitObjective, Stats, Tree, TreeBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features tried per split; `None` = round(sqrt(n_features)).
    pub max_features: Option<usize>,
    pub bootstrap: bool,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<Tree>,
}

/// Leaves hold the positive fraction of the rows that reached them.
struct Gini<'a> {
    y: &'a [u8],
}

impl SplitObjective for Gini<'_> {
    fn stats_of(&self, row: usize) -> Stats {
        [1.0, self.y[row] as f64]
    }

    fn gain(&self, parent: Stats, left: Stats, right: Stats) -> Option<f64> {
        Some(weighted_gini(parent) - weighted_gini(left) - weighted_gini(right))
    }

    fn leaf_value(&self, stats: Stats) -> f64 {
        if stats[0] > 0.0 {
            stats[1] / stats[0]
        } else {
            0.0
        }
    }

    fn is_pure(&self, stats: Stats) -> bool {
        stats[1] == 0.0 || stats[1] == stats[0]
    }
}

/// `n · gini` for a node with `n` rows of which `pos` are positive.
fn weighted_gini(stats: Stats) -> f64 {
    let [n, pos] = stats;
    if n <= 0.0 {
        return 0.0;
    }
    let p = pos / n;
    n * 2.0 * p * (1.0 - p)
}

impl RandomForest {
    pub fn fit(x: ArrayView2<'_, f64>, y: &[u8], params: &RandomForestParams, seed: u64) -> Self {
        let n = x.nrows();
        let max_features = params
            .max_features
            .unwrap_or_else(|| ((x.ncols() as f64).sqrt().round() as usize).max(1));
        let builder = TreeBuilder {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            max_features: Some(max_features),
        };
        let objective = Gini { y };

        let trees = (0..params.n_estimators)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
                let rows: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                builder.build(x, rows, &objective, &mut rng)
            })
            .collect();

        Self { trees }
    }

    pub(crate) fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features).map_err(|e| format!("tree {t}: {e}"))?;
        }
        Ok(())
    }

    pub(crate) fn proba_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::{accuracy, blobs};

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = blobs(20, 1.5, 5);
        let params = RandomForestParams {
            n_estimators: 10,
            ..RandomForestParams::default()
        };
        let a = RandomForest::fit(x.view(), &y, &params, 9);
        let b = RandomForest::fit(x.view(), &y, &params, 9);
        for row in x.rows() {
            assert_eq!(a.proba_row(row), b.proba_row(row));
        }
    }

    #[test]
    fn unbagged_full_depth_tree_memorizes() {
        let (x, y) = blobs(15, 0.5, 2);
        let params = RandomForestParams {
            n_estimators: 1,
            max_features: Some(16),
            bootstrap: false,
            ..RandomForestParams::default()
        };
        let forest = RandomForest::fit(x.view(), &y, &params, 0);
        let p: Vec<f64> = x.rows().into_iter().map(|r| forest.proba_row(r)).collect();
        assert_eq!(accuracy(&p, &y), 1.0);
    }

    #[test]
    fn gini_of_pure_and_mixed_nodes() {
        assert_eq!(weighted_gini([4.0, 0.0]), 0.0);
        assert_eq!(weighted_gini([4.0, 4.0]), 0.0);
        assert_eq!(weighted_gini([4.0, 2.0]), 2.0);
    }
}
