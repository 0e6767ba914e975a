//! Binary decision trees shared by the forest and the booster.
//!
//! A tree is a flat `Vec<Node>` with the root at index 0. Rows go left when
//! `x[feature] <= threshold`. Thresholds sit halfway between adjacent distinct
//! training values.
//!
//! Growth is greedy and exhaustive over the candidate features of each node.
//! What a split is worth is delegated to a [`SplitObjective`]: Gini impurity
//! for the forest, second-order loss reduction for the booster. Both objectives
//! summarize a set of rows by two additive sums, which keeps the sweep over
//! sorted feature values a single running subtraction.

use ndarray::{ArrayView1, ArrayView2};
use rand::{rngs::StdRng, seq::index::sample};
use serde::{Deserialize, Serialize};

/// Two additive sums summarizing a set of rows.
pub(crate) type Stats = [f64; 2];

fn add(a: Stats, b: Stats) -> Stats {
    [a[0] + b[0], a[1] + b[1]]
}

fn sub(a: Stats, b: Stats) -> Stats {
    [a[0] - b[0], a[1] - b[1]]
}

pub(crate) trait SplitObjective {
    fn stats_of(&self, row: usize) -> Stats;

    /// Improvement from splitting `parent` into `left` + `right`, or `None`
    /// if the split violates a constraint.
    fn gain(&self, parent: Stats, left: Stats, right: Stats) -> Option<f64>;

    fn leaf_value(&self, stats: Stats) -> f64;

    /// Whether a node can no longer be improved regardless of features.
    fn is_pure(&self, _stats: Stats) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Check the layout `predict` relies on: a non-empty node list, split
    /// features below `n_features`, children that point strictly forward and
    /// stay in range, and finite thresholds and leaf values.
    ///
    /// Forward-only children make every walk terminate.
    pub fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let len = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("node {idx}: non-finite leaf value {value}"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!(
                            "node {idx}: split on feature {feature}, only {n_features} exist"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx}: non-finite threshold {threshold}"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= len {
                            return Err(format!(
                                "node {idx}: child index {child} outside {}..{len}",
                                idx + 1
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Multiply every leaf value by `factor` (booster shrinkage).
    pub(crate) fn scale_leaves(&mut self, factor: f64) {
        for node in self.nodes.iter_mut() {
            if let Node::Leaf { value } = node {
                *value *= factor;
            }
        }
    }
}

/// Growth limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeBuilder {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features examined per node; `None` means all of them.
    pub max_features: Option<usize>,
}

struct Best {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl TreeBuilder {
    /// Grow a tree on `rows` (indices into `x`, duplicates allowed).
    ///
    /// `rng` is only consulted when `max_features` restricts the search.
    pub fn build<O: SplitObjective>(
        &self,
        x: ArrayView2<'_, f64>,
        rows: Vec<usize>,
        objective: &O,
        rng: &mut StdRng,
    ) -> Tree {
        let mut nodes = Vec::new();
        self.grow(x, rows, objective, rng, 0, &mut nodes);
        Tree { nodes }
    }

    fn grow<O: SplitObjective>(
        &self,
        x: ArrayView2<'_, f64>,
        rows: Vec<usize>,
        objective: &O,
        rng: &mut StdRng,
        depth: usize,
        nodes: &mut Vec<Node>,
    ) -> usize {
        let stats = rows
            .iter()
            .fold([0.0, 0.0], |acc, &r| add(acc, objective.stats_of(r)));
        let id = nodes.len();
        nodes.push(Node::Leaf {
            value: objective.leaf_value(stats),
        });

        let depth_exhausted = self.max_depth.is_some_and(|max| depth >= max);
        if depth_exhausted || rows.len() < self.min_samples_split || objective.is_pure(stats) {
            return id;
        }

        let Some(best) = self.best_split(x, &rows, stats, objective, rng) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, best.feature]] <= best.threshold);

        let left = self.grow(x, left_rows, objective, rng, depth + 1, nodes);
        let right = self.grow(x, right_rows, objective, rng, depth + 1, nodes);
        nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn best_split<O: SplitObjective>(
        &self,
        x: ArrayView2<'_, f64>,
        rows: &[usize],
        parent: Stats,
        objective: &O,
        rng: &mut StdRng,
    ) -> Option<Best> {
        if rows.len() < 2 {
            return None;
        }
        let n_features = x.ncols();
        let features: Vec<usize> = match self.max_features {
            Some(k) if k < n_features => {
                let mut picked = sample(rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        };

        let mut best: Option<Best> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(rows.len());

        for &f in &features {
            sorted.clear();
            sorted.extend(rows.iter().map(|&r| (x[[r, f]], r)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = [0.0, 0.0];
            for k in 0..sorted.len() - 1 {
                left = add(left, objective.stats_of(sorted[k].1));
                let (value, next) = (sorted[k].0, sorted[k + 1].0);
                if value == next {
                    continue;
                }
                let right = sub(parent, left);
                let Some(gain) = objective.gain(parent, left, right) else {
                    continue;
                };
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(Best {
                        gain,
                        feature: f,
                        threshold: value + (next - value) / 2.0,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    /// Mean-of-target regression with squared error, for exercising the builder.
    struct MeanSquared<'a>(&'a [f64]);

    impl SplitObjective for MeanSquared<'_> {
        fn stats_of(&self, row: usize) -> Stats {
            [1.0, self.0[row]]
        }

        fn gain(&self, parent: Stats, left: Stats, right: Stats) -> Option<f64> {
            let score = |s: Stats| s[1] * s[1] / s[0];
            Some(score(left) + score(right) - score(parent))
        }

        fn leaf_value(&self, stats: Stats) -> f64 {
            stats[1] / stats[0]
        }
    }

    #[test]
    fn splits_step_function_at_midpoint() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [0.0, 0.0, 1.0, 1.0];
        let builder = TreeBuilder {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = builder.build(x.view(), (0..4).collect(), &MeanSquared(&y), &mut rng);

        match &tree.nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 2.5);
            }
            other => panic!("expected split at root, got {other:?}"),
        }
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(array![2.5].view()), 0.0);
        assert_eq!(tree.predict(array![2.6].view()), 1.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0], [8.0]];
        let y = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let builder = TreeBuilder {
            max_depth: Some(2),
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = builder.build(x.view(), (0..8).collect(), &MeanSquared(&y), &mut rng);
        assert!(tree.depth() <= 2);
    }

    #[test]
    fn constant_feature_yields_single_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [0.0, 1.0, 1.0];
        let builder = TreeBuilder {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = builder.build(x.view(), (0..3).collect(), &MeanSquared(&y), &mut rng);
        assert_eq!(tree.nodes.len(), 1);
        assert!((tree.predict(array![1.0].view()) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn scale_leaves_only_touches_leaves() {
        let mut tree = Tree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { value: 2.0 },
                Node::Leaf { value: -4.0 },
            ],
        };
        tree.scale_leaves(0.5);
        assert_eq!(tree.predict(array![-1.0].view()), 1.0);
        assert_eq!(tree.predict(array![1.0].view()), -2.0);
    }

    fn stump(feature: usize, left: usize, right: usize) -> Tree {
        Tree {
            nodes: vec![
                Node::Split {
                    feature,
                    threshold: 0.5,
                    left,
                    right,
                },
                Node::Leaf { value: 0.0 },
                Node::Leaf { value: 1.0 },
            ],
        }
    }

    #[test]
    fn validate_accepts_built_trees() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0]];
        let y = [0.0, 0.0, 1.0, 1.0];
        let builder = TreeBuilder {
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = builder.build(x.view(), (0..4).collect(), &MeanSquared(&y), &mut rng);
        assert_eq!(tree.validate(2), Ok(()));
        assert_eq!(stump(0, 1, 2).validate(1), Ok(()));
    }

    #[test]
    fn validate_rejects_out_of_range_feature() {
        let err = stump(99, 1, 2).validate(16).unwrap_err();
        assert!(err.contains("feature 99"), "{err}");
    }

    #[test]
    fn validate_rejects_dangling_and_backward_children() {
        assert!(stump(0, 1, 7).validate(16).is_err());
        // A self-loop would make `predict` spin forever.
        assert!(stump(0, 0, 2).validate(16).is_err());
    }

    #[test]
    fn validate_rejects_empty_and_non_finite() {
        assert!(Tree { nodes: vec![] }.validate(16).is_err());
        let tree = Tree {
            nodes: vec![Node::Leaf { value: f64::NAN }],
        };
        assert!(tree.validate(16).is_err());
    }
}
