//! Seeded train/held-out splits and k-fold partitions.
//!
//! All shuffles draw from `StdRng::seed_from_u64(seed)`, so the same labels and
//! seed always yield the same partition.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ScreeningError};

/// How cross-validation folds are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CvStrategy {
    /// Each fold keeps the overall class proportions.
    #[default]
    Stratified,
    /// Shuffle, then cut into contiguous folds.
    Shuffled,
}

/// Row indices of one fold: fit on `train`, score on `validation`.
#[derive(Debug, Clone)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

fn class_indices(labels: &[u8]) -> [Vec<usize>; 2] {
    let mut classes = [Vec::new(), Vec::new()];
    for (i, &l) in labels.iter().enumerate() {
        classes[(l != 0) as usize].push(i);
    }
    classes
}

/// Stratified shuffle split. Returns `(train, held_out)` index lists, each sorted.
///
/// Per class, `round(n_c · test_ratio)` rows go to the held-out set, clamped so
/// that both sides keep at least one row of every class.
///
/// # Errors
/// `InsufficientSamples` if either class has fewer than two rows.
pub fn stratified_split(
    labels: &[u8],
    test_ratio: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut held_out = Vec::new();

    for (class, mut rows) in class_indices(labels).into_iter().enumerate() {
        if rows.len() < 2 {
            return Err(ScreeningError::InsufficientSamples(format!(
                "class {class} has {} sample(s); a stratified split needs at least 2 per class",
                rows.len()
            )));
        }
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_ratio).round() as usize).clamp(1, rows.len() - 1);
        held_out.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }

    train.sort_unstable();
    held_out.sort_unstable();
    Ok((train, held_out))
}

/// Partition `0..labels.len()` into `k` folds.
///
/// For the stratified strategy `k` is lowered to the minority class size when
/// that class is too small to appear in every fold.
///
/// # Errors
/// `InsufficientSamples` if fewer than two folds are possible.
pub fn k_fold(labels: &[u8], k: usize, strategy: CvStrategy, seed: u64) -> Result<Vec<Fold>> {
    let n = labels.len();
    let mut rng = StdRng::seed_from_u64(seed);

    let (k, assignment) = match strategy {
        CvStrategy::Stratified => {
            let classes = class_indices(labels);
            let minority = classes.iter().map(Vec::len).min().unwrap_or(0);
            let k_eff = k.min(minority);
            if k_eff < k && k_eff >= 2 {
                warn!(requested = k, used = k_eff, "minority class too small; reducing fold count");
            }
            check_folds(k_eff, n)?;

            let mut assignment = vec![0usize; n];
            let mut counter = 0usize;
            for mut rows in classes {
                rows.shuffle(&mut rng);
                for r in rows {
                    assignment[r] = counter % k_eff;
                    counter += 1;
                }
            }
            (k_eff, assignment)
        }
        CvStrategy::Shuffled => {
            check_folds(k.min(n), n)?;
            let k = k.min(n);
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);

            let mut assignment = vec![0usize; n];
            let mut start = 0;
            for fold in 0..k {
                let size = n / k + usize::from(fold < n % k);
                for &r in &order[start..start + size] {
                    assignment[r] = fold;
                }
                start += size;
            }
            (k, assignment)
        }
    };

    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|&r| assignment[r] == fold);
            Fold { train, validation }
        })
        .collect())
}

fn check_folds(k: usize, n: usize) -> Result<()> {
    if k < 2 {
        return Err(ScreeningError::InsufficientSamples(format!(
            "cross-validation needs at least 2 folds, only {k} possible with {n} training rows"
        )));
    }
    Ok(())
}
