//! Binary classification metrics.
//!
//! Threshold metrics use the same 0.5 cut as the screening label. ROC-AUC is
//! computed from ranks (Mann–Whitney U) with tied scores sharing their average
//! rank; it is undefined when only one class is present.

use serde::{Deserialize, Serialize};

use crate::risk::DECISION_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `None` when the evaluated labels contain a single class.
    pub roc_auc: Option<f64>,
}

impl Metrics {
    /// Score `proba` (positive-class probabilities) against 0/1 labels.
    pub fn evaluate(y: &[u8], proba: &[f64]) -> Self {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut tn = 0usize;
        let mut fn_ = 0usize;
        for (&label, &p) in y.iter().zip(proba) {
            match (p >= DECISION_THRESHOLD, label == 1) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Self {
            accuracy: ratio(tp + tn, y.len()),
            precision,
            recall,
            f1,
            roc_auc: roc_auc(y, proba),
        }
    }
}

/// Area under the ROC curve, or `None` if `y` lacks either class.
pub fn roc_auc(y: &[u8], scores: &[f64]) -> Option<f64> {
    let n = y.len().min(scores.len());
    let n_pos = y[..n].iter().filter(|&&l| l == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // 1-based ranks, ties averaged.
    let mut ranks = vec![0.0f64; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = (0..n).filter(|&k| y[k] == 1).map(|k| ranks[k]).sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
