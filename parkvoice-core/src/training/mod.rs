//! Offline training and model selection.
//!
//! ## Stages
//!
//! ```text
//! corpus::discover()   → labeled *.wav paths, group order then sorted
//!   └─► extract        → FeatureVector per file; failures dropped and counted
//!       └─► split      → stratified train / held-out
//!           └─► scale  → StandardScaler fitted on the train rows only
//!               └─► per candidate: k-fold CV (ROC-AUC) then fit on all train rows
//!                   └─► evaluate on held-out rows, select, persist
//! ```
//!
//! Every random choice derives from `TrainingConfig::seed`, so two runs over
//! the same corpus pick the same winner with identical metrics. Candidates can
//! be trained on scoped threads; their results are re-ordered by registration
//! order before selection, so parallelism never changes the outcome.

pub mod corpus;
pub mod metrics;
pub mod split;

use std::path::Path;

use chrono::{DateTime, Utc};
use crossbeam_channel::unbounded;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::artifact::ArtifactPair;
use crate::error::{Result, ScreeningError};
use crate::features::{FeatureExtractor, FeatureVector, FrameConfig, FEATURE_DIM};
use crate::model::{Classifier, ModelFamily, TrainedModel};
use crate::scaler::StandardScaler;

use corpus::{SubjectGroup, TrainingSample};
use metrics::{mean_std, roc_auc, Metrics};
use split::{k_fold, stratified_split, CvStrategy, Fold};

/// Knobs for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Ordered group → label map.
    pub groups: Vec<SubjectGroup>,
    /// Fraction of each class held out for final evaluation.
    pub test_ratio: f64,
    /// Requested cross-validation folds.
    pub folds: usize,
    pub cv_strategy: CvStrategy,
    pub seed: u64,
    /// Candidate families in registration order. Earlier entries win ties.
    pub candidates: Vec<ModelFamily>,
    pub frame: FrameConfig,
    /// Train candidates on one thread each.
    pub parallel: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            groups: SubjectGroup::defaults(),
            test_ratio: 0.2,
            folds: 5,
            cv_strategy: CvStrategy::Stratified,
            seed: 42,
            candidates: ModelFamily::ALL.to_vec(),
            frame: FrameConfig::default(),
            parallel: true,
        }
    }
}

/// Cross-validation and held-out scores for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub family: ModelFamily,
    pub model_name: String,
    /// Mean ROC-AUC over the folds that could be scored.
    pub cv_auc_mean: Option<f64>,
    pub cv_auc_std: Option<f64>,
    pub folds_scored: usize,
    pub held_out: Metrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub winner: ModelFamily,
    pub winner_name: String,
    pub candidates: Vec<CandidateReport>,
    /// Usable samples after extraction.
    pub samples: usize,
    pub train_samples: usize,
    pub held_out_samples: usize,
    /// Files that failed to decode or extract.
    pub dropped: usize,
    pub seed: u64,
    pub trained_at: DateTime<Utc>,
}

impl TrainingReport {
    pub fn winner_report(&self) -> Option<&CandidateReport> {
        self.candidates.iter().find(|c| c.family == self.winner)
    }
}

/// The selected pair plus everything measured along the way.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub pair: ArtifactPair,
    pub report: TrainingReport,
}

pub struct TrainingHarness {
    config: TrainingConfig,
    extractor: FeatureExtractor,
}

impl TrainingHarness {
    pub fn new(config: TrainingConfig) -> Self {
        let extractor = FeatureExtractor::new(config.frame);
        Self { config, extractor }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on the corpus under `corpus_root` and write the winning pair to `out_dir`.
    pub fn run(&self, corpus_root: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<TrainingOutcome> {
        let outcome = self.train(corpus_root)?;
        let _span = info_span!("persist").entered();
        outcome.pair.save(out_dir)?;
        Ok(outcome)
    }

    /// Everything `run` does except writing artifacts.
    pub fn train(&self, corpus_root: impl AsRef<Path>) -> Result<TrainingOutcome> {
        let corpus_root = corpus_root.as_ref();
        let samples = {
            let _span = info_span!("discover", root = %corpus_root.display()).entered();
            corpus::discover(corpus_root, &self.config.groups)?
        };
        info!(files = samples.len(), "corpus discovered");
        self.train_on_samples(&samples)
    }

    pub fn train_on_samples(&self, samples: &[TrainingSample]) -> Result<TrainingOutcome> {
        let _span = info_span!("extract", files = samples.len()).entered();
        let mut features = Vec::with_capacity(samples.len());
        let mut labels = Vec::with_capacity(samples.len());
        let mut dropped = 0usize;

        for sample in samples {
            match self.extractor.extract_file(&sample.path) {
                Ok(v) => {
                    features.push(v);
                    labels.push(sample.label);
                }
                Err(e) => {
                    dropped += 1;
                    warn!(path = %sample.path.display(), error = %e, "dropping sample");
                }
            }
        }
        drop(_span);

        if features.is_empty() {
            return Err(ScreeningError::EmptyCorpus { dropped });
        }
        info!(usable = features.len(), dropped, "features extracted");
        self.fit_features(&features, &labels, dropped)
    }

    /// Split, scale, cross-validate, evaluate and select from precomputed
    /// features. `dropped` is only carried into the report.
    pub fn fit_features(
        &self,
        features: &[FeatureVector],
        labels: &[u8],
        dropped: usize,
    ) -> Result<TrainingOutcome> {
        if features.is_empty() {
            return Err(ScreeningError::EmptyCorpus { dropped });
        }
        if features.len() != labels.len() {
            return Err(ScreeningError::InsufficientSamples(format!(
                "{} feature vectors but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if self.config.candidates.is_empty() {
            return Err(ScreeningError::Other(anyhow::anyhow!(
                "no candidate model families configured"
            )));
        }

        let (train_idx, test_idx) = {
            let _span = info_span!("split", seed = self.config.seed).entered();
            stratified_split(labels, self.config.test_ratio, self.config.seed)?
        };
        let train_rows: Vec<FeatureVector> = train_idx.iter().map(|&i| features[i]).collect();
        let y_train: Vec<u8> = train_idx.iter().map(|&i| labels[i]).collect();
        let y_test: Vec<u8> = test_idx.iter().map(|&i| labels[i]).collect();
        info!(train = train_idx.len(), held_out = test_idx.len(), "split");

        let scaler = StandardScaler::fit(&train_rows)?;
        let x_train = to_matrix(train_idx.iter().map(|&i| scaler.transform(&features[i])))?;
        let x_test = to_matrix(test_idx.iter().map(|&i| scaler.transform(&features[i])))?;

        let folds = k_fold(&y_train, self.config.folds, self.config.cv_strategy, self.config.seed)?;

        let data = SplitData {
            x_train: x_train.view(),
            y_train: &y_train,
            x_test: x_test.view(),
            y_test: &y_test,
            folds: &folds,
            seed: self.config.seed,
        };
        let trained = if self.config.parallel && self.config.candidates.len() > 1 {
            train_parallel(&self.config.candidates, &data)?
        } else {
            self.config
                .candidates
                .iter()
                .map(|&family| train_candidate(family, &data))
                .collect::<Result<Vec<_>>>()?
        };

        let best = select_best(trained.iter().map(|(report, _)| report.held_out.roc_auc));
        let reports: Vec<CandidateReport> = trained.iter().map(|(r, _)| r.clone()).collect();
        let Some((winner_report, winner_model)) = trained.into_iter().nth(best) else {
            return Err(ScreeningError::Other(anyhow::anyhow!("no candidate was trained")));
        };
        info!(
            winner = %winner_report.model_name,
            auc = ?winner_report.held_out.roc_auc,
            "model selected"
        );

        let pair = ArtifactPair::new(
            self.config.frame,
            scaler,
            winner_model,
            Some(winner_report.held_out.clone()),
        );
        let report = TrainingReport {
            winner: winner_report.family,
            winner_name: winner_report.model_name,
            candidates: reports,
            samples: features.len(),
            train_samples: train_idx.len(),
            held_out_samples: test_idx.len(),
            dropped,
            seed: self.config.seed,
            trained_at: Utc::now(),
        };
        Ok(TrainingOutcome { pair, report })
    }
}

impl Default for TrainingHarness {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

/// Scaled matrices and fold layout shared read-only by all candidates.
struct SplitData<'a> {
    x_train: ArrayView2<'a, f64>,
    y_train: &'a [u8],
    x_test: ArrayView2<'a, f64>,
    y_test: &'a [u8],
    folds: &'a [Fold],
    seed: u64,
}

fn to_matrix(rows: impl Iterator<Item = FeatureVector>) -> Result<Array2<f64>> {
    let flat: Vec<f64> = rows.flat_map(|v| v.0).collect();
    let n = flat.len() / FEATURE_DIM;
    Array2::from_shape_vec((n, FEATURE_DIM), flat).map_err(|e| ScreeningError::Other(e.into()))
}

fn train_candidate(family: ModelFamily, data: &SplitData<'_>) -> Result<(CandidateReport, TrainedModel)> {
    let _span = info_span!("candidate", model = %family).entered();

    let mut fold_scores = Vec::with_capacity(data.folds.len());
    for (k, fold) in data.folds.iter().enumerate() {
        let y_val: Vec<u8> = fold.validation.iter().map(|&i| data.y_train[i]).collect();
        if !y_val.contains(&0) || !y_val.contains(&1) {
            warn!(fold = k, "validation fold holds a single class; skipping");
            continue;
        }
        let y_fit: Vec<u8> = fold.train.iter().map(|&i| data.y_train[i]).collect();
        let x_fit = data.x_train.select(Axis(0), &fold.train);
        let x_val = data.x_train.select(Axis(0), &fold.validation);

        let model = family.fit(x_fit.view(), &y_fit, data.seed)?;
        let proba = model.predict_proba(x_val.view())?;
        if let Some(auc) = roc_auc(&y_val, &proba.to_vec()) {
            fold_scores.push(auc);
        }
    }

    let (cv_auc_mean, cv_auc_std) = match mean_std(&fold_scores) {
        Some((m, s)) => (Some(m), Some(s)),
        None => (None, None),
    };

    let model = family.fit(data.x_train, data.y_train, data.seed)?;
    let proba = model.predict_proba(data.x_test)?;
    let held_out = Metrics::evaluate(data.y_test, &proba.to_vec());
    info!(
        cv_auc = ?cv_auc_mean,
        held_out_auc = ?held_out.roc_auc,
        accuracy = held_out.accuracy,
        "candidate evaluated"
    );

    Ok((
        CandidateReport {
            family,
            model_name: family.display_name().to_string(),
            cv_auc_mean,
            cv_auc_std,
            folds_scored: fold_scores.len(),
            held_out,
        },
        model,
    ))
}

fn train_parallel(
    candidates: &[ModelFamily],
    data: &SplitData<'_>,
) -> Result<Vec<(CandidateReport, TrainedModel)>> {
    let (tx, rx) = unbounded();
    std::thread::scope(|scope| {
        for (idx, &family) in candidates.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                // Receiver outlives the scope; a send can only fail if it was dropped.
                let _ = tx.send((idx, train_candidate(family, data)));
            });
        }
    });
    drop(tx);

    let mut results: Vec<(usize, Result<(CandidateReport, TrainedModel)>)> = rx.iter().collect();
    if results.len() != candidates.len() {
        return Err(ScreeningError::Other(anyhow::anyhow!(
            "{} of {} candidate workers reported back",
            results.len(),
            candidates.len()
        )));
    }
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

/// Index of the highest score; strict `>` so the earliest candidate keeps a
/// tie, and an undefined score ranks below every defined one.
fn select_best(scores: impl IntoIterator<Item = Option<f64>>) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, score) in scores.into_iter().enumerate() {
        let score = score.filter(|s| !s.is_nan()).unwrap_or(f64::NEG_INFINITY);
        if i == 0 || score > best_score {
            best = i;
            best_score = score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Separable 16-d features: positives shifted on the first two dimensions.
    fn synthetic(n_per_class: usize, seed: u64) -> (Vec<FeatureVector>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class * 2 {
            let label = (i % 2) as u8;
            let mut v = [0.0; FEATURE_DIM];
            for (d, slot) in v.iter_mut().enumerate() {
                let shift = if d < 2 && label == 1 { 4.0 } else { 0.0 };
                *slot = rng.gen_range(-1.0..1.0) + shift;
            }
            features.push(FeatureVector(v));
            labels.push(label);
        }
        (features, labels)
    }

    fn quick_config(parallel: bool) -> TrainingConfig {
        TrainingConfig {
            parallel,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn matrix_rows_follow_vector_order() {
        let rows = [FeatureVector([1.0; FEATURE_DIM]), FeatureVector([2.0; FEATURE_DIM])];
        let x = to_matrix(rows.into_iter()).unwrap();
        assert_eq!(x.dim(), (2, FEATURE_DIM));
        assert_eq!(x[[0, FEATURE_DIM - 1]], 1.0);
        assert_eq!(x[[1, 0]], 2.0);
        assert_eq!(to_matrix(std::iter::empty()).unwrap().dim(), (0, FEATURE_DIM));
    }

    #[test]
    fn selection_prefers_higher_and_keeps_earlier_on_tie() {
        assert_eq!(select_best([Some(0.7), Some(0.9), Some(0.8)]), 1);
        assert_eq!(select_best([Some(0.9), Some(0.9), Some(0.9)]), 0);
        assert_eq!(select_best([None, Some(0.1)]), 1);
        assert_eq!(select_best([None, None]), 0);
        assert_eq!(select_best([Some(0.5), Some(f64::NAN)]), 0);
    }

    #[test]
    fn separable_features_train_a_strong_winner() {
        let (features, labels) = synthetic(30, 1);
        let harness = TrainingHarness::new(quick_config(false));
        let outcome = harness.fit_features(&features, &labels, 2).unwrap();
        let report = &outcome.report;

        assert_eq!(report.candidates.len(), 3);
        assert_eq!(report.samples, 60);
        assert_eq!(report.train_samples + report.held_out_samples, 60);
        assert_eq!(report.held_out_samples, 12);
        assert_eq!(report.dropped, 2);
        let winner = report.winner_report().unwrap();
        assert!(winner.held_out.roc_auc.unwrap() > 0.9);
        assert!(report
            .candidates
            .iter()
            .all(|c| c.folds_scored == 5 && c.cv_auc_mean.is_some()));
        assert_eq!(outcome.pair.model.family(), report.winner);
        assert_eq!(outcome.pair.model_name, report.winner_name);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let (features, labels) = synthetic(20, 5);
        let seq = TrainingHarness::new(quick_config(false))
            .fit_features(&features, &labels, 0)
            .unwrap();
        let par = TrainingHarness::new(quick_config(true))
            .fit_features(&features, &labels, 0)
            .unwrap();
        assert_eq!(seq.report.winner, par.report.winner);
        assert_eq!(seq.report.candidates, par.report.candidates);
    }

    #[test]
    fn empty_features_are_an_empty_corpus() {
        let harness = TrainingHarness::default();
        assert!(matches!(
            harness.fit_features(&[], &[], 3),
            Err(ScreeningError::EmptyCorpus { dropped: 3 })
        ));
    }

    #[test]
    fn single_class_corpus_is_rejected() {
        let (features, _) = synthetic(5, 0);
        let labels = vec![1u8; features.len()];
        assert!(matches!(
            TrainingHarness::default().fit_features(&features, &labels, 0),
            Err(ScreeningError::InsufficientSamples(_))
        ));
    }

    #[test]
    fn unreadable_files_are_dropped_then_reported() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<TrainingSample> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("{i}.wav"));
                std::fs::write(&path, b"not a riff file").unwrap();
                TrainingSample {
                    path,
                    label: (i % 2) as u8,
                    group: "g".into(),
                }
            })
            .collect();
        assert!(matches!(
            TrainingHarness::default().train_on_samples(&samples),
            Err(ScreeningError::EmptyCorpus { dropped: 3 })
        ));
    }
}
