use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use parkvoice_core::artifact::SCALER_FILE;
use parkvoice_core::{
    InferenceContext, ModelFamily, ScreeningError, SubjectGroup, TrainingConfig, TrainingHarness,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const RATE: u32 = 8_000;

fn write_wav(path: &Path, samples: &[f32]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer
            .write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

/// Steady low voiced tone.
fn calm_voice(rng: &mut StdRng) -> Vec<f32> {
    let freq = rng.gen_range(120.0..180.0f32);
    let amp = rng.gen_range(0.3..0.5f32);
    (0..RATE / 2)
        .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
        .collect()
}

/// Breathy, noisy, high-pitched tone.
fn tremulous_voice(rng: &mut StdRng) -> Vec<f32> {
    let freq = rng.gen_range(1_800.0..2_400.0f32);
    (0..RATE / 2)
        .map(|i| {
            let tone = 0.2 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin();
            tone + rng.gen_range(-0.3..0.3f32)
        })
        .collect()
}

/// Default group layout: 16 control recordings, 18 affected ones.
fn build_corpus(root: &Path) {
    let mut rng = StdRng::seed_from_u64(2024);
    for group in SubjectGroup::defaults() {
        let dir = root.join(&group.name);
        fs::create_dir_all(&dir).unwrap();
        let count = if group.label == 0 { 8 } else { 6 };
        for i in 0..count {
            let samples = if group.label == 0 {
                calm_voice(&mut rng)
            } else {
                tremulous_voice(&mut rng)
            };
            write_wav(&dir.join(format!("rec_{i:02}.wav")), &samples);
        }
    }
}

fn recording(dir: &Path, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.join(name);
    write_wav(&path, samples);
    path
}

#[test]
fn train_persist_load_and_screen() {
    let corpus = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    build_corpus(corpus.path());

    let outcome = TrainingHarness::default()
        .run(corpus.path(), models.path())
        .unwrap();
    let report = &outcome.report;
    assert_eq!(report.samples, 34);
    assert_eq!(report.dropped, 0);
    assert_eq!(report.held_out_samples, 7);
    assert_eq!(report.candidates.len(), ModelFamily::ALL.len());
    assert!(report.winner_report().unwrap().held_out.roc_auc.unwrap() >= 0.9);

    let ctx = InferenceContext::try_load(models.path()).unwrap();
    assert_eq!(ctx.pair().unwrap().model_name, report.winner_name);

    let mut rng = StdRng::seed_from_u64(77);
    let recordings = tempfile::tempdir().unwrap();
    let affected = recording(recordings.path(), "affected.wav", &tremulous_voice(&mut rng));
    let control = recording(recordings.path(), "control.wav", &calm_voice(&mut rng));

    let positive = ctx.predict_file(&affected).unwrap();
    let negative = ctx.predict_file(&control).unwrap();
    assert!(positive.is_positive(), "{positive:?}");
    assert!(!negative.is_positive(), "{negative:?}");
    assert!(positive.probability > negative.probability);

    // Persisting must not change what the model says.
    let in_memory = InferenceContext::from_pair(outcome.pair.clone());
    let before = in_memory.predict_file(&affected).unwrap();
    assert_abs_diff_eq!(before.probability, positive.probability, epsilon = 1e-9);
    assert_eq!(before.risk_level, positive.risk_level);
}

#[test]
fn silent_recording_still_gets_a_verdict() {
    let corpus = tempfile::tempdir().unwrap();
    build_corpus(corpus.path());
    let outcome = TrainingHarness::default().train(corpus.path()).unwrap();
    let ctx = InferenceContext::from_pair(outcome.pair);

    let dir = tempfile::tempdir().unwrap();
    let silent = recording(dir.path(), "silent.wav", &vec![0.0; RATE as usize]);
    let result = ctx.predict_file(&silent).unwrap();
    assert!((0.0..=1.0).contains(&result.probability));
    assert!(result.prediction.ends_with("Parkinson Detected"));
}

#[test]
fn training_is_reproducible() {
    let corpus = tempfile::tempdir().unwrap();
    build_corpus(corpus.path());

    let a = TrainingHarness::default().train(corpus.path()).unwrap();
    let b = TrainingHarness::new(TrainingConfig {
        parallel: false,
        ..TrainingConfig::default()
    })
    .train(corpus.path())
    .unwrap();
    assert_eq!(a.report.winner, b.report.winner);
    assert_eq!(a.report.candidates, b.report.candidates);
    assert_eq!(a.pair.scaler, b.pair.scaler);
}

#[test]
fn broken_files_are_dropped_not_fatal() {
    let corpus = tempfile::tempdir().unwrap();
    build_corpus(corpus.path());
    fs::write(corpus.path().join("Tessi").join("zz_broken.wav"), b"RIFF?").unwrap();

    let outcome = TrainingHarness::default().train(corpus.path()).unwrap();
    assert_eq!(outcome.report.dropped, 1);
    assert_eq!(outcome.report.samples, 34);
}

#[test]
fn empty_corpus_is_reported() {
    let corpus = tempfile::tempdir().unwrap();
    assert!(matches!(
        TrainingHarness::default().train(corpus.path()),
        Err(ScreeningError::EmptyCorpus { dropped: 0 })
    ));
}

#[test]
fn tampered_scaler_breaks_the_pair() {
    let corpus = tempfile::tempdir().unwrap();
    let models = tempfile::tempdir().unwrap();
    build_corpus(corpus.path());
    TrainingHarness::default()
        .run(corpus.path(), models.path())
        .unwrap();

    let scaler_path = models.path().join(SCALER_FILE);
    let mut doc: serde_json::Value =
        serde_json::from_slice(&fs::read(&scaler_path).unwrap()).unwrap();
    doc["scaler"]["mean"][0] = serde_json::json!(123.0);
    fs::write(&scaler_path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    assert!(matches!(
        InferenceContext::try_load(models.path()),
        Err(ScreeningError::ArtifactMismatch(_))
    ));
    let ctx = InferenceContext::load(models.path());
    assert!(!ctx.is_loaded());
    assert!(matches!(
        ctx.predict_file(scaler_path),
        Err(ScreeningError::ModelNotLoaded)
    ));
}
