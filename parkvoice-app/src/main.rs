//! parkvoice command-line host.
//!
//! ```text
//! parkvoice train   [--corpus DIR] [--out DIR] [--seed N] [--folds K] [--report FILE]
//! parkvoice predict [--models DIR] FILE...
//! parkvoice inspect [--models DIR]
//! ```
//!
//! `predict` prints one JSON object per input file, in argument order. Files
//! are scored concurrently on blocking tasks that share one `InferenceContext`.

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parkvoice_core::{InferenceContext, PredictionResult, TrainingHarness, TrainingReport};
use serde::Serialize;
use settings::{load_settings, AppSettings, DEFAULT_SETTINGS_FILE};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Voice-based Parkinson's risk screening.
#[derive(Parser, Debug)]
#[command(name = "parkvoice", version)]
#[command(about = "Train and run the voice screening model")]
struct Cli {
    /// Settings file (JSON); missing file means defaults
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE, env = "PARKVOICE_SETTINGS")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train all candidates on a labeled corpus and keep the best pair
    Train {
        /// Corpus root with one sub-directory per subject group
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Directory that receives scaler.json and model.json
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        /// Cross-validation folds
        #[arg(long)]
        folds: Option<usize>,
        /// Write the full training report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Screen one or more WAV recordings
    Predict {
        /// Directory holding a trained artifact pair
        #[arg(long)]
        models: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show what a trained artifact pair contains
    Inspect {
        #[arg(long)]
        models: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct PredictLine<'a> {
    path: &'a str,
    #[serde(flatten)]
    result: &'a PredictionResult,
}

#[derive(Serialize)]
struct ErrorLine<'a> {
    path: &'a str,
    error: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parkvoice=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.settings);

    match cli.command {
        Command::Train {
            corpus,
            out,
            seed,
            folds,
            report,
        } => {
            train(settings, corpus, out, seed, folds, report).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Predict { models, files } => {
            let dir = models.unwrap_or(settings.models_dir);
            predict(dir, files).await
        }
        Command::Inspect { models } => {
            inspect(models.unwrap_or(settings.models_dir))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn train(
    mut settings: AppSettings,
    corpus: Option<PathBuf>,
    out: Option<PathBuf>,
    seed: Option<u64>,
    folds: Option<usize>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    if let Some(seed) = seed {
        settings.seed = seed;
    }
    if let Some(folds) = folds {
        settings.folds = folds;
    }
    settings.normalize();
    let corpus = corpus.unwrap_or_else(|| settings.corpus_dir.clone());
    let out = out.unwrap_or_else(|| settings.models_dir.clone());
    let config = settings.training_config();

    info!(corpus = %corpus.display(), out = %out.display(), seed = config.seed, "training");
    let harness = TrainingHarness::new(config);
    let (corpus_c, out_c) = (corpus.clone(), out.clone());
    let outcome = tokio::task::spawn_blocking(move || harness.run(&corpus_c, &out_c))
        .await
        .context("training task panicked")?
        .with_context(|| format!("training on {} failed", corpus.display()))?;

    print_report(&outcome.report);
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&outcome.report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }
    println!("saved {} to {}", outcome.report.winner_name, out.display());
    Ok(())
}

fn print_report(report: &TrainingReport) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
    println!(
        "samples: {} (train {}, held-out {}, dropped {})",
        report.samples, report.train_samples, report.held_out_samples, report.dropped
    );
    for c in &report.candidates {
        println!(
            "{:<20} cv_auc {} ± {}  held-out: acc {:.4} prec {:.4} rec {:.4} f1 {:.4} auc {}",
            c.model_name,
            fmt(c.cv_auc_mean),
            fmt(c.cv_auc_std),
            c.held_out.accuracy,
            c.held_out.precision,
            c.held_out.recall,
            c.held_out.f1,
            fmt(c.held_out.roc_auc),
        );
    }
    println!("best model: {}", report.winner_name);
}

async fn predict(models: PathBuf, files: Vec<PathBuf>) -> Result<ExitCode> {
    let ctx = Arc::new(
        InferenceContext::try_load(&models)
            .with_context(|| format!("loading models from {}", models.display()))?,
    );

    let tasks: Vec<_> = files
        .into_iter()
        .map(|path| {
            let ctx = Arc::clone(&ctx);
            tokio::task::spawn_blocking(move || {
                let result = ctx.predict_file(&path);
                (path, result)
            })
        })
        .collect();

    let mut failures = 0usize;
    for task in tasks {
        let (path, result) = task.await.context("prediction task panicked")?;
        let shown = path.display().to_string();
        let line = match result {
            Ok(result) => serde_json::to_string(&PredictLine {
                path: &shown,
                result: &result,
            })?,
            Err(e) => {
                failures += 1;
                serde_json::to_string(&ErrorLine {
                    path: &shown,
                    error: e.to_string(),
                })?
            }
        };
        println!("{line}");
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn inspect(models: PathBuf) -> Result<()> {
    let ctx = InferenceContext::try_load(&models)
        .with_context(|| format!("loading models from {}", models.display()))?;
    let pair = ctx
        .pair()
        .context("artifact pair loaded but not attached to the context")?;
    let summary = serde_json::json!({
        "dir": models.display().to_string(),
        "model": pair.model_name,
        "header": pair.header,
        "metrics": pair.metrics,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
