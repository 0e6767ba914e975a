//! Persistent CLI settings (JSON file, working directory by default).
//!
//! Every field has a default, so a partial or missing file is fine. Values
//! given on the command line override what is read here.

use std::fs;
use std::path::{Path, PathBuf};

use parkvoice_core::{CvStrategy, FrameConfig, ModelFamily, SubjectGroup, TrainingConfig};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "parkvoice.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub corpus_dir: PathBuf,
    pub models_dir: PathBuf,
    pub groups: Vec<SubjectGroup>,
    pub seed: u64,
    pub folds: usize,
    pub test_ratio: f64,
    pub cv_strategy: CvStrategy,
    /// Candidate family names in registration order, e.g. `"random_forest"`.
    pub candidates: Vec<String>,
    pub parallel_training: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data"),
            models_dir: PathBuf::from("models"),
            groups: SubjectGroup::defaults(),
            seed: 42,
            folds: 5,
            test_ratio: 0.2,
            cv_strategy: CvStrategy::Stratified,
            candidates: ModelFamily::ALL
                .iter()
                .map(|f| f.key().to_string())
                .collect(),
            parallel_training: true,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.folds = self.folds.clamp(2, 20);
        if !self.test_ratio.is_finite() {
            self.test_ratio = 0.2;
        }
        self.test_ratio = self.test_ratio.clamp(0.05, 0.5);
        self.groups.retain(|g| !g.name.trim().is_empty());
        for g in &mut self.groups {
            g.name = g.name.trim().to_string();
            g.label = g.label.min(1);
        }
        if self.groups.is_empty() {
            self.groups = SubjectGroup::defaults();
        }

        let mut families: Vec<ModelFamily> = Vec::new();
        for name in &self.candidates {
            match name.parse::<ModelFamily>() {
                Ok(f) if !families.contains(&f) => families.push(f),
                Ok(_) => {}
                Err(e) => warn!("ignoring candidate: {e}"),
            }
        }
        if families.is_empty() {
            families = ModelFamily::ALL.to_vec();
        }
        self.candidates = families.iter().map(|f| f.key().to_string()).collect();
    }

    /// Candidates as families; assumes `normalize` has run.
    pub fn candidate_families(&self) -> Vec<ModelFamily> {
        self.candidates
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect()
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            groups: self.groups.clone(),
            test_ratio: self.test_ratio,
            folds: self.folds,
            cv_strategy: self.cv_strategy,
            seed: self.seed,
            candidates: self.candidate_families(),
            frame: FrameConfig::default(),
            parallel: self.parallel_training,
        }
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "unreadable settings; using defaults");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}
