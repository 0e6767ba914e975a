//! Labeled recording discovery.
//!
//! A corpus is a root directory with one sub-directory per subject group.
//! Every group carries a single label, and every `.wav` file inside it
//! (non-recursive, extension matched case-insensitively) becomes one sample.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Sub-directory name and the label attached to its recordings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGroup {
    pub name: String,
    pub label: u8,
}

impl SubjectGroup {
    pub fn new(name: impl Into<String>, label: u8) -> Self {
        Self {
            name: name.into(),
            label,
        }
    }

    /// Groups of the reference voice corpus: two control speakers, three
    /// affected ones.
    pub fn defaults() -> Vec<SubjectGroup> {
        vec![
            SubjectGroup::new("Tessi", 0),
            SubjectGroup::new("emma", 0),
            SubjectGroup::new("DL", 1),
            SubjectGroup::new("Faces", 1),
            SubjectGroup::new("LW", 1),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSample {
    pub path: PathBuf,
    pub label: u8,
    pub group: String,
}

/// Enumerate samples in group order, files sorted by path within each group.
///
/// A missing group directory is logged and skipped, so an absent root yields
/// an empty list. A group directory that exists but cannot be listed is an
/// `Io` error.
pub fn discover(root: impl AsRef<Path>, groups: &[SubjectGroup]) -> Result<Vec<TrainingSample>> {
    let root = root.as_ref();
    let mut samples = Vec::new();

    for group in groups {
        let dir = root.join(&group.name);
        if !dir.is_dir() {
            warn!(group = %group.name, dir = %dir.display(), "group directory missing; skipping");
            continue;
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_wav(p))
            .collect();
        files.sort();

        debug!(group = %group.name, label = group.label, files = files.len(), "group scanned");
        samples.extend(files.into_iter().map(|path| TrainingSample {
            path,
            label: group.label,
            group: group.name.clone(),
        }));
    }

    Ok(samples)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}
