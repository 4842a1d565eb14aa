//! On-disk layout of an artifact root.
//!
//! ```text
//! <root>/
//!   runs/
//!     <run_id>/
//!       requirements/ design/ code/ tests/ reports/ releases/
//! ```
//!
//! Each run owns one directory, so the harness and the release of a run only
//! ever see that run's artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use forgeloop_utils::error::ArtifactError;

use crate::naming::sanitize_name;

pub const RUNS_DIR: &str = "runs";

/// `<root>/runs`
#[must_use]
pub fn runs_dir(root: &Path) -> PathBuf {
    root.join(RUNS_DIR)
}

/// `<root>/runs/<run_id>`.
///
/// # Errors
///
/// `ArtifactError::InvalidName` when `run_id` is not a single plain path
/// component.
pub fn run_root(root: &Path, run_id: &str) -> Result<PathBuf, ArtifactError> {
    if sanitize_name(run_id)? != run_id {
        return Err(ArtifactError::InvalidName {
            name: run_id.to_string(),
            reason: "run id must be a single path component".to_string(),
        });
    }
    Ok(runs_dir(root).join(run_id))
}

/// Create `<root>/runs` if needed and return it.
pub fn ensure_runs_dir(root: &Path) -> Result<PathBuf, ArtifactError> {
    let dir = runs_dir(root);
    fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
    Ok(dir)
}

/// Run ids recorded under `root`, oldest first.
///
/// Run ids start with a UTC timestamp, so name order is creation order. A
/// root without a `runs` directory has no runs.
pub fn list_runs(root: &Path) -> Result<Vec<String>, ArtifactError> {
    let dir = runs_dir(root);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ArtifactError::io(&dir, e)),
    };

    let mut runs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ArtifactError::io(&dir, e))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| ArtifactError::io(entry.path(), e))?
            .is_dir();
        if is_dir && let Some(name) = entry.file_name().to_str() {
            runs.push(name.to_string());
        }
    }
    runs.sort();
    Ok(runs)
}
