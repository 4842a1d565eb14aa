//! Durable, append-only JSONL log of verification attempts.
//!
//! One JSON object per line. Each append is flushed and fsynced before it
//! returns, so a crash loses at most the attempt in progress.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use forgeloop_utils::error::ArtifactError;

use crate::naming::Category;
use crate::store::ArtifactStore;

pub const ITERATION_LOG_FILE: &str = "iteration_log.jsonl";

#[derive(Debug, Clone)]
pub struct IterationLog {
    path: PathBuf,
}

impl IterationLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log location under a store root: `reports/iteration_log.jsonl`
    #[must_use]
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(Category::Reports.as_str()).join(ITERATION_LOG_FILE)
    }

    /// Log for a filesystem-backed store; `None` for in-memory stores.
    #[must_use]
    pub fn for_store(store: &dyn ArtifactStore) -> Option<Self> {
        store.root().map(|root| Self::new(Self::path_in(root)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<T: Serialize>(&self, record: &T) -> Result<(), ArtifactError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArtifactError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_data())
            .map_err(|e| ArtifactError::io(&self.path, e))?;
        Ok(())
    }

    /// Parse every record in the log.
    ///
    /// A missing file yields no records. Lines that do not parse are skipped
    /// with a warning.
    pub fn replay<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ArtifactError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArtifactError::io(path, e)),
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ArtifactError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping corrupt iteration log line"
                ),
            }
        }
        Ok(records)
    }
}
