//! Artifact stores.
//!
//! A store holds named text artifacts under a fixed set of categories. Names
//! are flat: `save` strips directory prefixes, so a repair that returns
//! `tests/test_x.py` overwrites `tests/test_x.py` rather than creating
//! `tests/tests/test_x.py`.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use strum::IntoEnumIterator;
use tracing::debug;

use forgeloop_runner::ArtifactSet;
use forgeloop_utils::atomic_write::write_file_atomic;
use forgeloop_utils::error::ArtifactError;

use crate::naming::{Category, sanitize_name};

pub trait ArtifactStore: Send + Sync {
    /// Write `content` under `category`, replacing any artifact of the same
    /// name. Returns the sanitised name actually stored.
    fn save(&self, category: Category, name: &str, content: &str)
    -> Result<String, ArtifactError>;

    /// Artifact names in `category`, sorted
    fn list(&self, category: Category) -> Result<Vec<String>, ArtifactError>;

    fn read(&self, category: Category, name: &str) -> Result<String, ArtifactError>;

    fn exists(&self, category: Category, name: &str) -> bool {
        self.read(category, name).is_ok()
    }

    /// Filesystem root, when the store is backed by a directory tree
    fn root(&self) -> Option<&Path>;

    /// Every artifact in `category` by name
    fn read_all(&self, category: Category) -> Result<BTreeMap<String, String>, ArtifactError> {
        self.list(category)?
            .into_iter()
            .map(|name| {
                let content = self.read(category, &name)?;
                Ok((name, content))
            })
            .collect()
    }

    /// Code and tests as handed to the verification harness
    fn snapshot(&self) -> Result<ArtifactSet, ArtifactError> {
        Ok(ArtifactSet {
            root: self.root().map(Path::to_path_buf),
            code: self.read_all(Category::Code)?,
            tests: self.read_all(Category::Tests)?,
        })
    }
}

// ============================================================================
// Filesystem store
// ============================================================================

/// One directory per category under `root`; writes are atomic.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: Utf8PathBuf,
}

impl FsArtifactStore {
    /// Open (and create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        let root = Utf8PathBuf::from_path_buf(root).map_err(|p| ArtifactError::InvalidName {
            name: p.display().to_string(),
            reason: "artifact root is not valid UTF-8".to_string(),
        })?;
        fs::create_dir_all(&root).map_err(|e| ArtifactError::io(root.as_std_path(), e))?;
        for category in Category::iter() {
            let dir = root.join(category.as_str());
            fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(dir.as_std_path(), e))?;
        }
        Ok(Self { root })
    }

    /// Open the store owned by one run: `<root>/runs/<run_id>`.
    pub fn open_run(root: &Path, run_id: &str) -> Result<Self, ArtifactError> {
        Self::open(crate::layout::run_root(root, run_id)?)
    }

    #[must_use]
    pub fn category_dir(&self, category: Category) -> Utf8PathBuf {
        self.root.join(category.as_str())
    }

    #[must_use]
    pub fn utf8_root(&self) -> &Utf8Path {
        &self.root
    }

    fn path_for(&self, category: Category, name: &str) -> Result<Utf8PathBuf, ArtifactError> {
        Ok(self.category_dir(category).join(sanitize_name(name)?))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(
        &self,
        category: Category,
        name: &str,
        content: &str,
    ) -> Result<String, ArtifactError> {
        let clean = sanitize_name(name)?;
        let path = self.category_dir(category).join(&clean);
        write_file_atomic(&path, content)
            .map_err(|e| ArtifactError::io(path.as_std_path(), io::Error::other(format!("{e:#}"))))?;
        debug!(category = %category, name = %clean, bytes = content.len(), "Saved artifact");
        Ok(clean)
    }

    fn list(&self, category: Category) -> Result<Vec<String>, ArtifactError> {
        let dir = self.category_dir(category);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArtifactError::io(dir.as_std_path(), e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ArtifactError::io(dir.as_std_path(), e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if let Some(name) = entry.file_name().to_str()
                && is_file
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, category: Category, name: &str) -> Result<String, ArtifactError> {
        let path = self.path_for(category, name)?;
        fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ArtifactError::NotFound {
                    category: category.to_string(),
                    name: name.to_string(),
                }
            } else {
                ArtifactError::io(path.as_std_path(), e)
            }
        })
    }

    fn exists(&self, category: Category, name: &str) -> bool {
        self.path_for(category, name)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn root(&self) -> Option<&Path> {
        Some(self.root.as_std_path())
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<BTreeMap<Category, BTreeMap<String, String>>>,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(
        &self,
        category: Category,
        name: &str,
        content: &str,
    ) -> Result<String, ArtifactError> {
        let clean = sanitize_name(name)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(category)
            .or_default()
            .insert(clean.clone(), content.to_string());
        Ok(clean)
    }

    fn list(&self, category: Category) -> Result<Vec<String>, ArtifactError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn read(&self, category: Category, name: &str) -> Result<String, ArtifactError> {
        let clean = sanitize_name(name)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .and_then(|m| m.get(&clean).cloned())
            .ok_or_else(|| ArtifactError::NotFound {
                category: category.to_string(),
                name: clean,
            })
    }

    fn root(&self) -> Option<&Path> {
        None
    }
}
