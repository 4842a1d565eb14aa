//! Release packaging: copy code artifacts into a timestamped release
//! directory and archive it as `.tar.gz`.

use camino::Utf8PathBuf;
use chrono::Local;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use forgeloop_utils::atomic_write::write_file_atomic;
use forgeloop_utils::error::ArtifactError;

use crate::naming::Category;
use crate::store::ArtifactStore;

/// A packaged release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    /// `release_<YYYYmmdd_HHMMSS>`
    pub name: String,
    pub directory: PathBuf,
    pub archive: PathBuf,
    /// Files included, sorted
    pub files: Vec<String>,
}

/// Package every `code` artifact of a filesystem-backed store.
///
/// # Errors
///
/// `ArtifactError::Archive` when the store has no filesystem root or holds no
/// code; `ArtifactError::Io` for copy or archive failures.
pub fn package_release(store: &dyn ArtifactStore) -> Result<ReleaseInfo, ArtifactError> {
    let root = store
        .root()
        .ok_or_else(|| ArtifactError::Archive("store has no filesystem root".to_string()))?;
    let releases = root.join(Category::Releases.as_str());

    let code = store.read_all(Category::Code)?;
    if code.is_empty() {
        return Err(ArtifactError::Archive(
            "no code artifacts to package".to_string(),
        ));
    }

    let name = unique_release_name(&releases, &Local::now().format("%Y%m%d_%H%M%S").to_string());
    let directory = releases.join(&name);
    let archive = releases.join(format!("{name}.tar.gz"));

    for (file, content) in &code {
        let dest = Utf8PathBuf::from_path_buf(directory.join(file)).map_err(|p| {
            ArtifactError::InvalidName {
                name: p.display().to_string(),
                reason: "release path is not valid UTF-8".to_string(),
            }
        })?;
        write_file_atomic(&dest, content).map_err(|e| {
            ArtifactError::io(dest.as_std_path(), io::Error::other(format!("{e:#}")))
        })?;
    }

    let files: Vec<String> = code.keys().cloned().collect();
    write_archive(&archive, &directory, &files)?;

    info!(
        release = %name,
        archive = %archive.display(),
        files = files.len(),
        "Packaged release"
    );

    Ok(ReleaseInfo {
        name,
        directory,
        archive,
        files,
    })
}

/// `release_<stamp>`, suffixed when a release from the same second exists.
fn unique_release_name(releases: &Path, stamp: &str) -> String {
    let base = format!("release_{stamp}");
    if !releases.join(&base).exists() {
        return base;
    }
    let mut n = 1u32;
    loop {
        let candidate = format!("{base}_{n}");
        if !releases.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

fn write_archive(archive: &Path, directory: &Path, files: &[String]) -> Result<(), ArtifactError> {
    let file = File::create(archive).map_err(|e| ArtifactError::io(archive, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for name in files {
        builder
            .append_path_with_name(directory.join(name), name)
            .map_err(|e| ArtifactError::Archive(format!("failed to add {name}: {e}")))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| ArtifactError::Archive(format!("failed to finish tar stream: {e}")))?;
    let file = encoder
        .finish()
        .map_err(|e| ArtifactError::Archive(format!("failed to finish gzip stream: {e}")))?;
    file.sync_all().map_err(|e| ArtifactError::io(archive, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FsArtifactStore, MemoryArtifactStore};
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn archive_entries(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_package_release() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path()).unwrap();
        store.save(Category::Code, "calc.py", "def add(a, b): ...").unwrap();
        store.save(Category::Code, "util.py", "X = 1").unwrap();
        store.save(Category::Tests, "test_calc.py", "assert True").unwrap();

        let release = package_release(&store).unwrap();

        assert!(release.name.starts_with("release_"));
        assert_eq!(release.files, vec!["calc.py", "util.py"]);
        assert!(release.directory.join("calc.py").is_file());
        assert!(!release.directory.join("test_calc.py").exists());
        assert!(release.archive.ends_with(format!("{}.tar.gz", release.name)));
        assert_eq!(archive_entries(&release.archive), vec!["calc.py", "util.py"]);
    }

    #[test]
    fn test_second_release_in_same_second_gets_suffix() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("release_20260101_000000")).unwrap();
        assert_eq!(
            unique_release_name(temp.path(), "20260101_000000"),
            "release_20260101_000000_1"
        );
        assert_eq!(
            unique_release_name(temp.path(), "20260101_000001"),
            "release_20260101_000001"
        );
    }

    #[test]
    fn test_empty_store_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path()).unwrap();
        assert!(matches!(
            package_release(&store),
            Err(ArtifactError::Archive(_))
        ));
    }

    #[test]
    fn test_memory_store_cannot_package() {
        let store = MemoryArtifactStore::new();
        store.save(Category::Code, "a.py", "").unwrap();
        assert!(matches!(
            package_release(&store),
            Err(ArtifactError::Archive(_))
        ));
    }
}
