//! Atomic file writes: temp file in the target directory, fsync, rename.
//!
//! Readers never observe a half-written artifact; a crash leaves either the
//! previous content or the new content. When the rename crosses a filesystem
//! boundary the write falls back to copy → fsync → replace.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Outcome of an atomic write
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Bytes written after line-ending normalisation
    pub bytes_written: usize,
    /// Whether the copy fallback was needed
    pub used_cross_filesystem_fallback: bool,
    pub warnings: Vec<String>,
}

/// Atomically replace `path` with `content`.
///
/// Line endings are normalised to LF. Missing parent directories are created.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let normalized = normalize_line_endings(content);
    let mut result = AtomicWriteResult {
        bytes_written: normalized.len(),
        ..AtomicWriteResult::default()
    };

    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;
    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    let temp_path = temp_file.path().to_path_buf();
    match temp_file.persist(path.as_std_path()) {
        Ok(_) => {}
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("Used cross-filesystem fallback (copy→fsync→replace)".to_string());
            // Keep the temp file alive until the copy has been made.
            let _kept = e.file;
            copy_across_filesystems(&temp_path, path)?;
        }
        Err(e) => {
            return Err(e.error)
                .with_context(|| format!("Failed to atomically write file: {path}"));
        }
    }

    Ok(result)
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(unix)]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    // EXDEV on Linux and macOS
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_filesystem_error(_err: &std::io::Error) -> bool {
    false
}

fn copy_across_filesystems(temp_path: &Path, target: &Utf8Path) -> Result<()> {
    let content = fs::read(temp_path).context("Failed to read temporary file for copy")?;

    let target_dir = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut target_temp = NamedTempFile::new_in(target_dir)
        .with_context(|| format!("Failed to create temp file in: {target_dir}"))?;
    target_temp
        .write_all(&content)
        .context("Failed to write content during cross-filesystem copy")?;
    target_temp
        .as_file()
        .sync_all()
        .context("Failed to fsync during cross-filesystem copy")?;
    target_temp
        .persist(target.as_std_path())
        .map_err(|e| e.error)
        .context("Failed to persist during cross-filesystem copy")?;

    Ok(())
}
