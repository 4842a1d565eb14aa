//! Artifact storage for forgeloop runs
//!
//! Named text artifacts live under fixed categories (`requirements`,
//! `design`, `code`, `tests`, `reports`, `releases`). This crate also owns
//! the JSONL iteration log, the per-run directory layout and release
//! packaging.

mod iteration_log;
pub mod layout;
mod naming;
mod release;
mod store;

pub use forgeloop_runner::ArtifactSet;
pub use iteration_log::{ITERATION_LOG_FILE, IterationLog};
pub use layout::{RUNS_DIR, ensure_runs_dir, list_runs, run_root, runs_dir};
pub use naming::{Category, classify, sanitize_name};
pub use release::{ReleaseInfo, package_release};
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
