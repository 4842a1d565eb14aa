//! The verification harness contract
//!
//! A harness executes checks against the current artifact set and reports
//! pass/fail plus statistics. The contract separates "zero
//! checks collected" from "all checks passed": see [`HarnessReport::verdict`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::RunnerError;

/// Snapshot of the artifacts a harness runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Store root when the artifacts are materialised on disk
    pub root: Option<PathBuf>,
    /// Source artifacts by name
    pub code: BTreeMap<String, String>,
    /// Test artifacts by name
    pub tests: BTreeMap<String, String>,
}

impl ArtifactSet {
    #[must_use]
    pub fn code_dir(&self) -> Option<PathBuf> {
        self.root.as_deref().map(|r| r.join("code"))
    }

    #[must_use]
    pub fn tests_dir(&self) -> Option<PathBuf> {
        self.root.as_deref().map(|r| r.join("tests"))
    }

    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.code.len() + self.tests.len()
    }
}

/// Check counts reported by a harness run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessStats {
    pub total: u32,
    pub failed: u32,
}

/// How a harness report should be interpreted by the repair loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// At least one check ran and none failed
    Passed,
    /// One or more checks failed, or the harness itself reported failure
    Failed,
    /// The harness collected no checks at all
    Empty,
}

/// Result of one harness invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessReport {
    /// What the harness itself claimed
    pub passed: bool,
    /// Raw combined output
    pub raw_output: String,
    pub stats: HarnessStats,
}

impl HarnessReport {
    #[must_use]
    pub fn new(passed: bool, raw_output: impl Into<String>, stats: HarnessStats) -> Self {
        Self {
            passed,
            raw_output: raw_output.into(),
            stats,
        }
    }

    /// Report for a harness that could not run at all (spawn failure, timeout).
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::new(false, message, HarnessStats::default())
    }

    /// Interpret the report.
    ///
    /// A run that collected zero checks is [`Verdict::Empty`] even when the
    /// harness claims success: an empty run means the artifacts were not
    /// discoverable, not that they are correct.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        if self.stats.total == 0 {
            Verdict::Empty
        } else if self.passed && self.stats.failed == 0 {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

/// The external process that verifies the current artifact set.
#[async_trait]
pub trait VerificationHarness: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Run all checks against `artifacts`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the harness cannot be executed. Check
    /// failures are not errors; they are reported through [`HarnessReport`].
    async fn run(&self, artifacts: &ArtifactSet) -> Result<HarnessReport, RunnerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u32, failed: u32) -> HarnessStats {
        HarnessStats { total, failed }
    }

    #[test]
    fn test_verdict_passed() {
        let report = HarnessReport::new(true, "2 passed", stats(2, 0));
        assert_eq!(report.verdict(), Verdict::Passed);
    }

    #[test]
    fn test_verdict_failed_counts() {
        let report = HarnessReport::new(false, "2 failed", stats(2, 2));
        assert_eq!(report.verdict(), Verdict::Failed);
    }

    #[test]
    fn test_verdict_failed_when_harness_says_so() {
        let report = HarnessReport::new(false, "exit 1", stats(3, 0));
        assert_eq!(report.verdict(), Verdict::Failed);
    }

    #[test]
    fn test_empty_run_is_not_a_pass() {
        let report = HarnessReport::new(true, "collected 0 items", stats(0, 0));
        assert_eq!(report.verdict(), Verdict::Empty);
    }

    #[test]
    fn test_fault_is_empty_and_not_passed() {
        let report = HarnessReport::fault("timed out");
        assert!(!report.passed);
        assert_eq!(report.verdict(), Verdict::Empty);
    }

    #[test]
    fn test_artifact_set_dirs() {
        let set = ArtifactSet {
            root: Some(PathBuf::from("/ws")),
            ..ArtifactSet::default()
        };
        assert_eq!(set.code_dir(), Some(PathBuf::from("/ws/code")));
        assert_eq!(set.tests_dir(), Some(PathBuf::from("/ws/tests")));
        assert_eq!(ArtifactSet::default().code_dir(), None);
    }
}
