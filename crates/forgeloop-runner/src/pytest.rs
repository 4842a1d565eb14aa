//! pytest-backed verification harness

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::harness::{ArtifactSet, HarnessReport, HarnessStats, VerificationHarness};
use crate::process::{ProcessRunner, TokioRunner};
use crate::CommandSpec;

/// Default harness timeout
pub const DEFAULT_HARNESS_TIMEOUT: Duration = Duration::from_secs(60);

/// pytest exit code meaning "no tests were collected"
const PYTEST_NO_TESTS_COLLECTED: i32 = 5;

static PASSED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) passed").expect("valid regex"));
static FAILED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) failed").expect("valid regex"));
static ERROR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+) errors?\b").expect("valid regex"));

/// Extract check counts from a pytest summary line.
///
/// Errors (collection or fixture errors) count as failures.
#[must_use]
pub fn parse_pytest_summary(output: &str) -> HarnessStats {
    let count = |re: &Regex| -> u32 {
        re.captures_iter(output)
            .last()
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let passed = count(&PASSED_RE);
    let failed = count(&FAILED_RE);
    let errors = count(&ERROR_RE);

    HarnessStats {
        total: passed + failed + errors,
        failed: failed + errors,
    }
}

/// Runs `pytest` over the `tests/` directory of an on-disk artifact set.
///
/// The code directory is put on `PYTHONPATH` so generated tests can import
/// the generated modules by their bare names.
pub struct PytestHarness {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl PytestHarness {
    /// Harness invoking `python -m pytest -v --tb=short`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: OsString::from("python"),
            args: ["-m", "pytest", "-v", "--tb=short"]
                .into_iter()
                .map(OsString::from)
                .collect(),
            timeout: DEFAULT_HARNESS_TIMEOUT,
            runner: Arc::new(TokioRunner::new()),
        }
    }

    /// Override the program and leading arguments.
    #[must_use]
    pub fn with_command<I, S>(mut self, program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.program = program.into();
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    fn command_for(&self, artifacts: &ArtifactSet) -> Result<CommandSpec, RunnerError> {
        let root = artifacts
            .root()
            .ok_or_else(|| RunnerError::ConfigurationInvalid {
                reason: "pytest harness needs artifacts materialised on disk".to_string(),
            })?;
        let code_dir = artifacts
            .code_dir()
            .ok_or_else(|| RunnerError::ConfigurationInvalid {
                reason: "artifact set has no code directory".to_string(),
            })?;

        Ok(CommandSpec::new(self.program.clone())
            .args(self.args.iter().cloned())
            .arg("tests")
            .cwd(root)
            .env("PYTHONPATH", code_dir.into_os_string())
            .env("PYTHONDONTWRITEBYTECODE", "1"))
    }
}

impl Default for PytestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerificationHarness for PytestHarness {
    fn name(&self) -> &str {
        "pytest"
    }

    async fn run(&self, artifacts: &ArtifactSet) -> Result<HarnessReport, RunnerError> {
        let cmd = self.command_for(artifacts)?;
        let output = self.runner.run(&cmd, self.timeout).await?;
        let raw_output = output.combined();
        let stats = parse_pytest_summary(&raw_output);

        if output.exit_code == Some(PYTEST_NO_TESTS_COLLECTED) {
            warn!(
                tests = artifacts.tests.len(),
                "pytest collected no tests"
            );
        }

        debug!(
            exit_code = ?output.exit_code,
            total = stats.total,
            failed = stats.failed,
            truncated = output.truncated,
            "pytest finished"
        );

        Ok(HarnessReport::new(output.success(), raw_output, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Verdict;
    use crate::process::ProcessOutput;
    use std::path::PathBuf;
    use std::sync::Mutex;

    // ========================================================================
    // Summary parsing
    // ========================================================================

    #[test]
    fn test_parse_all_passed() {
        let stats = parse_pytest_summary("======== 4 passed in 0.12s ========");
        assert_eq!(stats, HarnessStats { total: 4, failed: 0 });
    }

    #[test]
    fn test_parse_mixed() {
        let stats = parse_pytest_summary("=== 2 failed, 3 passed, 1 error in 0.5s ===");
        assert_eq!(stats, HarnessStats { total: 6, failed: 3 });
    }

    #[test]
    fn test_parse_plural_errors() {
        let stats = parse_pytest_summary("=== 2 errors in 0.1s ===");
        assert_eq!(stats, HarnessStats { total: 2, failed: 2 });
    }

    #[test]
    fn test_parse_nothing_collected() {
        let stats = parse_pytest_summary("collected 0 items\n\n=== no tests ran in 0.01s ===");
        assert_eq!(stats, HarnessStats::default());
    }

    // ========================================================================
    // Harness wiring
    // ========================================================================

    struct RecordingRunner {
        seen: Mutex<Vec<CommandSpec>>,
        output: ProcessOutput,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _timeout: Duration,
        ) -> Result<ProcessOutput, RunnerError> {
            self.seen.lock().unwrap().push(cmd.clone());
            Ok(self.output.clone())
        }
    }

    fn disk_set() -> ArtifactSet {
        ArtifactSet {
            root: Some(PathBuf::from("/ws")),
            ..ArtifactSet::default()
        }
    }

    #[tokio::test]
    async fn test_runs_in_root_with_pythonpath() {
        let runner = Arc::new(RecordingRunner {
            seen: Mutex::new(Vec::new()),
            output: ProcessOutput::new(b"=== 2 passed in 0.1s ===".to_vec(), Vec::new(), Some(0)),
        });
        let harness = PytestHarness::new().with_runner(runner.clone());

        let report = harness.run(&disk_set()).await.unwrap();
        assert_eq!(report.verdict(), Verdict::Passed);

        let seen = runner.seen.lock().unwrap();
        let cmd = &seen[0];
        assert_eq!(cmd.cwd, Some(PathBuf::from("/ws")));
        assert_eq!(cmd.args.last(), Some(&OsString::from("tests")));
        assert_eq!(
            cmd.env.get(&OsString::from("PYTHONPATH")),
            Some(&OsString::from("/ws/code"))
        );
    }

    #[tokio::test]
    async fn test_no_tests_collected_is_empty_verdict() {
        let runner = Arc::new(RecordingRunner {
            seen: Mutex::new(Vec::new()),
            output: ProcessOutput::new(b"collected 0 items".to_vec(), Vec::new(), Some(5)),
        });
        let harness = PytestHarness::new().with_runner(runner);

        let report = harness.run(&disk_set()).await.unwrap();
        assert!(!report.passed);
        assert_eq!(report.verdict(), Verdict::Empty);
    }

    #[tokio::test]
    async fn test_in_memory_set_is_rejected() {
        let harness = PytestHarness::new();
        match harness.run(&ArtifactSet::default()).await {
            Err(RunnerError::ConfigurationInvalid { .. }) => {}
            other => panic!("Expected configuration error, got {other:?}"),
        }
    }
}
