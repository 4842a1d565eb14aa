use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::ring_buffer::RingBuffer;
use crate::CommandSpec;

/// Default cap applied to each captured stream
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 256 * 1024;

// ============================================================================
// ProcessOutput
// ============================================================================

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output, possibly truncated to its tail
    pub stdout: Vec<u8>,
    /// Standard error, possibly truncated to its tail
    pub stderr: Vec<u8>,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether either stream was truncated
    pub truncated: bool,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            truncated: false,
        }
    }

    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// stdout followed by stderr, as a harness would print them
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout_string();
        let err = self.stderr_string();
        if !err.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&err);
        }
        out
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

// ============================================================================
// ProcessRunner
// ============================================================================

/// Executes a [`CommandSpec`] with a hard timeout.
///
/// Implementations must use argv-style APIs only. A process still running
/// when the timeout elapses is killed and [`RunnerError::Timeout`] returned.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy)]
pub struct TokioRunner {
    output_cap_bytes: usize,
}

impl Default for TokioRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioRunner {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            output_cap_bytes: DEFAULT_OUTPUT_CAP_BYTES,
        }
    }

    /// Cap each captured stream at `bytes`, keeping the tail.
    #[must_use]
    pub const fn with_output_cap(mut self, bytes: usize) -> Self {
        self.output_cap_bytes = bytes;
        self
    }
}

#[async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, cmd: &CommandSpec, timeout: Duration) -> Result<ProcessOutput, RunnerError> {
        let mut command = cmd.to_tokio_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            command = %cmd.display(),
            timeout_secs = timeout.as_secs(),
            "Spawning process"
        );

        let child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            program: cmd.program.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RunnerError::ExecutionFailed {
                reason: format!("Failed to wait for process: {e}"),
            })?,
            Err(_) => {
                warn!(
                    command = %cmd.display(),
                    timeout_secs = timeout.as_secs(),
                    "Process timed out and was killed"
                );
                return Err(RunnerError::Timeout {
                    timeout_seconds: timeout.as_secs(),
                });
            }
        };

        let stdout = RingBuffer::from_tail(self.output_cap_bytes, &output.stdout);
        let stderr = RingBuffer::from_tail(self.output_cap_bytes, &output.stderr);

        Ok(ProcessOutput {
            truncated: stdout.was_truncated() || stderr.was_truncated(),
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            exit_code: output.status.code(),
        })
    }
}
