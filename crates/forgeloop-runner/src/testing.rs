//! Test doubles for the verification harness.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::RunnerError;
use crate::harness::{ArtifactSet, HarnessReport, HarnessStats, VerificationHarness};

type RunHook = Box<dyn Fn(u32) + Send + Sync>;

/// Harness that replays canned reports in order.
///
/// Once the script is exhausted the last report is repeated. An optional
/// hook runs inside `run` with the 1-based invocation number, which lets a
/// test act while a harness call is "in flight".
pub struct ScriptedHarness {
    script: Mutex<VecDeque<HarnessReport>>,
    last: Mutex<Option<HarnessReport>>,
    calls: AtomicU32,
    seen: Mutex<Vec<ArtifactSet>>,
    hook: Option<RunHook>,
}

impl ScriptedHarness {
    #[must_use]
    pub fn new(reports: Vec<HarnessReport>) -> Self {
        Self {
            script: Mutex::new(reports.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// A harness that fails every time with `failed` of `total` checks.
    #[must_use]
    pub fn always_failing(total: u32, failed: u32) -> Self {
        Self::new(vec![failing(total, failed)])
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Artifact sets passed to each invocation, in order
    #[must_use]
    pub fn seen(&self) -> Vec<ArtifactSet> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Report with every check passing
#[must_use]
pub fn passing(total: u32) -> HarnessReport {
    HarnessReport::new(
        true,
        format!("{total} passed in 0.01s"),
        HarnessStats { total, failed: 0 },
    )
}

/// Report with `failed` of `total` checks failing
#[must_use]
pub fn failing(total: u32, failed: u32) -> HarnessReport {
    HarnessReport::new(
        false,
        format!(
            "E   ImportError: cannot import name 'add'\n{failed} failed, {} passed in 0.02s",
            total - failed
        ),
        HarnessStats { total, failed },
    )
}

#[async_trait]
impl VerificationHarness for ScriptedHarness {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, artifacts: &ArtifactSet) -> Result<HarnessReport, RunnerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(artifacts.clone());
        }
        if let Some(hook) = &self.hook {
            hook(call);
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| RunnerError::ExecutionFailed {
                reason: "scripted harness poisoned".to_string(),
            })?;

        match next {
            Some(report) => {
                *last = Some(report.clone());
                Ok(report)
            }
            None => last.clone().ok_or_else(|| RunnerError::ExecutionFailed {
                reason: "scripted harness has no reports".to_string(),
            }),
        }
    }
}
