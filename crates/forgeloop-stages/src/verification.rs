//! The verify → diagnose → repair loop.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use forgeloop_artifacts::{Category, IterationLog, classify};
use forgeloop_llm::{ActionRequest, Diagnosis};
use forgeloop_runner::{HarnessReport, VerificationHarness, Verdict};
use forgeloop_stage_api::{
    IterationRecord, Stage, StageError, StageResult, TerminalState, WorkflowContext, meta,
};
use forgeloop_utils::error::CollaboratorError;
use forgeloop_utils::logging::log_iteration;

use crate::coding::save_files;
use crate::{CODING, VERIFICATION, step, unexpected_output};

pub const FAILURE_REPORT_FILE: &str = "verification_failure.json";

const EMPTY_RUN_NOTE: &str = "No tests were collected. The test files are missing, \
misnamed or fail to import.";

/// Runs the harness until it passes, the retry budget runs out or the run is
/// cancelled.
///
/// Every attempt produces one [`IterationRecord`], kept in the context and
/// appended to the store's iteration log when the store is on disk.
pub struct VerificationStage {
    harness: Arc<dyn VerificationHarness>,
}

impl VerificationStage {
    #[must_use]
    pub fn new(harness: Arc<dyn VerificationHarness>) -> Self {
        Self { harness }
    }

    async fn run_harness(&self, ctx: &WorkflowContext) -> Result<HarnessReport, StageError> {
        let artifacts = ctx.store().snapshot()?;
        match self.harness.run(&artifacts).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(harness = self.harness.name(), error = %e, "Harness could not run");
                Ok(HarnessReport::fault(format!("Harness error: {e}")))
            }
        }
    }

    async fn diagnose(&self, ctx: &WorkflowContext, output: &str) -> Result<Diagnosis, StageError> {
        let request = ActionRequest::Diagnose {
            raw_output: output.to_string(),
        };
        match ctx.collaborators().request(&request).await {
            Ok(out) => out
                .into_diagnosis()
                .ok_or_else(|| unexpected_output("diagnose")),
            Err(StageError::Collaborator(e)) => {
                if matches!(e, CollaboratorError::MalformedResponse { .. }) {
                    debug!("Diagnosis was not structured, using harness output");
                } else {
                    warn!(error = %e, "Diagnostic collaborator failed, using harness output");
                }
                Ok(Diagnosis::from_raw(output))
            }
            Err(other) => Err(other),
        }
    }

    /// Ask for a repair and persist it. Returns the stored artifact names.
    async fn repair(
        &self,
        ctx: &WorkflowContext,
        output: &str,
        diagnosis: &Diagnosis,
    ) -> Result<Vec<String>, StageError> {
        let request = ActionRequest::Repair {
            failure_output: output.to_string(),
            diagnosis: diagnosis.clone(),
            code: ctx.store().read_all(Category::Code)?,
            tests: ctx.store().read_all(Category::Tests)?,
        };
        let files = match ctx.collaborators().request(&request).await {
            Ok(out) => out.into_files().ok_or_else(|| unexpected_output("repair"))?,
            Err(StageError::Collaborator(e)) => {
                warn!(error = %e, "Repair failed, retrying without changes");
                return Ok(Vec::new());
            }
            Err(other) => return Err(other),
        };

        let saved = save_files(ctx.store(), &files, classify)?;
        Ok(saved.into_iter().map(|(_, name)| name).collect())
    }

    fn persist(ctx: &mut WorkflowContext, record: IterationRecord) {
        if let Some(log) = IterationLog::for_store(ctx.store())
            && let Err(e) = log.append(&record)
        {
            warn!(path = %log.path().display(), error = %e, "Failed to append iteration log");
        }
        ctx.record_iteration(record);
    }

    fn stopped(
        message: &str,
        state: TerminalState,
        iterations: u32,
        last: Option<&IterationRecord>,
    ) -> StageResult {
        let diagnosis = last
            .and_then(|r| r.diagnosis.as_ref())
            .map_or(Value::Null, |d| json!(d));
        StageResult::failed(message)
            .with_metadata(meta::ITERATIONS, json!(iterations))
            .with_metadata(meta::TERMINAL_STATE, json!(state))
            .with_metadata(meta::LAST_ITERATION, last.map_or(Value::Null, |r| json!(r)))
            .with_metadata(meta::LAST_DIAGNOSIS, diagnosis)
    }
}

#[async_trait]
impl Stage for VerificationStage {
    fn name(&self) -> &str {
        VERIFICATION
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        ctx.succeeded(CODING)
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError> {
        let budget = ctx.config().retry_budget();
        ctx.reset_iteration();
        info!(run_id = ctx.run_id(), budget = %budget, "Verification loop started");

        if budget.is_exhausted(0) {
            info!(run_id = ctx.run_id(), "Retry budget allows no attempts");
            return Ok(Self::stopped(
                "retry budget exhausted",
                TerminalState::ExhaustedBudget,
                0,
                None,
            ));
        }

        loop {
            if ctx.is_cancelled() {
                let iterations = ctx.iteration();
                info!(run_id = ctx.run_id(), iterations, "Verification loop cancelled");
                return Ok(Self::stopped(
                    "cancelled",
                    TerminalState::Aborted,
                    iterations,
                    ctx.iterations().last(),
                ));
            }

            let attempt = ctx.iteration() + 1;
            let report = step!(self.run_harness(ctx).await, "could not snapshot artifacts");
            let verdict = report.verdict();
            log_iteration(
                ctx.run_id(),
                attempt,
                verdict == Verdict::Passed,
                report.stats.total,
                report.stats.failed,
            );

            let mut record = IterationRecord {
                run_id: ctx.run_id().to_string(),
                iteration: attempt,
                timestamp: Utc::now(),
                passed: verdict == Verdict::Passed,
                stats: report.stats,
                output: report.raw_output.clone(),
                diagnosis: None,
                repaired: Vec::new(),
            };

            if verdict == Verdict::Passed {
                Self::persist(ctx, record);
                let iterations = ctx.advance_iteration();
                return Ok(StageResult::success(json!({
                    "iterations": iterations,
                    "total": report.stats.total,
                }))
                .with_metadata(meta::ITERATIONS, json!(iterations))
                .with_metadata(meta::TERMINAL_STATE, json!(TerminalState::Passed)));
            }

            let failure_output = if verdict == Verdict::Empty {
                format!("{}\n\n{EMPTY_RUN_NOTE}", report.raw_output)
            } else {
                report.raw_output
            };

            let diagnosis = self.diagnose(ctx, &failure_output).await?;
            debug!(summary = %diagnosis.summary(), "Diagnosis");

            record.repaired = step!(
                self.repair(ctx, &failure_output, &diagnosis).await,
                "could not apply repair"
            );
            record.diagnosis = Some(diagnosis);
            Self::persist(ctx, record);

            let iterations = ctx.advance_iteration();
            if budget.is_exhausted(iterations) {
                info!(run_id = ctx.run_id(), iterations, "Retry budget exhausted");
                return Ok(Self::stopped(
                    "retry budget exhausted",
                    TerminalState::ExhaustedBudget,
                    iterations,
                    ctx.iterations().last(),
                ));
            }
        }
    }

    fn on_failure(&self, ctx: &WorkflowContext, fault: &StageError) {
        let report = json!({
            "run_id": ctx.run_id(),
            "error": fault.to_string(),
            "iterations": ctx.iteration(),
            "last_iteration": ctx.iterations().last(),
        });
        let body = match serde_json::to_string_pretty(&report) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize verification failure report");
                return;
            }
        };
        if let Err(e) = ctx
            .store()
            .save(Category::Reports, FAILURE_REPORT_FILE, &body)
        {
            warn!(error = %e, "Failed to store verification failure report");
        }
    }
}
