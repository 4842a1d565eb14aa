//! The workflow engine: a uniform driver over an ordered list of stages.

use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};

use forgeloop_config::FailureAction;
use forgeloop_stage_api::{EventType, Stage, StageResult, TerminalState, WorkflowContext};
use forgeloop_utils::error::{ConfigError, ForgeError};
use forgeloop_utils::logging::{log_stage_complete, log_stage_error, log_stage_start};

use crate::policy::InterventionPolicy;
use crate::report::{RunFailure, RunReport, RunStatus};
use crate::reporter::Reporter;

/// Runs stages strictly in order against one [`WorkflowContext`].
///
/// For each stage the engine evaluates `can_execute`, emits `stage_start`,
/// executes, records the result and emits `stage_end`. A failed result is
/// handed to the intervention policy (or aborts the run when there is none).
/// A fault escaping a stage runs the stage's `on_failure` hook, is recorded
/// as a failed result and aborts the run.
pub struct WorkflowEngine {
    stages: Vec<Box<dyn Stage>>,
    policy: Option<Box<dyn InterventionPolicy>>,
    reporters: Vec<Box<dyn Reporter>>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("stages", &self.stage_names())
            .field("policy", &self.policy.is_some())
            .field("reporters", &self.reporters.len())
            .finish()
    }
}

impl WorkflowEngine {
    /// # Errors
    ///
    /// `ConfigError::InvalidStageRegistration` for an empty stage list, an
    /// empty stage name or a duplicate name.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::InvalidStageRegistration {
                reason: "no stages registered".to_string(),
            });
        }
        let mut seen = BTreeSet::new();
        for stage in &stages {
            let name = stage.name();
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidStageRegistration {
                    reason: "stage with an empty name".to_string(),
                });
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::InvalidStageRegistration {
                    reason: format!("duplicate stage name '{name}'"),
                });
            }
        }
        Ok(Self {
            stages,
            policy: None,
            reporters: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Box<dyn InterventionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Drive every stage over `ctx`.
    ///
    /// Stage failures end up in the returned report; `Err` is reserved for
    /// faults that escaped a stage. Either way the full event history stays
    /// in `ctx`.
    ///
    /// # Errors
    ///
    /// `ForgeError::Stage` when a stage's `execute` returns an error.
    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<RunReport, ForgeError> {
        let started = Instant::now();
        let mut output = Value::Null;
        let mut skipped_failures = Vec::new();

        for stage in &self.stages {
            let name = stage.name();

            if !stage.can_execute(ctx) {
                debug!(stage = name, "Precondition not met, skipping");
                self.emit(ctx, EventType::StageSkipped, name, json!({}));
                continue;
            }

            let mut attempt = 1u32;
            let (result, decision) = loop {
                let result = self.execute_stage(stage.as_ref(), ctx).await?;
                if !result.is_failed() || Self::was_cancelled(&result, ctx) {
                    break (result, None);
                }
                let Some(decision) = self.decide(name, &result, attempt) else {
                    break (result, Some(FailureAction::Abort));
                };
                self.emit(
                    ctx,
                    EventType::Intervention,
                    name,
                    json!({ "decision": decision, "attempt": attempt }),
                );
                if decision == FailureAction::Retry {
                    attempt += 1;
                    continue;
                }
                break (result, Some(decision));
            };

            if !result.is_failed() {
                if result.is_success() {
                    output = result.output().clone();
                }
                continue;
            }

            let failure = RunFailure {
                stage: name.to_string(),
                message: result.error().unwrap_or("stage failed").to_string(),
                diagnosis: result.last_diagnosis(),
                iterations: result.iterations().unwrap_or_else(|| ctx.iteration()),
            };
            match decision {
                None => {
                    return Ok(self.finish(
                        ctx,
                        RunStatus::Cancelled,
                        output,
                        Some(failure),
                        skipped_failures,
                        started,
                    ));
                }
                Some(FailureAction::Skip) => {
                    warn!(stage = name, "Stage failed, continuing per intervention policy");
                    skipped_failures.push(name.to_string());
                }
                Some(_) => {
                    return Ok(self.finish(
                        ctx,
                        RunStatus::Error,
                        output,
                        Some(failure),
                        skipped_failures,
                        started,
                    ));
                }
            }
        }

        Ok(self.finish(ctx, RunStatus::Success, output, None, skipped_failures, started))
    }

    fn was_cancelled(result: &StageResult, ctx: &WorkflowContext) -> bool {
        ctx.is_cancelled() || result.terminal_state() == Some(TerminalState::Aborted)
    }

    async fn execute_stage(
        &self,
        stage: &dyn Stage,
        ctx: &mut WorkflowContext,
    ) -> Result<StageResult, ForgeError> {
        let name = stage.name();
        log_stage_start(ctx.run_id(), name);
        self.emit(ctx, EventType::StageStart, name, json!({}));
        let started = Instant::now();

        match stage.execute(ctx).await {
            Ok(result) => {
                let status: &'static str = result.status().into();
                log_stage_complete(ctx.run_id(), name, status, started.elapsed().as_millis());
                ctx.record_result(name, result.clone());
                let payload = serde_json::to_value(&result).unwrap_or(Value::Null);
                self.emit(ctx, EventType::StageEnd, name, payload);
                Ok(result)
            }
            Err(fault) => {
                let message = fault.to_string();
                log_stage_error(ctx.run_id(), name, &message, started.elapsed().as_millis());
                stage.on_failure(ctx, &fault);

                let failed = StageResult::failed(message.clone());
                ctx.record_result(name, failed.clone());
                self.emit(ctx, EventType::Error, name, json!({ "error": message }));
                let payload = serde_json::to_value(&failed).unwrap_or(Value::Null);
                self.emit(ctx, EventType::StageEnd, name, payload);
                Err(ForgeError::Stage {
                    stage: name.to_string(),
                    source: fault,
                })
            }
        }
    }

    /// Policy decision for a failed stage; `None` when no policy is installed.
    fn decide(&self, stage: &str, result: &StageResult, attempt: u32) -> Option<FailureAction> {
        let decision = match self.policy.as_ref()?.decide(stage, result, attempt) {
            FailureAction::Retry if attempt > 1 => FailureAction::Abort,
            other => other,
        };
        Some(decision)
    }

    fn emit(&self, ctx: &mut WorkflowContext, event_type: EventType, stage: &str, payload: Value) {
        let event = ctx.emit(event_type, stage, payload);
        for reporter in &self.reporters {
            if let Err(e) = reporter.on_event(event) {
                warn!(error = %e, "Reporter failed to handle event");
            }
        }
    }

    fn finish(
        &self,
        ctx: &WorkflowContext,
        status: RunStatus,
        output: Value,
        error: Option<RunFailure>,
        skipped_failures: Vec<String>,
        started: Instant,
    ) -> RunReport {
        let report = RunReport {
            run_id: ctx.run_id().to_string(),
            status,
            output,
            error,
            skipped_failures,
            events: ctx.events().to_vec(),
            iterations: ctx.iterations().to_vec(),
            duration: started.elapsed(),
        };
        for reporter in &self.reporters {
            if let Err(e) = reporter.on_complete(&report) {
                warn!(error = %e, "Reporter failed to handle run completion");
            }
        }
        report
    }
}
