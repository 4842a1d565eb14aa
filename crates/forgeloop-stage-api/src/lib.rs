//! Stage trait system for forgeloop pipelines
//!
//! This crate is the shared contract between the engine and stage
//! implementations: the [`Stage`] trait, the immutable records a run
//! produces ([`StageResult`], [`WorkflowEvent`], [`IterationRecord`]) and the
//! run-scoped [`WorkflowContext`].

mod context;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, IntoStaticStr};

use forgeloop_llm::Diagnosis;
use forgeloop_runner::HarnessStats;
pub use forgeloop_utils::error::StageError;

pub use context::{CancellationFlag, WorkflowContext, new_run_id};

// ============================================================================
// StageResult
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Outcome of one stage execution.
///
/// Fields are private: a result is assembled with the constructors and
/// `with_*` builders before it is handed to the engine, and is read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    status: StageStatus,
    #[serde(default)]
    output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
}

impl StageResult {
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self {
            status: StageStatus::Success,
            output,
            error: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            output: Value::Null,
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            output: Value::Null,
            error: None,
            metadata: Map::new(),
        }
        .with_metadata(meta::REASON, Value::String(reason.into()))
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.status
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == StageStatus::Failed
    }

    #[must_use]
    pub fn output(&self) -> &Value {
        &self.output
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Metadata keys shared between the verification stage and the engine
pub mod meta {
    pub const ITERATIONS: &str = "iterations";
    pub const TERMINAL_STATE: &str = "terminal_state";
    pub const LAST_ITERATION: &str = "last_iteration";
    pub const LAST_DIAGNOSIS: &str = "last_diagnosis";
    pub const REASON: &str = "reason";
}

/// How a verification loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TerminalState {
    Passed,
    ExhaustedBudget,
    Aborted,
}

impl StageResult {
    /// Terminal state recorded by a verification loop, if any
    #[must_use]
    pub fn terminal_state(&self) -> Option<TerminalState> {
        self.metadata_value(meta::TERMINAL_STATE)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Last diagnosis recorded by a verification loop, if any
    #[must_use]
    pub fn last_diagnosis(&self) -> Option<Diagnosis> {
        self.metadata_value(meta::LAST_DIAGNOSIS)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    #[must_use]
    pub fn iterations(&self) -> Option<u32> {
        self.metadata_value(meta::ITERATIONS)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    StageStart,
    StageEnd,
    StageSkipped,
    Error,
    Intervention,
}

/// Lifecycle event. Events are only ever appended to a run's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    /// Position in the run's history, starting at 0
    pub sequence: u64,
    pub event_type: EventType,
    pub stage_name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Iteration records
// ============================================================================

/// One verify/diagnose/repair attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub run_id: String,
    /// 1-based attempt number within the loop
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub passed: bool,
    pub stats: HarnessStats,
    /// Raw harness output
    pub output: String,
    pub diagnosis: Option<Diagnosis>,
    /// Artifacts rewritten by the repair for this attempt
    #[serde(default)]
    pub repaired: Vec<String>,
}

// ============================================================================
// Stage
// ============================================================================

/// A named unit of pipeline work.
///
/// Stages hold no run state; everything a run produces lives in the
/// [`WorkflowContext`].
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identifier, unique within a pipeline
    fn name(&self) -> &str;

    /// Whether the stage should run. Must not have side effects.
    fn can_execute(&self, ctx: &WorkflowContext) -> bool;

    /// Run the stage.
    ///
    /// Expected failures are reported as a failed [`StageResult`]. An `Err`
    /// is a fault the stage could not handle itself.
    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError>;

    /// Called by the engine when `execute` faults, before the fault aborts
    /// the run. Side effects only.
    fn on_failure(&self, _ctx: &WorkflowContext, _fault: &StageError) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_constructors() {
        let ok = StageResult::success(json!({"files": 2}));
        assert!(ok.is_success());
        assert_eq!(ok.output()["files"], 2);
        assert!(ok.error().is_none());

        let failed = StageResult::failed("retry budget exhausted")
            .with_metadata("iterations", json!(3));
        assert!(failed.is_failed());
        assert_eq!(failed.error(), Some("retry budget exhausted"));
        assert_eq!(failed.metadata_value("iterations"), Some(&json!(3)));

        let skipped = StageResult::skipped("precondition not met");
        assert_eq!(skipped.status(), StageStatus::Skipped);
    }

    #[test]
    fn test_verification_metadata_accessors() {
        let diagnosis = Diagnosis {
            error_type: "import-error".into(),
            ..Diagnosis::default()
        };
        let result = StageResult::failed("retry budget exhausted")
            .with_metadata(meta::ITERATIONS, json!(3))
            .with_metadata(meta::TERMINAL_STATE, json!(TerminalState::ExhaustedBudget))
            .with_metadata(meta::LAST_DIAGNOSIS, serde_json::to_value(&diagnosis).unwrap());

        assert_eq!(result.iterations(), Some(3));
        assert_eq!(result.terminal_state(), Some(TerminalState::ExhaustedBudget));
        assert_eq!(result.last_diagnosis().unwrap().error_type, "import-error");
        assert_eq!(StageResult::success(json!(null)).terminal_state(), None);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(StageStatus::Success.to_string(), "success");
        assert_eq!(EventType::StageSkipped.to_string(), "stage_skipped");
        assert_eq!(
            serde_json::to_value(EventType::StageEnd).unwrap(),
            json!("stage_end")
        );
    }

    #[test]
    fn test_iteration_record_wire_shape() {
        let record = IterationRecord {
            run_id: "r1".into(),
            iteration: 1,
            timestamp: Utc::now(),
            passed: false,
            stats: HarnessStats { total: 2, failed: 2 },
            output: "2 failed".into(),
            diagnosis: None,
            repaired: vec!["calc.py".into()],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["stats"]["failed"], 2);
        assert_eq!(json["repaired"][0], "calc.py");
        assert!(json["diagnosis"].is_null());

        let back: IterationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
