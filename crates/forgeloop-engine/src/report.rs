//! Run outcome returned by [`WorkflowEngine::run`](crate::WorkflowEngine::run).

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use strum::Display;

use forgeloop_llm::Diagnosis;
use forgeloop_stage_api::{IterationRecord, WorkflowEvent};
use forgeloop_utils::error::ForgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Cancelled,
}

/// Why a run did not succeed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunFailure {
    pub stage: String,
    pub message: String,
    pub diagnosis: Option<Diagnosis>,
    /// Verification iterations reached when the run stopped
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Output of the last stage that succeeded
    pub output: Value,
    pub error: Option<RunFailure>,
    /// Stages that failed but were skipped by the intervention policy
    pub skipped_failures: Vec<String>,
    pub events: Vec<WorkflowEvent>,
    pub iterations: Vec<IterationRecord>,
    pub duration: Duration,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Path of the packaged archive, when packaging ran.
    #[must_use]
    pub fn package_path(&self) -> Option<&str> {
        self.output.get("package_path").and_then(Value::as_str)
    }

    /// The run's failure as an error, `None` on success.
    #[must_use]
    pub fn to_error(&self) -> Option<ForgeError> {
        let failure = self.error.as_ref()?;
        match self.status {
            RunStatus::Success => None,
            RunStatus::Cancelled => Some(ForgeError::Cancelled {
                stage: failure.stage.clone(),
                iterations: failure.iterations,
            }),
            RunStatus::Error => Some(ForgeError::StageAborted {
                stage: failure.stage.clone(),
                message: failure.message.clone(),
                iterations: failure.iterations,
                diagnosis: failure.diagnosis.as_ref().map(Diagnosis::summary),
            }),
        }
    }
}
