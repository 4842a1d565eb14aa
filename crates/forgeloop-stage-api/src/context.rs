//! Run-scoped mutable state shared by the stages of one pipeline run.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use forgeloop_artifacts::ArtifactStore;
use forgeloop_config::Config;
use forgeloop_llm::CollaboratorRegistry;

use crate::{EventType, IterationRecord, StageResult, WorkflowEvent};

/// Distinguishes contexts created within the same millisecond
static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Cooperative cancellation flag.
///
/// Clones share the flag. Setting it never interrupts work in flight; the
/// verification loop checks it at iteration boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State for exactly one pipeline run.
pub struct WorkflowContext {
    run_id: String,
    request: String,
    started_at: DateTime<Utc>,
    store: Arc<dyn ArtifactStore>,
    collaborators: CollaboratorRegistry,
    config: Arc<Config>,
    results: BTreeMap<String, StageResult>,
    events: Vec<WorkflowEvent>,
    iteration: u32,
    iterations: Vec<IterationRecord>,
    cancel: CancellationFlag,
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("run_id", &self.run_id)
            .field("iteration", &self.iteration)
            .field("events", &self.events.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Fresh run identifier: UTC start time plus a process-wide sequence number.
///
/// Identifiers sort in creation order and are valid single path components.
#[must_use]
pub fn new_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("run-%Y%m%dT%H%M%S%3fZ"),
        RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

impl WorkflowContext {
    #[must_use]
    pub fn new(
        request: impl Into<String>,
        store: Arc<dyn ArtifactStore>,
        collaborators: CollaboratorRegistry,
        config: Arc<Config>,
    ) -> Self {
        Self::for_run(new_run_id(), request, store, collaborators, config)
    }

    /// Context for a run whose id was chosen up front, typically because the
    /// store was already opened under that id.
    #[must_use]
    pub fn for_run(
        run_id: impl Into<String>,
        request: impl Into<String>,
        store: Arc<dyn ArtifactStore>,
        collaborators: CollaboratorRegistry,
        config: Arc<Config>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            request: request.into(),
            started_at: Utc::now(),
            store,
            collaborators,
            config,
            results: BTreeMap::new(),
            events: Vec::new(),
            iteration: 0,
            iterations: Vec::new(),
            cancel: CancellationFlag::new(),
        }
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl-C handler).
    #[must_use]
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = flag;
        self
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn request(&self) -> &str {
        &self.request
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn collaborators(&self) -> &CollaboratorRegistry {
        &self.collaborators
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ------------------------------------------------------------------
    // Stage results
    // ------------------------------------------------------------------

    /// Store the result of a stage execution, replacing the result of an
    /// earlier execution of the same stage.
    pub fn record_result(&mut self, stage: &str, result: StageResult) {
        self.results.insert(stage.to_string(), result);
    }

    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.get(stage)
    }

    #[must_use]
    pub fn succeeded(&self, stage: &str) -> bool {
        self.result(stage).is_some_and(StageResult::is_success)
    }

    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, StageResult> {
        &self.results
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn emit(&mut self, event_type: EventType, stage: &str, payload: Value) -> &WorkflowEvent {
        let sequence = self.events.len() as u64;
        self.events.push(WorkflowEvent {
            sequence,
            event_type,
            stage_name: stage.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        &self.events[self.events.len() - 1]
    }

    #[must_use]
    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    // ------------------------------------------------------------------
    // Iterations
    // ------------------------------------------------------------------

    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Reset the counter at the start of a verification loop.
    pub fn reset_iteration(&mut self) {
        self.iteration = 0;
    }

    /// Increment the counter and return the new value.
    pub fn advance_iteration(&mut self) -> u32 {
        self.iteration = self.iteration.saturating_add(1);
        self.iteration
    }

    pub fn record_iteration(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    #[must_use]
    pub fn iterations(&self) -> &[IterationRecord] {
        &self.iterations
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    #[must_use]
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
