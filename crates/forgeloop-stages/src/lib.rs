//! Concrete implementations of the pipeline stages
//!
//! The default pipeline is requirement analysis → architecture design →
//! coding → verification → packaging. Each stage runs only when its
//! predecessor succeeded.

mod coding;
mod documents;
mod packaging;
mod verification;

use std::sync::Arc;

use forgeloop_runner::VerificationHarness;
use forgeloop_stage_api::{Stage, StageError, StageResult};

pub use coding::CodingStage;
pub use documents::{ArchitectureDesignStage, RequirementAnalysisStage};
pub use packaging::PackagingStage;
pub use verification::VerificationStage;

pub const REQUIREMENT_ANALYSIS: &str = "requirement_analysis";
pub const ARCHITECTURE_DESIGN: &str = "architecture_design";
pub const CODING: &str = "coding";
pub const VERIFICATION: &str = "verification";
pub const PACKAGING: &str = "packaging";

pub const REQUIREMENTS_FILE: &str = "requirements.md";
pub const DESIGN_FILE: &str = "architecture.md";
pub const REVIEW_FILE: &str = "code_review.json";

/// The five stages in pipeline order.
#[must_use]
pub fn default_stages(harness: Arc<dyn VerificationHarness>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(RequirementAnalysisStage::new()),
        Box::new(ArchitectureDesignStage::new()),
        Box::new(CodingStage::new()),
        Box::new(VerificationStage::new(harness)),
        Box::new(PackagingStage::new()),
    ]
}

/// Turn a collaborator or artifact fault into a failed result; anything
/// else (configuration faults, internal errors) stays a fault.
pub(crate) fn recover_fault(err: StageError, what: &str) -> Result<StageResult, StageError> {
    match err {
        StageError::Collaborator(e) => Ok(StageResult::failed(format!("{what}: {e}"))),
        StageError::Artifact(e) => Ok(StageResult::failed(format!("{what}: {e}"))),
        other => Err(other),
    }
}

/// Unwrap a step, returning a failed result for recoverable faults.
macro_rules! step {
    ($expr:expr, $what:expr) => {
        match $expr {
            Ok(value) => value,
            Err(e) => return $crate::recover_fault(e.into(), $what),
        }
    };
}
pub(crate) use step;

pub(crate) fn unexpected_output(action: &str) -> StageError {
    StageError::Internal(format!("unexpected output shape for {action}"))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use forgeloop_artifacts::{ArtifactStore, MemoryArtifactStore};
    use forgeloop_config::Config;
    use forgeloop_llm::CollaboratorRegistry;
    use forgeloop_llm::testing::{ScriptedBackend, scripted_collaborator};
    use forgeloop_stage_api::WorkflowContext;
    use forgeloop_utils::types::CollaboratorRole;

    pub struct Backends {
        pub architect: Arc<ScriptedBackend>,
        pub developer: Arc<ScriptedBackend>,
        pub qa: Arc<ScriptedBackend>,
    }

    impl Backends {
        pub fn new() -> Self {
            Self {
                architect: Arc::new(ScriptedBackend::default()),
                developer: Arc::new(ScriptedBackend::default()),
                qa: Arc::new(ScriptedBackend::default()),
            }
        }

        pub fn registry(&self) -> CollaboratorRegistry {
            CollaboratorRegistry::new()
                .with_collaborator(scripted_collaborator(
                    CollaboratorRole::Architect,
                    self.architect.clone(),
                ))
                .with_collaborator(scripted_collaborator(
                    CollaboratorRole::Developer,
                    self.developer.clone(),
                ))
                .with_collaborator(scripted_collaborator(CollaboratorRole::Qa, self.qa.clone()))
        }
    }

    pub fn context(
        backends: &Backends,
        store: Arc<dyn ArtifactStore>,
        config: Config,
    ) -> WorkflowContext {
        WorkflowContext::new(
            "Build a calculator with add and subtract",
            store,
            backends.registry(),
            Arc::new(config),
        )
        .with_run_id("test-run")
    }

    pub fn memory_context(backends: &Backends) -> WorkflowContext {
        context(backends, Arc::new(MemoryArtifactStore::new()), Config::default())
    }
}
