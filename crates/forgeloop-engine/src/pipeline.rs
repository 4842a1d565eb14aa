//! Assembles a runnable pipeline from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use forgeloop_artifacts::{ArtifactStore, FsArtifactStore, ensure_runs_dir};
use forgeloop_config::Config;
use forgeloop_llm::{CollaboratorRegistry, LlmBackend};
use forgeloop_runner::{PytestHarness, TokioRunner, VerificationHarness};
use forgeloop_stage_api::{WorkflowContext, new_run_id};
use forgeloop_stages::default_stages;
use forgeloop_utils::error::ForgeError;

use crate::engine::WorkflowEngine;
use crate::policy::FixedPolicy;
use crate::report::RunReport;
use crate::reporter::Reporter;

/// Builder for a [`Pipeline`].
///
/// Every collaborator, the store and the harness come from the
/// configuration unless overridden. Without a store override each run opens
/// its own store under `<artifacts.root>/runs/<run_id>`.
pub struct PipelineBuilder {
    config: Config,
    backend: Option<Arc<dyn LlmBackend>>,
    harness: Option<Arc<dyn VerificationHarness>>,
    store: Option<Arc<dyn ArtifactStore>>,
    reporters: Vec<Box<dyn Reporter>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            backend: None,
            harness: None,
            store: None,
            reporters: Vec::new(),
        }
    }

    /// Route every role through one backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    #[must_use]
    pub fn with_harness(mut self, harness: Arc<dyn VerificationHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    /// Use one caller-owned store for every run of the pipeline.
    ///
    /// Runs then see each other's artifacts; scoping the store is up to the
    /// caller.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// # Errors
    ///
    /// Configuration errors, unsupported providers and an artifact root that
    /// cannot be created.
    pub fn build(self) -> Result<Pipeline, ForgeError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let collaborators = match self.backend {
            Some(backend) => CollaboratorRegistry::with_shared_backend(&config, backend),
            None => CollaboratorRegistry::from_config(&config)?,
        };

        let store = match self.store {
            Some(store) => StoreScope::Shared(store),
            None => {
                ensure_runs_dir(&config.artifacts.root)?;
                StoreScope::PerRun(config.artifacts.root.clone())
            }
        };

        let harness: Arc<dyn VerificationHarness> = match self.harness {
            Some(harness) => harness,
            None => Arc::new(
                PytestHarness::new()
                    .with_command(config.harness.program.clone(), config.harness.args.clone())
                    .with_timeout(config.harness_timeout())
                    .with_runner(Arc::new(
                        TokioRunner::new().with_output_cap(config.harness.output_cap_bytes),
                    )),
            ),
        };

        let mut engine = WorkflowEngine::new(default_stages(harness))?
            .with_policy(Box::new(FixedPolicy::from_config(&config)));
        for reporter in self.reporters {
            engine = engine.with_reporter(reporter);
        }

        info!(
            stages = ?engine.stage_names(),
            budget = %config.retry_budget(),
            on_failure = %config.workflow.on_failure,
            "Pipeline assembled"
        );

        Ok(Pipeline {
            engine,
            collaborators,
            store,
            config,
        })
    }
}

/// Where the runs of a pipeline keep their artifacts.
enum StoreScope {
    /// A fresh filesystem store per run under `<root>/runs/<run_id>`.
    PerRun(PathBuf),
    Shared(Arc<dyn ArtifactStore>),
}

/// Engine plus the shared resources every run of it uses.
pub struct Pipeline {
    engine: WorkflowEngine,
    collaborators: CollaboratorRegistry,
    store: StoreScope,
    config: Arc<Config>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("roles", &self.collaborators.roles())
            .field("artifact_root", &self.artifact_root())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Fresh context for one run: new run id, iteration 0, empty history
    /// and, unless a shared store was installed, an empty store of its own.
    ///
    /// # Errors
    ///
    /// The run's store directory cannot be created.
    pub fn build_context(
        &self,
        request: impl Into<String>,
    ) -> Result<WorkflowContext, ForgeError> {
        let run_id = new_run_id();
        let store: Arc<dyn ArtifactStore> = match &self.store {
            StoreScope::PerRun(root) => {
                let store = FsArtifactStore::open_run(root, &run_id)?;
                debug!(run_id = %run_id, root = %store.utf8_root(), "Opened run store");
                Arc::new(store)
            }
            StoreScope::Shared(store) => store.clone(),
        };
        Ok(WorkflowContext::for_run(
            run_id,
            request,
            store,
            self.collaborators.clone(),
            self.config.clone(),
        ))
    }

    /// # Errors
    ///
    /// See [`WorkflowEngine::run`].
    pub async fn run(&self, ctx: &mut WorkflowContext) -> Result<RunReport, ForgeError> {
        self.engine.run(ctx).await
    }

    #[must_use]
    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    /// Shared with every context built by this pipeline; injecting here
    /// reaches runs in progress.
    #[must_use]
    pub fn collaborators(&self) -> &CollaboratorRegistry {
        &self.collaborators
    }

    /// Directory holding `runs/`; `None` when a shared store was installed.
    #[must_use]
    pub fn artifact_root(&self) -> Option<&Path> {
        match &self.store {
            StoreScope::PerRun(root) => Some(root.as_path()),
            StoreScope::Shared(_) => None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
