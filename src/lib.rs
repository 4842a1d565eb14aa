//! forgeloop - requirement-to-release code generation pipeline
//!
//! A free-text requirement is turned into a tested, packaged Python project by
//! a fixed sequence of stages: requirement analysis, architecture design,
//! coding, verification and packaging. Verification runs the generated tests,
//! asks a diagnostic collaborator what went wrong and has a generation
//! collaborator repair the code, until the tests pass or the retry budget is
//! spent.
//!
//! forgeloop can be used in two ways:
//! - **CLI**: `forgeloop run -r "Build a calculator"`
//! - **Library**: build a [`Pipeline`] from a [`Config`] and run it
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use forgeloop::{Config, PipelineBuilder, RetryBudget};
//!
//! # async fn demo() -> Result<(), forgeloop::ForgeError> {
//! let config = Config::builder()
//!     .artifact_root("workspace")
//!     .max_iterations(RetryBudget::Finite(5))
//!     .build()?;
//! let pipeline = PipelineBuilder::from_config(config).build()?;
//!
//! let mut ctx = pipeline.build_context("Build a calculator with add and subtract")?;
//! let report = pipeline.run(&mut ctx).await?;
//! if let Some(archive) = report.package_path() {
//!     println!("release: {archive}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! The facade re-exports the types most embedders need. Everything else is
//! reachable through the member crates:
//!
//! - [`runner`]: process execution and the verification harness
//! - [`utils`]: errors, exit codes and logging
//! - [`config`]: configuration model and discovery
//! - [`llm`]: collaborators, backends and instruction injection
//! - [`artifacts`]: artifact stores, iteration log and release packaging
//! - [`stage_api`]: the `Stage` trait and run context
//! - [`stages`]: the five pipeline stages
//! - [`engine`]: the workflow engine, policies and reporters

pub mod cli;

pub use forgeloop_artifacts as artifacts;
pub use forgeloop_config as config;
pub use forgeloop_engine as engine;
pub use forgeloop_llm as llm;
pub use forgeloop_runner as runner;
pub use forgeloop_stage_api as stage_api;
pub use forgeloop_stages as stages;
pub use forgeloop_utils as utils;

// ============================================================================
// Stable Public API
// ============================================================================

pub use forgeloop_artifacts::{
    ArtifactStore, Category, FsArtifactStore, IterationLog, MemoryArtifactStore, ReleaseInfo,
};
pub use forgeloop_config::{CliArgs, Config, ConfigBuilder, FailureAction, RetryBudget};
pub use forgeloop_engine::{
    ConsoleReporter, FixedPolicy, InterventionPolicy, Pipeline, PipelineBuilder, Reporter,
    RunFailure, RunReport, RunStatus, TracingReporter, WorkflowEngine,
};
pub use forgeloop_llm::{CollaboratorRegistry, Diagnosis, LlmBackend};
pub use forgeloop_runner::{HarnessReport, HarnessStats, VerificationHarness};
pub use forgeloop_stage_api::{
    EventType, IterationRecord, Stage, StageResult, StageStatus, TerminalState, WorkflowContext,
    WorkflowEvent,
};
pub use forgeloop_utils::{CollaboratorRole, ExitCode, ForgeError, UserFriendlyError};
