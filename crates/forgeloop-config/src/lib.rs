//! Configuration for forgeloop runs
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > file > defaults. Files are TOML
//! (`.forgeloop/config.toml`, found by upward search) or YAML when passed
//! explicitly.

mod builder;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use model::{
    ArtifactsConfig, CliArgs, CollaboratorBinding, CollaboratorsConfig, Config, DebugConfig,
    FailureAction, HarnessConfig, InstructionsConfig, KNOWN_PROVIDERS, RetryBudget, RoleConfig,
    STAGE_NAMES, WorkflowConfig,
};
pub use forgeloop_utils::types::ConfigSource;

/// Environment variable overriding `[collaborators] provider`
pub const ENV_PROVIDER: &str = "FORGELOOP_PROVIDER";

/// Environment variable overriding `[workflow] max_iterations`
pub const ENV_MAX_ITERATIONS: &str = "FORGELOOP_MAX_ITERATIONS";
