use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString, IntoStaticStr};

use forgeloop_utils::types::{CollaboratorRole, ConfigSource};

/// Providers a collaborator can be bound to
pub const KNOWN_PROVIDERS: &[&str] = &["ollama", "openai"];

/// Stage names of the default pipeline, in execution order
pub const STAGE_NAMES: &[&str] = &[
    "requirement_analysis",
    "architecture_design",
    "coding",
    "verification",
    "packaging",
];

pub(crate) const DEFAULT_MAX_ITERATIONS: u32 = 3;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub(crate) const DEFAULT_HARNESS_TIMEOUT_SECS: u64 = 60;
pub(crate) const DEFAULT_OUTPUT_CAP_BYTES: usize = 256 * 1024;

// ============================================================================
// Retry budget
// ============================================================================

/// Maximum number of verify → diagnose → repair cycles.
///
/// Deserialises from a non-negative integer or the string `"unbounded"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryBudget {
    Finite(u32),
    Unbounded,
}

impl RetryBudget {
    /// Whether `iterations` completed cycles use up the budget.
    #[must_use]
    pub fn is_exhausted(self, iterations: u32) -> bool {
        match self {
            Self::Finite(max) => iterations >= max,
            Self::Unbounded => false,
        }
    }

    #[must_use]
    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::Finite(DEFAULT_MAX_ITERATIONS)
    }
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl FromStr for RetryBudget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unbounded") {
            return Ok(Self::Unbounded);
        }
        trimmed
            .parse::<u32>()
            .map(Self::Finite)
            .map_err(|_| format!("expected a non-negative integer or \"unbounded\", got '{s}'"))
    }
}

impl Serialize for RetryBudget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Finite(n) => serializer.serialize_u32(*n),
            Self::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for RetryBudget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BudgetVisitor;

        impl Visitor<'_> for BudgetVisitor {
            type Value = RetryBudget;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or \"unbounded\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RetryBudget, E> {
                u32::try_from(v)
                    .map(RetryBudget::Finite)
                    .map_err(|_| E::custom(format!("max_iterations {v} is too large")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RetryBudget, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom("max_iterations must not be negative"))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RetryBudget, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(BudgetVisitor)
    }
}

// ============================================================================
// Failure action
// ============================================================================

/// What the engine does when a stage fails
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FailureAction {
    /// End the run with status `error`
    #[default]
    Abort,
    /// Continue with the next stage
    Skip,
    /// Re-invoke the failed stage once
    Retry,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowConfig {
    pub max_iterations: RetryBudget,
    pub on_failure: FailureAction,
    pub stage_overrides: BTreeMap<String, FailureAction>,
    pub request_timeout_secs: u64,
    /// Ask the qa collaborator for an advisory review after coding
    pub review_code: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: RetryBudget::default(),
            on_failure: FailureAction::Abort,
            stage_overrides: BTreeMap::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            review_code: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DebugConfig {
    /// Unbounded retry budget
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactsConfig {
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspace"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub output_cap_bytes: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            args: ["-m", "pytest", "-v", "--tb=short"]
                .into_iter()
                .map(String::from)
                .collect(),
            timeout_secs: DEFAULT_HARNESS_TIMEOUT_SECS,
            output_cap_bytes: DEFAULT_OUTPUT_CAP_BYTES,
        }
    }
}

/// Per-role overrides under `[collaborators.<role>]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub provider: Option<String>,
    pub host: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// Environment variable holding the API key (openai provider)
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorsConfig {
    pub provider: String,
    pub host: String,
    pub model: String,
    pub architect: RoleConfig,
    pub developer: RoleConfig,
    pub qa: RoleConfig,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            host: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            architect: RoleConfig::default(),
            developer: RoleConfig::default(),
            qa: RoleConfig::default(),
        }
    }
}

impl CollaboratorsConfig {
    #[must_use]
    pub fn role(&self, role: CollaboratorRole) -> &RoleConfig {
        match role {
            CollaboratorRole::Architect => &self.architect,
            CollaboratorRole::Developer => &self.developer,
            CollaboratorRole::Qa => &self.qa,
        }
    }

    pub(crate) fn role_mut(&mut self, role: CollaboratorRole) -> &mut RoleConfig {
        match role {
            CollaboratorRole::Architect => &mut self.architect,
            CollaboratorRole::Developer => &mut self.developer,
            CollaboratorRole::Qa => &mut self.qa,
        }
    }
}

/// Seed directives injected before a run starts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstructionsConfig {
    #[serde(default)]
    pub architect: Vec<String>,
    #[serde(default)]
    pub developer: Vec<String>,
    #[serde(default)]
    pub qa: Vec<String>,
}

impl InstructionsConfig {
    #[must_use]
    pub fn for_role(&self, role: CollaboratorRole) -> &[String] {
        match role {
            CollaboratorRole::Architect => &self.architect,
            CollaboratorRole::Developer => &self.developer,
            CollaboratorRole::Qa => &self.qa,
        }
    }

    pub(crate) fn for_role_mut(&mut self, role: CollaboratorRole) -> &mut Vec<String> {
        match role {
            CollaboratorRole::Architect => &mut self.architect,
            CollaboratorRole::Developer => &mut self.developer,
            CollaboratorRole::Qa => &mut self.qa,
        }
    }
}

/// A role's fully resolved endpoint binding
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorBinding {
    pub role: CollaboratorRole,
    pub provider: String,
    pub host: String,
    pub model: String,
    pub temperature: f32,
    pub api_key_env: Option<String>,
    pub request_timeout: Duration,
}

// ============================================================================
// Config
// ============================================================================

/// Configuration for forgeloop runs.
///
/// Build one with [`Config::discover()`] for CLI semantics, or
/// [`Config::builder()`] for deterministic programmatic use.
///
/// # Configuration File Format
///
/// ```toml
/// [workflow]
/// max_iterations = 5          # or "unbounded"
/// on_failure = "abort"        # abort | skip | retry
/// request_timeout_secs = 300
///
/// [workflow.stage_overrides]
/// packaging = "skip"
///
/// [artifacts]
/// root = "workspace"
///
/// [collaborators]
/// provider = "ollama"
/// host = "http://localhost:11434"
/// model = "qwen2.5-coder:7b"
///
/// [collaborators.qa]
/// temperature = 0.4
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub workflow: WorkflowConfig,
    pub debug: DebugConfig,
    pub artifacts: ArtifactsConfig,
    pub harness: HarnessConfig,
    pub collaborators: CollaboratorsConfig,
    pub instructions: InstructionsConfig,
    /// Source attribution for each setting (for `forgeloop config`)
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Effective retry budget: unbounded in debug mode.
    #[must_use]
    pub fn retry_budget(&self) -> RetryBudget {
        if self.debug.enabled {
            RetryBudget::Unbounded
        } else {
            self.workflow.max_iterations
        }
    }

    /// Failure action for a stage, honouring per-stage overrides.
    #[must_use]
    pub fn failure_action_for(&self, stage: &str) -> FailureAction {
        self.workflow
            .stage_overrides
            .get(stage)
            .copied()
            .unwrap_or(self.workflow.on_failure)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow.request_timeout_secs)
    }

    #[must_use]
    pub fn harness_timeout(&self) -> Duration {
        Duration::from_secs(self.harness.timeout_secs)
    }

    /// Resolve the endpoint binding for a role: role table over section defaults.
    #[must_use]
    pub fn collaborator(&self, role: CollaboratorRole) -> CollaboratorBinding {
        let section = &self.collaborators;
        let table = section.role(role);
        CollaboratorBinding {
            role,
            provider: table
                .provider
                .clone()
                .unwrap_or_else(|| section.provider.clone()),
            host: table.host.clone().unwrap_or_else(|| section.host.clone()),
            model: table.model.clone().unwrap_or_else(|| section.model.clone()),
            temperature: table
                .temperature
                .unwrap_or_else(|| role.default_temperature()),
            api_key_env: table.api_key_env.clone(),
            request_timeout: self.request_timeout(),
        }
    }
}

/// CLI-level overrides (highest precedence)
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit configuration file; disables discovery
    pub config_path: Option<PathBuf>,
    pub max_iterations: Option<RetryBudget>,
    pub debug: Option<bool>,
    pub artifact_root: Option<PathBuf>,
    pub on_failure: Option<FailureAction>,
    pub provider: Option<String>,
    pub model: Option<String>,
}
