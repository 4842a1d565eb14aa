use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub use forgeloop_runner::RunnerError;

/// Library-level error type with user-facing rendering.
///
/// `ForgeError` is what a pipeline run returns when it cannot finish with
/// success. It carries enough detail to print which stage failed, the last
/// diagnosis and the iteration count reached, and maps onto process exit
/// codes through [`to_exit_code()`](Self::to_exit_code).
///
/// # Error Categories
///
/// | Variant | Meaning | Retried? |
/// |---------|---------|----------|
/// | `Config` | Bad configuration, unregistered action, missing binding | never |
/// | `Collaborator` | A generation/diagnostic endpoint failed | only by the repair loop's next iteration |
/// | `StageAborted` | A stage returned `failed` and the run was aborted | per intervention policy |
/// | `Stage` | A fault escaped a stage | never |
/// | `Cancelled` | Cooperative cancellation was requested | n/a |
///
/// # Example
///
/// ```rust
/// use forgeloop_utils::error::{ConfigError, ForgeError};
/// use forgeloop_utils::exit_codes::ExitCode;
///
/// let err = ForgeError::Config(ConfigError::MissingRequired("artifacts.root".into()));
/// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
/// assert!(err.display_for_user().contains("Suggestions:"));
/// ```
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Stage '{stage}' faulted: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Stage '{stage}' failed after {iterations} iteration(s): {message}")]
    StageAborted {
        stage: String,
        message: String,
        iterations: u32,
        diagnosis: Option<String>,
    },

    #[error("Run cancelled during stage '{stage}' after {iterations} iteration(s)")]
    Cancelled { stage: String, iterations: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for grouping in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    StageExecution,
    Collaborator,
    Verification,
    FileSystem,
    Cancellation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::StageExecution => write!(f, "Stage Execution"),
            Self::Collaborator => write!(f, "Collaborator"),
            Self::Verification => write!(f, "Verification"),
            Self::FileSystem => write!(f, "File System"),
            Self::Cancellation => write!(f, "Cancellation"),
        }
    }
}

// ============================================================================
// ConfigError
// ============================================================================

/// Configuration errors. Always fatal: a run never retries them.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Action '{action}' is not registered for role '{role}'")]
    UnregisteredAction { role: String, action: String },

    #[error("No collaborator bound for role '{role}'")]
    MissingCollaborator { role: String },

    #[error("Artifact store has no filesystem root")]
    MissingArtifactRoot,

    #[error("Invalid stage registration: {reason}")]
    InvalidStageRegistration { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file has invalid format: {reason}"),
            Self::MissingRequired(key) => format!("Required configuration '{key}' is missing"),
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::UnregisteredAction { role, action } => {
                format!("The {role} collaborator has no action named '{action}'")
            }
            Self::MissingCollaborator { role } => {
                format!("No collaborator is configured for the {role} role")
            }
            Self::MissingArtifactRoot => {
                "This operation needs an artifact store backed by a directory".to_string()
            }
            Self::InvalidStageRegistration { reason } => {
                format!("The pipeline's stage list is invalid: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files are TOML (.forgeloop/config.toml) or YAML when passed with --config."
                    .to_string(),
            ),
            Self::UnregisteredAction { .. } => Some(
                "Each role owns a fixed set of actions: architect (analyze-requirement, produce-design), \
                 developer (implement, write-tests, repair), qa (diagnose, review-code)."
                    .to_string(),
            ),
            Self::MissingCollaborator { .. } => Some(
                "Stages look up collaborators by role in the run's registry.".to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' option has specific format requirements."
            )),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the file for syntax errors".to_string(),
                "Run 'forgeloop config' to see the effective configuration".to_string(),
            ],
            Self::MissingRequired(key) => vec![format!("Set '{key}' in the configuration file")],
            Self::InvalidValue { key, .. } => vec![
                format!("Fix the value of '{key}'"),
                "Remove the key to fall back to its default".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Check the --config path".to_string(),
                "Omit --config to use discovery of .forgeloop/config.toml".to_string(),
            ],
            Self::DiscoveryFailed { .. } => {
                vec!["Pass an explicit configuration file with --config".to_string()]
            }
            Self::UnregisteredAction { role, .. } => {
                vec![format!("Use one of the actions owned by the {role} role")]
            }
            Self::MissingCollaborator { role } => vec![format!(
                "Add a [collaborators.{role}] section or a [collaborators] default"
            )],
            Self::MissingArtifactRoot => {
                vec!["Set [artifacts] root or pass --artifact-root".to_string()]
            }
            Self::InvalidStageRegistration { .. } => {
                vec!["Give every stage a unique, non-empty name".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

// ============================================================================
// CollaboratorError
// ============================================================================

/// Errors raised by generation and diagnostic collaborators
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The endpoint could not be reached (connection refused, DNS, TLS)
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Quota or rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider-side failure (5xx)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// The request exceeded its timeout
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The response could not be parsed into the expected shape.
    ///
    /// Callers are expected to recover from this locally; `raw` holds the
    /// unparsed text for fallback handling.
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl CollaboratorError {
    /// Whether this failure means the endpoint could not serve the request.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::ProviderOutage(_) | Self::Timeout { .. }
        )
    }

    #[must_use]
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

impl UserFriendlyError for CollaboratorError {
    fn user_message(&self) -> String {
        match self {
            Self::Unavailable(msg) => format!("Collaborator endpoint unreachable: {msg}"),
            Self::ProviderAuth(msg) => format!("Provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("Provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Provider service outage: {msg}"),
            Self::Timeout { duration } => format!("Collaborator request timed out after {duration:?}"),
            Self::MalformedResponse { reason, .. } => {
                format!("Collaborator response could not be parsed: {reason}")
            }
            Self::Misconfiguration(msg) => format!("Collaborator configuration error: {msg}"),
            Self::Unsupported(msg) => format!("Not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Unavailable(_) => Some(
                "The model host did not accept the connection.".to_string(),
            ),
            Self::Timeout { .. } => Some(
                "Every collaborator request is bounded by workflow.request_timeout_secs."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Unavailable(_) | Self::ProviderOutage(_) => vec![
                "Check that the model host is running (e.g. 'ollama serve')".to_string(),
                "Verify [collaborators] host in the configuration".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set".to_string(),
            ],
            Self::ProviderQuota(_) => vec!["Wait a few minutes and try again".to_string()],
            Self::Timeout { .. } => vec![
                "Increase workflow.request_timeout_secs".to_string(),
                "Use a smaller or faster model".to_string(),
            ],
            Self::MalformedResponse { .. } => vec![
                "Try a model that follows formatting instructions more closely".to_string(),
            ],
            Self::Misconfiguration(_) | Self::Unsupported(_) => vec![
                "Review the [collaborators] section of the configuration".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) | Self::ProviderAuth(_) => {
                ErrorCategory::Configuration
            }
            _ => ErrorCategory::Collaborator,
        }
    }
}

// ============================================================================
// ArtifactError
// ============================================================================

/// Errors raised by artifact stores and release packaging
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid artifact name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Artifact '{name}' not found in category '{category}'")]
    NotFound { category: String, name: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl ArtifactError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl UserFriendlyError for ArtifactError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidName { .. } => Some(
                "Artifact names are flat file names; directory prefixes are stripped.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Io { path, .. } => vec![format!("Check permissions for {}", path.display())],
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileSystem
    }
}

// ============================================================================
// StageError
// ============================================================================

/// A fault that escaped a stage's own error handling
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Harness(#[from] RunnerError),

    #[error("{0}")]
    Internal(String),
}

// ============================================================================
// ForgeError rendering and exit codes
// ============================================================================

impl UserFriendlyError for ForgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Collaborator(e) => e.user_message(),
            Self::Artifact(e) => e.user_message(),
            Self::Runner(e) => format!("Process execution failed: {e}"),
            Self::Stage { stage, source } => format!("Stage '{stage}' faulted: {source}"),
            Self::StageAborted {
                stage,
                message,
                iterations,
                ..
            } => format!("Stage '{stage}' failed after {iterations} iteration(s): {message}"),
            Self::Cancelled { stage, iterations } => format!(
                "Run cancelled during '{stage}' after {iterations} iteration(s)"
            ),
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Collaborator(e) => e.context(),
            Self::Artifact(e) => e.context(),
            Self::StageAborted { diagnosis, .. } => {
                diagnosis.as_ref().map(|d| format!("Last diagnosis: {d}"))
            }
            Self::Stage { source, .. } => match source {
                StageError::Config(e) => e.context(),
                StageError::Collaborator(e) => e.context(),
                _ => None,
            },
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Collaborator(e) => e.suggestions(),
            Self::Artifact(e) => e.suggestions(),
            Self::Stage { source, .. } => match source {
                StageError::Config(e) => e.suggestions(),
                StageError::Collaborator(e) => e.suggestions(),
                StageError::Artifact(e) => e.suggestions(),
                _ => vec!["Re-run with --verbose for details".to_string()],
            },
            Self::StageAborted { .. } => vec![
                "Inspect the run's iteration log with 'forgeloop log --run <run_id>'".to_string(),
                "Raise workflow.max_iterations or run with --debug for an unbounded budget"
                    .to_string(),
                "Inject a directive with --instruct developer=\"...\"".to_string(),
            ],
            Self::Runner(_) => vec!["Check the [harness] program and arguments".to_string()],
            Self::Cancelled { .. } | Self::Io(_) => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Collaborator(e) => e.category(),
            Self::Artifact(_) | Self::Io(_) => ErrorCategory::FileSystem,
            Self::Runner(_) | Self::Stage { .. } => ErrorCategory::StageExecution,
            Self::StageAborted { .. } => ErrorCategory::Verification,
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
        }
    }
}

impl ForgeError {
    /// Render the error as `Error: / Context: / Suggestions:` blocks.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }

    /// Map this error to the process exit code.
    ///
    /// | Exit Code | Meaning |
    /// |-----------|---------|
    /// | 1 | Internal failure |
    /// | 2 | Configuration |
    /// | 3 | A stage failed (e.g. retry budget exhausted) |
    /// | 70 | Collaborator failure |
    /// | 130 | Cancelled |
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Stage { source, .. } => match source {
                StageError::Config(_) => ExitCode::CLI_ARGS,
                StageError::Collaborator(_) => ExitCode::COLLABORATOR_FAILURE,
                _ => ExitCode::INTERNAL,
            },
            Self::Collaborator(e) => match e {
                CollaboratorError::Misconfiguration(_) | CollaboratorError::Unsupported(_) => {
                    ExitCode::CLI_ARGS
                }
                _ => ExitCode::COLLABORATOR_FAILURE,
            },
            Self::StageAborted { .. } => ExitCode::VERIFICATION_FAILED,
            Self::Cancelled { .. } => ExitCode::ABORTED,
            Self::Artifact(_) | Self::Runner(_) | Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}
