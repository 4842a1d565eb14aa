use std::path::PathBuf;
use std::time::Duration;

use forgeloop_utils::error::ConfigError;
use forgeloop_utils::types::{CollaboratorRole, ConfigSource};

use crate::discovery::default_attribution;
use crate::model::{Config, FailureAction, RetryBudget, RoleConfig};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// No files or environment variables are consulted, which makes the
    /// result deterministic for embedding and tests.
    ///
    /// ```rust
    /// use forgeloop_config::{Config, RetryBudget};
    ///
    /// let config = Config::builder()
    ///     .max_iterations(RetryBudget::Finite(5))
    ///     .artifact_root("/tmp/forge")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.retry_budget(), RetryBudget::Finite(5));
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for [`Config`].
///
/// Every value set through the builder is attributed to
/// [`ConfigSource::Programmatic`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        let config = Config {
            source_attribution: default_attribution(),
            ..Config::default()
        };
        Self { config }
    }

    fn mark(&mut self, key: impl Into<String>) {
        self.config
            .source_attribution
            .insert(key.into(), ConfigSource::Programmatic);
    }

    #[must_use]
    pub fn max_iterations(mut self, budget: RetryBudget) -> Self {
        self.config.workflow.max_iterations = budget;
        self.mark("max_iterations");
        self
    }

    /// Debug mode makes the retry budget unbounded.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug.enabled = enabled;
        self.mark("debug");
        self
    }

    #[must_use]
    pub fn on_failure(mut self, action: FailureAction) -> Self {
        self.config.workflow.on_failure = action;
        self.mark("on_failure");
        self
    }

    #[must_use]
    pub fn stage_override(mut self, stage: impl Into<String>, action: FailureAction) -> Self {
        self.config
            .workflow
            .stage_overrides
            .insert(stage.into(), action);
        self.mark("stage_overrides");
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.workflow.request_timeout_secs = timeout.as_secs();
        self.mark("request_timeout_secs");
        self
    }

    #[must_use]
    pub fn review_code(mut self, enabled: bool) -> Self {
        self.config.workflow.review_code = enabled;
        self.mark("review_code");
        self
    }

    #[must_use]
    pub fn artifact_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.artifacts.root = root.into();
        self.mark("artifact_root");
        self
    }

    #[must_use]
    pub fn harness_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.harness.program = program.into();
        self.config.harness.args = args.into_iter().map(Into::into).collect();
        self.mark("harness_program");
        self.mark("harness_args");
        self
    }

    #[must_use]
    pub fn harness_timeout(mut self, timeout: Duration) -> Self {
        self.config.harness.timeout_secs = timeout.as_secs();
        self.mark("harness_timeout_secs");
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.config.collaborators.provider = provider.into();
        self.mark("provider");
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.collaborators.host = host.into();
        self.mark("host");
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.collaborators.model = model.into();
        self.mark("model");
        self
    }

    /// Replace the `[collaborators.<role>]` table for one role.
    #[must_use]
    pub fn role(mut self, role: CollaboratorRole, table: RoleConfig) -> Self {
        *self.config.collaborators.role_mut(role) = table;
        self.mark(format!("collaborators.{role}"));
        self
    }

    /// Add a seed directive for a role.
    #[must_use]
    pub fn instruction(mut self, role: CollaboratorRole, text: impl Into<String>) -> Self {
        self.config.instructions.for_role_mut(role).push(text.into());
        self.mark("instructions");
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
