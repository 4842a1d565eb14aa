use strum::IntoEnumIterator;

use forgeloop_utils::error::ConfigError;
use forgeloop_utils::types::CollaboratorRole;

use crate::model::{Config, KNOWN_PROVIDERS, STAGE_NAMES};

fn invalid(key: impl Into<String>, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.workflow.request_timeout_secs) {
            return Err(invalid(
                "request_timeout_secs",
                format!(
                    "{} is outside 1..=3600 seconds",
                    self.workflow.request_timeout_secs
                ),
            ));
        }

        if !(1..=3600).contains(&self.harness.timeout_secs) {
            return Err(invalid(
                "harness.timeout_secs",
                format!("{} is outside 1..=3600 seconds", self.harness.timeout_secs),
            ));
        }

        if self.harness.program.trim().is_empty() {
            return Err(invalid("harness.program", "must not be empty"));
        }

        if self.artifacts.root.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("artifacts.root".to_string()));
        }

        for stage in self.workflow.stage_overrides.keys() {
            if !STAGE_NAMES.contains(&stage.as_str()) {
                return Err(invalid(
                    format!("workflow.stage_overrides.{stage}"),
                    format!("unknown stage (expected one of: {})", STAGE_NAMES.join(", ")),
                ));
            }
        }

        for role in CollaboratorRole::iter() {
            let binding = self.collaborator(role);

            if !KNOWN_PROVIDERS.contains(&binding.provider.as_str()) {
                return Err(invalid(
                    format!("collaborators.{role}.provider"),
                    format!(
                        "unknown provider '{}' (expected one of: {})",
                        binding.provider,
                        KNOWN_PROVIDERS.join(", ")
                    ),
                ));
            }

            if !(0.0..=2.0).contains(&binding.temperature) {
                return Err(invalid(
                    format!("collaborators.{role}.temperature"),
                    format!("{} is outside 0.0..=2.0", binding.temperature),
                ));
            }

            if binding.model.trim().is_empty() {
                return Err(invalid(format!("collaborators.{role}.model"), "must not be empty"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FailureAction, RetryBudget};

    fn key_of(err: ConfigError) -> String {
        match err {
            ConfigError::InvalidValue { key, .. } => key,
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_zero_iterations_accepted() {
        let mut config = Config::default();
        config.workflow.max_iterations = RetryBudget::Finite(0);
        config.validate().unwrap();
    }

    #[test]
    fn test_temperature_range() {
        let mut config = Config::default();
        config.collaborators.architect.temperature = Some(2.5);
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "collaborators.architect.temperature"
        );
    }

    #[test]
    fn test_timeouts_bounded() {
        let mut config = Config::default();
        config.workflow.request_timeout_secs = 0;
        assert_eq!(key_of(config.validate().unwrap_err()), "request_timeout_secs");

        let mut config = Config::default();
        config.harness.timeout_secs = 7200;
        assert_eq!(key_of(config.validate().unwrap_err()), "harness.timeout_secs");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        config.collaborators.qa.provider = Some("carrier-pigeon".to_string());
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "collaborators.qa.provider"
        );
    }

    #[test]
    fn test_unknown_stage_override_rejected() {
        let mut config = Config::default();
        config
            .workflow
            .stage_overrides
            .insert("deploy".to_string(), FailureAction::Skip);
        assert_eq!(
            key_of(config.validate().unwrap_err()),
            "workflow.stage_overrides.deploy"
        );
    }
}
