//! Intervention policies: what the engine does when a stage returns `failed`.

use std::collections::BTreeMap;

use forgeloop_config::{Config, FailureAction};
use forgeloop_stage_api::StageResult;

/// Decides retry / skip / abort for a failed stage.
///
/// `attempt` is 1 for the first execution and 2 for the retry. The engine
/// re-invokes a stage at most once, so a `Retry` on attempt 2 is treated as
/// `Abort`.
pub trait InterventionPolicy: Send + Sync {
    fn decide(&self, stage: &str, result: &StageResult, attempt: u32) -> FailureAction;
}

/// Fixed action per stage, with a default for stages without an override.
#[derive(Debug, Clone, Default)]
pub struct FixedPolicy {
    default: FailureAction,
    overrides: BTreeMap<String, FailureAction>,
}

impl FixedPolicy {
    #[must_use]
    pub fn new(default: FailureAction) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// `workflow.on_failure` plus `workflow.stage_overrides`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            default: config.workflow.on_failure,
            overrides: config.workflow.stage_overrides.clone(),
        }
    }

    #[must_use]
    pub fn with_override(mut self, stage: impl Into<String>, action: FailureAction) -> Self {
        self.overrides.insert(stage.into(), action);
        self
    }
}

impl InterventionPolicy for FixedPolicy {
    fn decide(&self, stage: &str, _result: &StageResult, _attempt: u32) -> FailureAction {
        self.overrides.get(stage).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_default() {
        let policy = FixedPolicy::new(FailureAction::Abort)
            .with_override("verification", FailureAction::Skip);
        let failed = StageResult::failed("boom");

        assert_eq!(policy.decide("verification", &failed, 1), FailureAction::Skip);
        assert_eq!(policy.decide("coding", &failed, 1), FailureAction::Abort);
    }

    #[test]
    fn test_from_config() {
        let config = Config::builder()
            .on_failure(FailureAction::Retry)
            .stage_override("packaging", FailureAction::Skip)
            .build()
            .unwrap();
        let policy = FixedPolicy::from_config(&config);
        let failed = StageResult::failed("boom");

        assert_eq!(policy.decide("coding", &failed, 1), FailureAction::Retry);
        assert_eq!(policy.decide("packaging", &failed, 1), FailureAction::Skip);
    }
}
