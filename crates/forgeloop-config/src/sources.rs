use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use forgeloop_utils::types::{CollaboratorRole, ConfigSource};

use crate::model::Config;

fn source_label(source: Option<&ConfigSource>) -> String {
    source.copied().unwrap_or(ConfigSource::Default).to_string()
}

impl Config {
    /// Effective configuration as key → (value, source), sorted by key.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut out = BTreeMap::new();
        let mut add = |key: &str, attr_key: &str, value: String| {
            let source = source_label(self.source_attribution.get(attr_key));
            out.insert(key.to_string(), (value, source));
        };

        add(
            "workflow.max_iterations",
            "max_iterations",
            self.workflow.max_iterations.to_string(),
        );
        add(
            "workflow.effective_budget",
            if self.debug.enabled { "debug" } else { "max_iterations" },
            self.retry_budget().to_string(),
        );
        add(
            "workflow.on_failure",
            "on_failure",
            self.workflow.on_failure.to_string(),
        );
        for (stage, action) in &self.workflow.stage_overrides {
            add(
                &format!("workflow.stage_overrides.{stage}"),
                "stage_overrides",
                action.to_string(),
            );
        }
        add(
            "workflow.request_timeout_secs",
            "request_timeout_secs",
            self.workflow.request_timeout_secs.to_string(),
        );
        add(
            "workflow.review_code",
            "review_code",
            self.workflow.review_code.to_string(),
        );
        add("debug.enabled", "debug", self.debug.enabled.to_string());
        add(
            "artifacts.root",
            "artifact_root",
            self.artifacts.root.display().to_string(),
        );
        add(
            "harness.command",
            "harness_program",
            std::iter::once(self.harness.program.as_str())
                .chain(self.harness.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        );
        add(
            "harness.timeout_secs",
            "harness_timeout_secs",
            self.harness.timeout_secs.to_string(),
        );
        add(
            "harness.output_cap_bytes",
            "harness_output_cap_bytes",
            self.harness.output_cap_bytes.to_string(),
        );

        for role in CollaboratorRole::iter() {
            let binding = self.collaborator(role);
            let role_key = format!("collaborators.{role}");
            let table = self.collaborators.role(role);
            let pick = |own: bool, shared: &str| if own { role_key.clone() } else { shared.to_string() };

            add(
                &format!("{role_key}.provider"),
                &pick(table.provider.is_some(), "provider"),
                binding.provider,
            );
            add(
                &format!("{role_key}.host"),
                &pick(table.host.is_some(), "host"),
                binding.host,
            );
            add(
                &format!("{role_key}.model"),
                &pick(table.model.is_some(), "model"),
                binding.model,
            );
            add(
                &format!("{role_key}.temperature"),
                &pick(table.temperature.is_some(), "temperature"),
                binding.temperature.to_string(),
            );

            let seeds = self.instructions.for_role(role);
            if !seeds.is_empty() {
                add(
                    &format!("instructions.{role}"),
                    "instructions",
                    seeds.join(" | "),
                );
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleConfig;

    #[test]
    fn test_effective_config_reports_sources() {
        let config = Config::builder()
            .model("llama3")
            .role(
                CollaboratorRole::Qa,
                RoleConfig {
                    model: Some("mistral".into()),
                    ..RoleConfig::default()
                },
            )
            .build()
            .unwrap();
        let effective = config.effective_config();

        assert_eq!(
            effective.get("collaborators.developer.model"),
            Some(&("llama3".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("collaborators.qa.model"),
            Some(&("mistral".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("workflow.max_iterations"),
            Some(&("3".to_string(), "default".to_string()))
        );
    }

    #[test]
    fn test_debug_budget_is_attributed_to_debug() {
        let config = Config::builder().debug(true).build().unwrap();
        let effective = config.effective_config();
        assert_eq!(
            effective.get("workflow.effective_budget"),
            Some(&("unbounded".to_string(), "programmatic".to_string()))
        );
    }
}
