use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tracing::debug;

use forgeloop_utils::error::ConfigError;
use forgeloop_utils::types::{CollaboratorRole, ConfigSource};

use crate::model::{CliArgs, Config, FailureAction, RetryBudget, RoleConfig};
use crate::{ENV_MAX_ITERATIONS, ENV_PROVIDER};

/// On-disk configuration structure (TOML or YAML)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    workflow: Option<FileWorkflow>,
    debug: Option<FileDebug>,
    artifacts: Option<FileArtifacts>,
    harness: Option<FileHarness>,
    collaborators: Option<FileCollaborators>,
    instructions: Option<crate::model::InstructionsConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileWorkflow {
    max_iterations: Option<RetryBudget>,
    on_failure: Option<FailureAction>,
    stage_overrides: Option<BTreeMap<String, FailureAction>>,
    request_timeout_secs: Option<u64>,
    review_code: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileDebug {
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileArtifacts {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileHarness {
    program: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    output_cap_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileCollaborators {
    provider: Option<String>,
    host: Option<String>,
    model: Option<String>,
    architect: Option<RoleConfig>,
    developer: Option<RoleConfig>,
    qa: Option<RoleConfig>,
}

impl FileCollaborators {
    fn take_role(&mut self, role: CollaboratorRole) -> Option<RoleConfig> {
        match role {
            CollaboratorRole::Architect => self.architect.take(),
            CollaboratorRole::Developer => self.developer.take(),
            CollaboratorRole::Qa => self.qa.take(),
        }
    }
}

impl Config {
    /// Discover and load configuration with precedence: CLI > env > file > defaults.
    ///
    /// Uses the current working directory for discovery when no explicit path
    /// is given in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot determine current directory: {e}"),
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from `start_dir`.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.source_attribution = default_attribution();

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "Loading configuration file");
            let file_config = load_config_file(path)?;
            config.apply_file(file_config);
        }

        config.apply_env();
        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Search upward from `start_dir` for `.forgeloop/config.toml`.
    ///
    /// Stops at repository root markers (`.git`, `.hg`, `.svn`) or the
    /// filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".forgeloop").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }
            if [".git", ".hg", ".svn"]
                .iter()
                .any(|marker| dir.join(marker).exists())
            {
                break;
            }
            current = dir.parent();
        }

        None
    }

    fn apply_file(&mut self, file: FileConfig) {
        let src = ConfigSource::Config;
        let attr = &mut self.source_attribution;

        if let Some(w) = file.workflow {
            if let Some(v) = w.max_iterations {
                self.workflow.max_iterations = v;
                attr.insert("max_iterations".into(), src);
            }
            if let Some(v) = w.on_failure {
                self.workflow.on_failure = v;
                attr.insert("on_failure".into(), src);
            }
            if let Some(v) = w.stage_overrides {
                self.workflow.stage_overrides = v;
                attr.insert("stage_overrides".into(), src);
            }
            if let Some(v) = w.request_timeout_secs {
                self.workflow.request_timeout_secs = v;
                attr.insert("request_timeout_secs".into(), src);
            }
            if let Some(v) = w.review_code {
                self.workflow.review_code = v;
                attr.insert("review_code".into(), src);
            }
        }

        if let Some(v) = file.debug.and_then(|d| d.enabled) {
            self.debug.enabled = v;
            attr.insert("debug".into(), src);
        }

        if let Some(v) = file.artifacts.and_then(|a| a.root) {
            self.artifacts.root = v;
            attr.insert("artifact_root".into(), src);
        }

        if let Some(h) = file.harness {
            if let Some(v) = h.program {
                self.harness.program = v;
                attr.insert("harness_program".into(), src);
            }
            if let Some(v) = h.args {
                self.harness.args = v;
                attr.insert("harness_args".into(), src);
            }
            if let Some(v) = h.timeout_secs {
                self.harness.timeout_secs = v;
                attr.insert("harness_timeout_secs".into(), src);
            }
            if let Some(v) = h.output_cap_bytes {
                self.harness.output_cap_bytes = v;
                attr.insert("harness_output_cap_bytes".into(), src);
            }
        }

        if let Some(mut c) = file.collaborators {
            if let Some(v) = c.provider.take() {
                self.collaborators.provider = v;
                attr.insert("provider".into(), src);
            }
            if let Some(v) = c.host.take() {
                self.collaborators.host = v;
                attr.insert("host".into(), src);
            }
            if let Some(v) = c.model.take() {
                self.collaborators.model = v;
                attr.insert("model".into(), src);
            }
            for role in CollaboratorRole::iter() {
                if let Some(table) = c.take_role(role) {
                    *self.collaborators.role_mut(role) = table;
                    attr.insert(format!("collaborators.{role}"), src);
                }
            }
        }

        if let Some(instructions) = file.instructions {
            self.instructions = instructions;
            attr.insert("instructions".into(), src);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(provider) = env::var(ENV_PROVIDER)
            && !provider.is_empty()
        {
            self.collaborators.provider = provider;
            self.source_attribution
                .insert("provider".into(), ConfigSource::Env);
        }

        if let Ok(raw) = env::var(ENV_MAX_ITERATIONS)
            && !raw.is_empty()
        {
            match raw.parse::<RetryBudget>() {
                Ok(budget) => {
                    self.workflow.max_iterations = budget;
                    self.source_attribution
                        .insert("max_iterations".into(), ConfigSource::Env);
                }
                Err(reason) => {
                    tracing::warn!(var = ENV_MAX_ITERATIONS, %reason, "Ignoring invalid environment override");
                }
            }
        }
    }

    fn apply_cli(&mut self, cli: &CliArgs) {
        let attr = &mut self.source_attribution;
        if let Some(v) = cli.max_iterations {
            self.workflow.max_iterations = v;
            attr.insert("max_iterations".into(), ConfigSource::Cli);
        }
        if let Some(v) = cli.debug {
            self.debug.enabled = v;
            attr.insert("debug".into(), ConfigSource::Cli);
        }
        if let Some(v) = &cli.artifact_root {
            self.artifacts.root = v.clone();
            attr.insert("artifact_root".into(), ConfigSource::Cli);
        }
        if let Some(v) = cli.on_failure {
            self.workflow.on_failure = v;
            attr.insert("on_failure".into(), ConfigSource::Cli);
        }
        if let Some(v) = &cli.provider {
            self.collaborators.provider = v.clone();
            attr.insert("provider".into(), ConfigSource::Cli);
        }
        if let Some(v) = &cli.model {
            self.collaborators.model = v.clone();
            attr.insert("model".into(), ConfigSource::Cli);
        }
    }
}

pub(crate) fn default_attribution() -> HashMap<String, ConfigSource> {
    [
        "max_iterations",
        "on_failure",
        "request_timeout_secs",
        "review_code",
        "debug",
        "artifact_root",
        "harness_program",
        "harness_args",
        "harness_timeout_secs",
        "harness_output_cap_bytes",
        "provider",
        "host",
        "model",
    ]
    .into_iter()
    .map(|k| (k.to_string(), ConfigSource::Default))
    .collect()
}

/// Load a configuration file; YAML when the extension says so, TOML otherwise.
fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        // A file that vanished between discovery and load means defaults.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileConfig::default()),
        Err(e) => {
            return Err(ConfigError::InvalidFile(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        if content.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    } else {
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }
}
