//! Configuration discovery, precedence and validation
//!
//! Tests:
//! - Upward discovery of `.forgeloop/config.toml`, stopping at `.git`
//! - Precedence: CLI > environment > config file > defaults
//! - Source attribution reported by `effective_config`
//! - Explicit `--config` paths, TOML and YAML
//! - Invalid files and values
//!
//! Every test is `#[serial]`: discovery reads process environment variables.

use anyhow::Result;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use forgeloop::config::{ConfigSource, ENV_MAX_ITERATIONS, ENV_PROVIDER};
use forgeloop::{CliArgs, CollaboratorRole, Config, ExitCode, FailureAction, ForgeError, RetryBudget};

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_dir = dir.join(".forgeloop");
    fs::create_dir_all(&config_dir).unwrap();
    let path = config_dir.join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

fn clear_env() {
    unsafe {
        env::remove_var(ENV_PROVIDER);
        env::remove_var(ENV_MAX_ITERATIONS);
    }
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
#[serial]
fn test_upward_discovery_from_subdirectory() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    let root = temp.path();
    fs::create_dir_all(root.join(".git"))?;
    create_config_file(
        root,
        r#"
[workflow]
max_iterations = 7
on_failure = "skip"
"#,
    );
    let nested = root.join("src").join("deep");
    fs::create_dir_all(&nested)?;

    let config = Config::discover_from(&nested, &CliArgs::default())?;

    assert_eq!(config.workflow.max_iterations, RetryBudget::Finite(7));
    assert_eq!(config.workflow.on_failure, FailureAction::Skip);
    assert_eq!(
        config.source_attribution.get("max_iterations"),
        Some(&ConfigSource::Config)
    );
    Ok(())
}

#[test]
#[serial]
fn test_discovery_stops_at_repository_root() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    let outer = temp.path();
    create_config_file(outer, "[workflow]\nmax_iterations = 9\n");
    let repo = outer.join("repo");
    fs::create_dir_all(repo.join(".git"))?;

    assert_eq!(Config::discover_config_file_from(&repo), None);
    let config = Config::discover_from(&repo, &CliArgs::default())?;
    assert_eq!(config.workflow.max_iterations, RetryBudget::Finite(3));
    Ok(())
}

#[test]
#[serial]
fn test_defaults_without_any_file() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    fs::create_dir_all(temp.path().join(".git"))?;

    let config = Config::discover_from(temp.path(), &CliArgs::default())?;

    assert_eq!(config.workflow.max_iterations, RetryBudget::Finite(3));
    assert_eq!(config.workflow.on_failure, FailureAction::Abort);
    assert!(!config.workflow.review_code);
    assert_eq!(config.artifacts.root, PathBuf::from("workspace"));
    assert_eq!(config.harness.program, "python");
    assert_eq!(config.collaborators.provider, "ollama");
    assert_eq!(
        config.collaborator(CollaboratorRole::Developer).temperature,
        0.2
    );
    assert_eq!(
        config.source_attribution.get("provider"),
        Some(&ConfigSource::Default)
    );
    Ok(())
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
#[serial]
fn test_cli_beats_env_beats_file() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    fs::create_dir_all(temp.path().join(".git"))?;
    create_config_file(
        temp.path(),
        r#"
[workflow]
max_iterations = 4

[collaborators]
provider = "openai"
model = "file-model"
"#,
    );
    unsafe {
        env::set_var(ENV_MAX_ITERATIONS, "unbounded");
        env::set_var(ENV_PROVIDER, "ollama");
    }
    let cli = CliArgs {
        model: Some("cli-model".into()),
        max_iterations: Some(RetryBudget::Finite(2)),
        ..CliArgs::default()
    };

    let config = Config::discover_from(temp.path(), &cli);
    clear_env();
    let config = config?;

    assert_eq!(config.workflow.max_iterations, RetryBudget::Finite(2));
    assert_eq!(config.collaborators.provider, "ollama");
    assert_eq!(config.collaborators.model, "cli-model");

    let attr = &config.source_attribution;
    assert_eq!(attr.get("max_iterations"), Some(&ConfigSource::Cli));
    assert_eq!(attr.get("provider"), Some(&ConfigSource::Env));
    assert_eq!(attr.get("model"), Some(&ConfigSource::Cli));
    Ok(())
}

#[test]
#[serial]
fn test_invalid_env_budget_is_ignored() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    fs::create_dir_all(temp.path().join(".git"))?;
    unsafe {
        env::set_var(ENV_MAX_ITERATIONS, "lots");
    }

    let config = Config::discover_from(temp.path(), &CliArgs::default());
    clear_env();

    assert_eq!(config?.workflow.max_iterations, RetryBudget::Finite(3));
    Ok(())
}

#[test]
#[serial]
fn test_debug_makes_budget_unbounded() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    fs::create_dir_all(temp.path().join(".git"))?;
    create_config_file(temp.path(), "[workflow]\nmax_iterations = 2\n\n[debug]\nenabled = true\n");

    let config = Config::discover_from(temp.path(), &CliArgs::default())?;

    assert_eq!(config.workflow.max_iterations, RetryBudget::Finite(2));
    assert_eq!(config.retry_budget(), RetryBudget::Unbounded);

    let effective = config.effective_config();
    let (value, source) = &effective["workflow.effective_budget"];
    assert_eq!(value, "unbounded");
    assert_eq!(source, "config");
    Ok(())
}

// ============================================================================
// Explicit paths and formats
// ============================================================================

#[test]
#[serial]
fn test_explicit_yaml_config() -> Result<()> {
    clear_env();
    let temp = TempDir::new()?;
    let path = temp.path().join("forgeloop.yaml");
    fs::write(
        &path,
        r#"
workflow:
  max_iterations: unbounded
  stage_overrides:
    packaging: skip
collaborators:
  qa:
    temperature: 0.9
instructions:
  developer:
    - use type hints
"#,
    )?;
    let cli = CliArgs {
        config_path: Some(path),
        ..CliArgs::default()
    };

    let config = Config::discover_from(temp.path(), &cli)?;

    assert_eq!(config.workflow.max_iterations, RetryBudget::Unbounded);
    assert_eq!(config.failure_action_for("packaging"), FailureAction::Skip);
    assert_eq!(config.failure_action_for("coding"), FailureAction::Abort);
    assert_eq!(config.collaborator(CollaboratorRole::Qa).temperature, 0.9);
    assert_eq!(
        config.instructions.for_role(CollaboratorRole::Developer),
        ["use type hints".to_string()]
    );
    Ok(())
}

#[test]
#[serial]
fn test_missing_explicit_config_fails() {
    clear_env();
    let temp = TempDir::new().unwrap();
    let cli = CliArgs {
        config_path: Some(temp.path().join("absent.toml")),
        ..CliArgs::default()
    };

    let err = Config::discover_from(temp.path(), &cli).unwrap_err();
    let err = ForgeError::from(err);
    assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    assert!(err.display_for_user().contains("absent.toml"));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
#[serial]
fn test_invalid_files_are_rejected() {
    clear_env();
    let cases = [
        ("[workflow]\nmax_iterations = -1\n", "negative budget"),
        ("[workflow]\non_failure = \"ignore\"\n", "unknown action"),
        ("[workflow.stage_overrides]\ndeploy = \"skip\"\n", "unknown stage"),
        ("[workflow]\nrequest_timeout_secs = 0\n", "timeout below range"),
        ("[collaborators]\nprovider = \"carrier-pigeon\"\n", "unknown provider"),
        ("[collaborators.qa]\ntemperature = 3.5\n", "temperature"),
        ("[harness]\ntimeout_secs = 7200\n", "harness timeout"),
        ("[workflow\n", "syntax"),
        ("[telemetry]\nenabled = true\n", "unknown section"),
    ];

    for (content, label) in cases {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".git")).unwrap();
        create_config_file(temp.path(), content);

        let result = Config::discover_from(temp.path(), &CliArgs::default());
        assert!(result.is_err(), "{label} should be rejected");
    }
}

#[test]
#[serial]
fn test_builder_attribution_is_programmatic() -> Result<()> {
    clear_env();
    let config = Config::builder()
        .max_iterations(RetryBudget::Finite(5))
        .on_failure(FailureAction::Retry)
        .build()?;

    assert_eq!(
        config.source_attribution.get("max_iterations"),
        Some(&ConfigSource::Programmatic)
    );
    assert_eq!(
        config.source_attribution.get("artifact_root"),
        Some(&ConfigSource::Default)
    );
    Ok(())
}
