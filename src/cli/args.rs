//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use forgeloop_config::{FailureAction, RetryBudget};
use forgeloop_utils::logging::LogFormat;
use forgeloop_utils::types::CollaboratorRole;

/// forgeloop - requirement-to-release code generation with a repair loop
#[derive(Parser, Debug)]
#[command(name = "forgeloop")]
#[command(about = "Turn a free-text requirement into a tested, packaged project")]
#[command(long_about = r#"
forgeloop drives architect, developer and qa collaborators through a fixed
pipeline: requirement analysis → architecture design → coding → verification →
packaging. Verification runs the generated tests and repairs the code until
they pass or the retry budget is spent.

EXAMPLES:
  # Run from a requirement on the command line
  forgeloop run -r "Build a calculator with add and subtract"

  # Read the requirement from stdin, with an unbounded repair loop
  echo "Build a todo list API" | forgeloop run --debug

  # Seed a directive and steer the developer while the run is in progress
  forgeloop run -r "..." --instruct developer="use type hints" --interactive

  # Replay the iteration log of the last runs
  forgeloop log

  # Show the effective configuration and where each value came from
  forgeloop config

CONFIGURATION:
  Precedence: CLI flags > environment > config file > defaults
  The config file is discovered by searching upward from CWD for
  .forgeloop/config.toml. Use --config to pass a TOML or YAML file.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format on stderr: compact or json
    #[arg(long, global = true, default_value = "compact", value_parser = LogFormat::from_str)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline for one requirement
    ///
    /// The requirement comes from --requirement, --requirement-file or stdin,
    /// in that order.
    ///
    /// EXAMPLES:
    ///   forgeloop run -r "Build a calculator"
    ///   forgeloop run --requirement-file req.txt --max-iterations 5
    ///   forgeloop run -r "..." --on-failure skip
    Run(RunArgs),

    /// Replay the verification iteration log
    ///
    /// EXAMPLES:
    ///   forgeloop log
    ///   forgeloop log --run run-20260101T120000000Z-0
    ///   forgeloop log --artifact-root ./out
    Log {
        /// Artifact root holding runs/<run_id>/reports/iteration_log.jsonl
        #[arg(long)]
        artifact_root: Option<PathBuf>,

        /// Replay a single run instead of every run under the root
        #[arg(long, value_name = "RUN_ID")]
        run: Option<String>,
    },

    /// Print the effective configuration with the source of each value
    Config,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Requirement text
    #[arg(short = 'r', long, conflicts_with = "requirement_file")]
    pub requirement: Option<String>,

    /// File holding the requirement text
    #[arg(long)]
    pub requirement_file: Option<PathBuf>,

    /// Unbounded repair loop
    #[arg(long)]
    pub debug: bool,

    /// Retry budget: a non-negative integer or "unbounded"
    #[arg(long)]
    pub max_iterations: Option<RetryBudget>,

    /// Directory receiving the generated artifacts
    #[arg(long)]
    pub artifact_root: Option<PathBuf>,

    /// What to do when a stage fails: abort, skip or retry
    #[arg(long)]
    pub on_failure: Option<FailureAction>,

    /// Collaborator provider for every role (ollama, openai)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for every role without a per-role model
    #[arg(long)]
    pub model: Option<String>,

    /// Seed directive for a role, as ROLE=TEXT (repeatable)
    #[arg(long = "instruct", value_name = "ROLE=TEXT", value_parser = parse_directive)]
    pub instruct: Vec<(CollaboratorRole, String)>,

    /// Read "ROLE: TEXT" and "clear ROLE" lines from stdin during the run
    #[arg(long)]
    pub interactive: bool,
}

/// Parse a `ROLE=TEXT` directive.
pub fn parse_directive(raw: &str) -> Result<(CollaboratorRole, String), String> {
    let (role, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ROLE=TEXT, got '{raw}'"))?;
    let role = CollaboratorRole::from_str(role.trim())
        .map_err(|_| format!("unknown role '{}' (expected architect, developer or qa)", role.trim()))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(format!("directive for {role} is empty"));
    }
    Ok((role, text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "forgeloop",
            "run",
            "-r",
            "Build a calculator",
            "--max-iterations",
            "unbounded",
            "--on-failure",
            "skip",
            "--instruct",
            "developer=use type hints",
            "--instruct",
            "qa=be terse",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.requirement.as_deref(), Some("Build a calculator"));
        assert_eq!(args.max_iterations, Some(RetryBudget::Unbounded));
        assert_eq!(args.on_failure, Some(FailureAction::Skip));
        assert_eq!(
            args.instruct,
            vec![
                (CollaboratorRole::Developer, "use type hints".to_string()),
                (CollaboratorRole::Qa, "be terse".to_string()),
            ]
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["forgeloop", "config", "--verbose", "--log-format", "json"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_requirement_sources_conflict() {
        let err = Cli::try_parse_from([
            "forgeloop",
            "run",
            "-r",
            "x",
            "--requirement-file",
            "req.txt",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(Cli::try_parse_from(["forgeloop", "run", "--on-failure", "ignore"]).is_err());
        assert!(Cli::try_parse_from(["forgeloop", "run", "--max-iterations", "lots"]).is_err());
        assert!(Cli::try_parse_from(["forgeloop", "run", "--instruct", "manager=hi"]).is_err());
    }

    #[test]
    fn test_parse_directive() {
        assert_eq!(
            parse_directive("Architect = keep it small").unwrap(),
            (CollaboratorRole::Architect, "keep it small".to_string())
        );
        assert!(parse_directive("developer").is_err());
        assert!(parse_directive("developer=  ").is_err());
    }
}
