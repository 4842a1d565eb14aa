//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments and initialises tracing
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;

use forgeloop_config::{CliArgs, Config};
use forgeloop_utils::error::ForgeError;
use forgeloop_utils::logging::init_tracing_with_format;
use forgeloop_utils::ExitCode;

use super::args::{Cli, Commands, RunArgs};
use super::commands;

/// Main CLI execution function.
///
/// Handles ALL output including errors and returns the exit code on failure;
/// main.rs only calls `std::process::exit`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing_with_format(cli.verbose, cli.log_format) {
        eprintln!("✗ Failed to initialise logging: {e}");
        return Err(ExitCode::INTERNAL);
    }

    let cli_args = cli_args_for(&cli);
    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = ForgeError::Config(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run(args) => commands::execute_run_command(args, config).await,
            Commands::Log { run, .. } => {
                commands::execute_log_command(&config.artifacts.root, run.as_deref())
            }
            Commands::Config => commands::execute_config_command(&config),
        }
    });
    // The operator console may still be blocked reading stdin.
    rt.shutdown_background();

    // Run summaries are already on stdout; errors go to stderr.
    if let Err(error) = result {
        if let Some(forge_error) = error.downcast_ref::<ForgeError>() {
            eprintln!("\n{}", forge_error.display_for_user());
            return Err(forge_error.to_exit_code());
        }
        eprintln!("✗ Unexpected error: {error:#}");
        eprintln!("\n  Run with --verbose for more detailed output");
        return Err(ExitCode::INTERNAL);
    }

    Ok(())
}

/// CLI-level configuration overrides for the parsed command line.
fn cli_args_for(cli: &Cli) -> CliArgs {
    let mut args = CliArgs {
        config_path: cli.config.clone(),
        ..CliArgs::default()
    };

    match &cli.command {
        Commands::Run(RunArgs {
            debug,
            max_iterations,
            artifact_root,
            on_failure,
            provider,
            model,
            ..
        }) => {
            args.debug = debug.then_some(true);
            args.max_iterations = *max_iterations;
            args.artifact_root = artifact_root.clone();
            args.on_failure = *on_failure;
            args.provider = provider.clone();
            args.model = model.clone();
        }
        Commands::Log { artifact_root, .. } => {
            args.artifact_root = artifact_root.clone();
        }
        Commands::Config => {}
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeloop_config::{FailureAction, RetryBudget};
    use std::path::PathBuf;

    #[test]
    fn test_run_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "forgeloop",
            "--config",
            "custom.toml",
            "run",
            "-r",
            "x",
            "--debug",
            "--max-iterations",
            "7",
            "--on-failure",
            "retry",
            "--provider",
            "openai",
        ])
        .unwrap();

        let args = cli_args_for(&cli);
        assert_eq!(args.config_path, Some(PathBuf::from("custom.toml")));
        assert_eq!(args.debug, Some(true));
        assert_eq!(args.max_iterations, Some(RetryBudget::Finite(7)));
        assert_eq!(args.on_failure, Some(FailureAction::Retry));
        assert_eq!(args.provider.as_deref(), Some("openai"));
        assert!(args.model.is_none());
    }

    #[test]
    fn test_debug_flag_absent_leaves_config_alone() {
        let cli = Cli::try_parse_from(["forgeloop", "run", "-r", "x"]).unwrap();
        assert_eq!(cli_args_for(&cli).debug, None);
    }

    #[test]
    fn test_log_artifact_root() {
        let cli = Cli::try_parse_from(["forgeloop", "log", "--artifact-root", "out"]).unwrap();
        assert_eq!(cli_args_for(&cli).artifact_root, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_log_run_selector() {
        let cli = Cli::try_parse_from(["forgeloop", "log", "--run", "run-a"]).unwrap();
        assert!(matches!(cli.command, Commands::Log { run: Some(ref id), .. } if id == "run-a"));
        assert_eq!(cli_args_for(&cli).artifact_root, None);
    }
}
