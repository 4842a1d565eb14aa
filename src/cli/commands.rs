//! CLI command implementations
//!
//! Each `execute_*` function handles one subcommand. Run failures are
//! returned as [`ForgeError`] inside `anyhow::Error` so `run()` can map them
//! to exit codes.

use anyhow::{Context, Result};
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use forgeloop_artifacts::{IterationLog, list_runs, run_root};
use forgeloop_config::Config;
use forgeloop_engine::{ConsoleReporter, PipelineBuilder, RunReport, RunStatus, TracingReporter};
use forgeloop_llm::CollaboratorRegistry;
use forgeloop_stage_api::{CancellationFlag, IterationRecord};
use forgeloop_utils::error::{ConfigError, ForgeError};
use forgeloop_utils::types::CollaboratorRole;

use super::args::RunArgs;

// ============================================================================
// Run Command
// ============================================================================

/// Execute the pipeline for one requirement.
pub async fn execute_run_command(args: RunArgs, config: Config) -> Result<()> {
    let requirement = read_requirement(&args)?;

    let pipeline = PipelineBuilder::from_config(config)
        .with_reporter(Box::new(ConsoleReporter::stdout()))
        .with_reporter(Box::new(TracingReporter))
        .build()?;

    let collaborators = pipeline.collaborators().clone();
    for (role, text) in &args.instruct {
        if !collaborators
            .inject(*role, text)
            .map_err(ForgeError::from)?
        {
            warn!(role = %role, "Ignoring empty directive");
        }
    }

    let mut ctx = pipeline.build_context(requirement)?;
    info!(
        run_id = %ctx.run_id(),
        root = ?ctx.store().root(),
        "Starting run"
    );

    let cancel = ctx.cancellation();
    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel));
    let console = args.interactive.then(|| {
        let reader = BufReader::new(tokio::io::stdin());
        tokio::spawn(operator_console(reader, collaborators))
    });

    let outcome = pipeline.run(&mut ctx).await;

    interrupt.abort();
    if let Some(console) = console {
        console.abort();
    }

    let report = outcome?;
    print_summary(&report, ctx.store().root());

    match report.to_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn read_requirement(args: &RunArgs) -> Result<String> {
    let text = if let Some(text) = &args.requirement {
        text.clone()
    } else if let Some(path) = &args.requirement_file {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read requirement file {}", path.display()))?
    } else {
        if args.interactive {
            return Err(ForgeError::Config(ConfigError::MissingRequired(
                "requirement (stdin is reserved for operator directives with --interactive)"
                    .to_string(),
            ))
            .into());
        }
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            eprintln!("Enter the requirement, then end input with Ctrl-D:");
        }
        let mut text = String::new();
        stdin
            .read_to_string(&mut text)
            .context("Failed to read requirement from stdin")?;
        text
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(ForgeError::Config(ConfigError::MissingRequired("requirement".to_string())).into());
    }
    Ok(text.to_string())
}

async fn cancel_on_ctrl_c(flag: CancellationFlag) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nInterrupt received; stopping at the next iteration boundary...");
        flag.cancel();
    }
}

/// A line typed into the operator console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Inject { role: CollaboratorRole, text: String },
    Clear(CollaboratorRole),
}

/// Parse `ROLE: TEXT` or `clear ROLE`. Blank lines and unknown roles yield
/// `None`.
pub fn parse_operator_line(line: &str) -> Option<OperatorCommand> {
    let line = line.trim();
    if let Some(role) = line.strip_prefix("clear ") {
        return CollaboratorRole::from_str(role.trim())
            .ok()
            .map(OperatorCommand::Clear);
    }
    let (role, text) = line.split_once(':')?;
    let role = CollaboratorRole::from_str(role.trim()).ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(OperatorCommand::Inject {
        role,
        text: text.to_string(),
    })
}

/// Apply operator lines to the shared registry until the reader closes.
pub async fn operator_console<R>(reader: R, collaborators: CollaboratorRegistry)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Operator console closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_operator_line(&line) {
            Some(OperatorCommand::Inject { role, text }) => {
                match collaborators.inject(role, &text) {
                    Ok(_) => eprintln!("+ directive queued for {role}"),
                    Err(e) => warn!(role = %role, error = %e, "Directive rejected"),
                }
            }
            Some(OperatorCommand::Clear(role)) => match collaborators.clear(role) {
                Ok(()) => eprintln!("- directives cleared for {role}"),
                Err(e) => warn!(role = %role, error = %e, "Clear rejected"),
            },
            None => eprintln!("? expected 'ROLE: TEXT' or 'clear ROLE' (roles: architect, developer, qa)"),
        }
    }
    debug!("Operator console finished");
}

fn print_summary(report: &RunReport, artifacts: Option<&Path>) {
    println!();
    println!("Status:     {}", report.status);
    println!("Run:        {}", report.run_id);
    if let Some(dir) = artifacts {
        println!("Artifacts:  {}", dir.display());
    }
    println!("Iterations: {}", report.iterations.len());
    println!("Duration:   {:.1}s", report.duration.as_secs_f64());

    if !report.skipped_failures.is_empty() {
        println!("Skipped:    {}", report.skipped_failures.join(", "));
    }

    match report.status {
        RunStatus::Success => {
            if let Some(archive) = report.package_path() {
                println!("Release:    {archive}");
            }
        }
        RunStatus::Error | RunStatus::Cancelled => {
            if let Some(failure) = &report.error {
                println!("Stage:      {}", failure.stage);
                println!("Reason:     {}", failure.message);
                if let Some(diagnosis) = &failure.diagnosis {
                    println!("Diagnosis:  {}", diagnosis.summary());
                }
            }
        }
    }
}

// ============================================================================
// Log Command
// ============================================================================

/// Print the recorded verification attempts of one run, or of every run
/// under the artifact root in start order.
pub fn execute_log_command(root: &Path, run: Option<&str>) -> Result<()> {
    let runs = match run {
        Some(id) => vec![id.to_string()],
        None => list_runs(root).map_err(ForgeError::from)?,
    };

    let mut records: Vec<IterationRecord> = Vec::new();
    for id in &runs {
        let path = IterationLog::path_in(&run_root(root, id).map_err(ForgeError::from)?);
        debug!(path = %path.display(), "Replaying iteration log");
        records.extend(IterationLog::replay::<IterationRecord>(&path).map_err(ForgeError::from)?);
    }

    if records.is_empty() {
        match run {
            Some(id) => println!("No iterations recorded for run {id} under {}", root.display()),
            None => println!("No iterations recorded under {}", root.display()),
        }
        return Ok(());
    }

    println!("{}", root.display());
    for line in render_log(&records) {
        println!("{line}");
    }
    Ok(())
}

/// One summary line per record, plus the diagnosis and repaired files.
pub fn render_log(records: &[IterationRecord]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_run: Option<&str> = None;

    for record in records {
        if current_run != Some(record.run_id.as_str()) {
            lines.push(format!("run {}", record.run_id));
            current_run = Some(&record.run_id);
        }
        let verdict = if record.passed { "passed" } else { "failed" };
        lines.push(format!(
            "  #{} {} {} ({}/{} failed)",
            record.iteration,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            verdict,
            record.stats.failed,
            record.stats.total
        ));
        if let Some(diagnosis) = &record.diagnosis {
            lines.push(format!("     diagnosis: {}", diagnosis.summary()));
        }
        if !record.repaired.is_empty() {
            lines.push(format!("     repaired: {}", record.repaired.join(", ")));
        }
    }
    lines
}

// ============================================================================
// Config Command
// ============================================================================

/// Print the effective configuration and the source of each value.
pub fn execute_config_command(config: &Config) -> Result<()> {
    let entries = config.effective_config();
    let width = entries.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in entries {
        println!("{key:<width$} = {value}  [{source}]");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use forgeloop_llm::Diagnosis;
    use forgeloop_llm::testing::ScriptedBackend;
    use forgeloop_runner::HarnessStats;
    use std::sync::Arc;

    // ===== Operator console =====

    #[test]
    fn test_parse_operator_line() {
        assert_eq!(
            parse_operator_line("developer: use pathlib"),
            Some(OperatorCommand::Inject {
                role: CollaboratorRole::Developer,
                text: "use pathlib".to_string()
            })
        );
        assert_eq!(
            parse_operator_line("  clear QA "),
            Some(OperatorCommand::Clear(CollaboratorRole::Qa))
        );
        assert_eq!(parse_operator_line("manager: hurry"), None);
        assert_eq!(parse_operator_line("architect:   "), None);
        assert_eq!(parse_operator_line("no separator"), None);
    }

    #[tokio::test]
    async fn test_operator_console_injects_into_shared_registry() {
        let config = Config::default();
        let registry =
            CollaboratorRegistry::with_shared_backend(&config, Arc::new(ScriptedBackend::new(vec!["x"])));
        let input: &[u8] = b"developer: first\nqa: check imports\nbogus line\nclear qa\ndeveloper: second\n";

        operator_console(BufReader::new(input), registry.clone()).await;

        let developer = registry.instructions(CollaboratorRole::Developer).unwrap();
        let texts: Vec<_> = developer.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(registry.instructions(CollaboratorRole::Qa).unwrap().is_empty());
    }

    // ===== Log rendering =====

    fn record(run: &str, iteration: u32, passed: bool) -> IterationRecord {
        IterationRecord {
            run_id: run.to_string(),
            iteration,
            timestamp: Utc::now(),
            passed,
            stats: HarnessStats { total: 2, failed: if passed { 0 } else { 2 } },
            output: String::new(),
            diagnosis: (!passed).then(|| Diagnosis {
                error_type: "import-error".into(),
                root_cause: "add is missing".into(),
                ..Diagnosis::default()
            }),
            repaired: if passed { Vec::new() } else { vec!["calc.py".into()] },
        }
    }

    #[test]
    fn test_render_log_groups_by_run() {
        let lines = render_log(&[record("a", 1, false), record("a", 2, true), record("b", 1, true)]);

        assert_eq!(lines[0], "run a");
        assert!(lines[1].starts_with("  #1 ") && lines[1].ends_with("failed (2/2 failed)"));
        assert!(lines[2].contains("import-error"));
        assert_eq!(lines[3], "     repaired: calc.py");
        assert!(lines[4].contains("passed (0/2 failed)"));
        assert_eq!(lines[5], "run b");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_requirement_is_trimmed_and_required() {
        let args = RunArgs {
            requirement: Some("  Build a calculator \n".into()),
            ..RunArgs::default()
        };
        assert_eq!(read_requirement(&args).unwrap(), "Build a calculator");

        let args = RunArgs {
            requirement: Some("   ".into()),
            ..RunArgs::default()
        };
        let err = read_requirement(&args).unwrap_err();
        assert!(err.downcast_ref::<ForgeError>().is_some());
    }

    #[test]
    fn test_requirement_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("req.txt");
        std::fs::write(&path, "Build an adder\n").unwrap();
        let args = RunArgs {
            requirement_file: Some(path),
            ..RunArgs::default()
        };
        assert_eq!(read_requirement(&args).unwrap(), "Build an adder");
    }

    #[test]
    fn test_interactive_needs_explicit_requirement() {
        let args = RunArgs {
            interactive: true,
            ..RunArgs::default()
        };
        assert!(read_requirement(&args).is_err());
    }
}
