use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command as TokioCommand;

// ============================================================================
// CommandSpec - argv-style process description
// ============================================================================

/// Specification for a command to execute.
///
/// Arguments are kept as discrete `OsString` elements and are never joined
/// into a shell string, so harness arguments coming from configuration
/// cannot be reinterpreted by a shell.
///
/// # Example
///
/// ```rust
/// use forgeloop_runner::CommandSpec;
/// use std::ffi::OsString;
///
/// let cmd = CommandSpec::new("python")
///     .args(["-m", "pytest", "tests"])
///     .cwd("/tmp/workspace")
///     .env("PYTHONPATH", "code");
///
/// assert_eq!(cmd.program, OsString::from("python"));
/// assert_eq!(cmd.args.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements
    pub args: Vec<OsString>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides, applied on top of the inherited environment
    pub env: BTreeMap<OsString, OsString>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Human-readable rendering used in logs. Not meant to be re-parsed.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    /// Build a `tokio::process::Command` using argv-style APIs only.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_args_and_env() {
        let cmd = CommandSpec::new("python")
            .arg("-m")
            .args(["pytest", "-v"])
            .env("A", "1")
            .env("B", "2")
            .cwd("/work");

        assert_eq!(cmd.args.len(), 3);
        assert_eq!(cmd.env.len(), 2);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/work")));
    }

    #[test]
    fn test_metacharacters_stay_single_arguments() {
        let cmd = CommandSpec::new("echo").arg("a; rm -rf /").arg("$(whoami)");
        assert_eq!(cmd.args.len(), 2);
        assert_eq!(cmd.args[0], OsString::from("a; rm -rf /"));
    }

    #[test]
    fn test_display_joins_program_and_args() {
        let cmd = CommandSpec::new("python").args(["-m", "pytest"]);
        assert_eq!(cmd.display(), "python -m pytest");
    }
}
