//! # Test Runner
//!
//! Runs the user's test command (everything after `--` on the command line)
//! and reports the exit code and output. A failing test is not an error
//! here; only a command that cannot be started is.

use crate::error::{self, Result};
use std::path::Path;
use tokio::process::Command;

/// Replaced with the path of the file under test
pub const FILE_PLACEHOLDER: &str = "__FILE__";

/// A test command argv, e.g. `["npx", "vitest", "run", "__FILE__"]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    program: String,
    args: Vec<String>,
}

impl TestCommand {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        let mut iter = argv.into_iter();
        let program = iter
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| error::invalid_argument("test command is empty"))?;
        Ok(Self {
            program,
            args: iter.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with the placeholder substituted by `target`
    pub fn args_for(&self, target: &Path) -> Vec<String> {
        let target = target.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, &target))
            .collect()
    }

    pub fn display_for(&self, target: &Path) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args_for(target))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Outcome of one test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Text to hand back to the model when the test failed
    pub fn failure_text(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            self.stderr.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    cwd: Option<std::path::PathBuf>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<std::path::PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Run `program args...` to completion
    pub async fn run(&self, program: &str, args: &[String]) -> Result<TestReport> {
        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| error::spawn_failed(program, e).with_operation("test_runner::run"))?;

        // killed by a signal: report like a shell would
        let exit_code = output.status.code().unwrap_or(-1);
        let report = TestReport {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(program, exit_code, "test command finished");
        Ok(report)
    }

    /// Run a test command against `target`
    pub async fn run_for(&self, command: &TestCommand, target: &Path) -> Result<TestReport> {
        self.run(command.program(), &command.args_for(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_placeholder_substitution() {
        let cmd = TestCommand::new(argv(&["deno", "test", "-A", "__FILE__"])).unwrap();
        let target = PathBuf::from("/tmp/button.__previs__.tsx");
        assert_eq!(cmd.program(), "deno");
        assert_eq!(
            cmd.args_for(&target),
            argv(&["test", "-A", "/tmp/button.__previs__.tsx"])
        );
        assert_eq!(
            cmd.display_for(&target),
            "deno test -A /tmp/button.__previs__.tsx"
        );
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(TestCommand::new(vec![]).is_err());
        assert!(TestCommand::new(argv(&[""])).is_err());
    }

    #[tokio::test]
    async fn test_failing_command_is_a_report_not_an_error() {
        let report = TestRunner::new()
            .run("sh", &argv(&["-c", "echo boom >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(report.exit_code, 3);
        assert!(!report.passed());
        assert_eq!(report.failure_text().trim(), "boom");
    }

    #[tokio::test]
    async fn test_run_for_substitutes_target() {
        let cmd = TestCommand::new(argv(&["sh", "-c", "echo $0", "__FILE__"])).unwrap();
        let report = TestRunner::new()
            .run_for(&cmd, Path::new("card.tsx"))
            .await
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.stdout.trim(), "card.tsx");
    }

    #[tokio::test]
    async fn test_missing_program_is_process_failure() {
        let err = TestRunner::new()
            .run("previs-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ProcessFailed);
    }
}
