//! External command templates and child-process plumbing shared by the
//! renderer and browser adapters.

use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

/// Lines of child output kept for diagnostics.
pub const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// An executable plus an argument list containing `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// True when some argument equals `flag` or starts with `flag=`.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| {
            arg == flag
                || arg
                    .strip_prefix(flag)
                    .is_some_and(|rest| rest.starts_with('='))
        })
    }

    /// Insert `arg` before the final argument, or push it when there is none.
    pub fn with_arg_before_last(mut self, arg: impl Into<String>) -> Self {
        let index = self.args.len().saturating_sub(1);
        self.args.insert(index, arg.into());
        self
    }

    /// Substitute every `{name}` occurrence; unknown placeholders are kept.
    pub fn expand(&self, values: &[(&str, &str)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                values.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect()
    }

    /// Build a ready-to-spawn command with stdin closed and output captured.
    pub fn command(&self, values: &[(&str, &str)]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.expand(values))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Outcome of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Tail of stderr, falling back to stdout when stderr is empty.
    pub fn diagnostics(&self) -> String {
        let stderr = tail(&self.stderr, DIAGNOSTIC_TAIL_LINES);
        if stderr.is_empty() {
            tail(&self.stdout, DIAGNOSTIC_TAIL_LINES)
        } else {
            stderr
        }
    }
}

/// Run `command` to completion. Dropping the future kills the child.
pub async fn run_process(mut command: Command) -> io::Result<ProcessOutput> {
    let output = command.output().await?;
    Ok(ProcessOutput {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// The last `lines` non-empty lines of `text`.
pub fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}
