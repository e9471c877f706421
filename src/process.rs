//! Structured subprocess execution.
//!
//! Commands are built as an argument vector and run without a shell, so paths
//! and version strings are never re-parsed. Every call blocks until the child
//! exits; the exit status is the only success signal.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{BuildError, Result};

/// A command to run: program, arguments, working directory and extra env.
///
/// Program and arguments are kept as `OsString` so non-UTF-8 paths reach the
/// child byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Prefix this command with another, e.g. `sudo`.
    ///
    /// An empty prefix returns the command unchanged.
    pub fn wrapped_in(self, prefix: &[String]) -> Self {
        let Some((program, rest)) = prefix.split_first() else {
            return self;
        };
        let mut args: Vec<OsString> = rest.iter().map(OsString::from).collect();
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: OsString::from(program),
            args,
            cwd: self.cwd,
            env: self.env,
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// What a finished command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: output.into(),
            stderr: String::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs commands. The pipeline only talks to processes through this trait,
/// so tests can substitute a scripted runner.
pub trait CommandRunner {
    /// Run `spec` to completion. `Err` means the child could not be started.
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Runs real processes with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let output = cmd.output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run a command and require exit code 0.
pub fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<CommandOutput> {
    tracing::debug!("running: {spec}");
    let output = runner
        .run(spec)
        .map_err(|err| BuildError::ExternalCommandFailed {
            command: spec.to_string(),
            exit_code: None,
            output: format!(
                "failed to start '{}': {err}",
                spec.program.to_string_lossy()
            ),
        })?;

    if output.succeeded() {
        return Ok(output);
    }

    Err(BuildError::ExternalCommandFailed {
        command: spec.to_string(),
        exit_code: output.code,
        output: output.combined(),
    })
}

/// Run a command and return its stdout with line breaks removed.
pub fn capture_line(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<String> {
    let output = run_checked(runner, spec)?;
    Ok(output.stdout.replace(['\n', '\r'], ""))
}
