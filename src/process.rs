//! External process execution.
//!
//! Every third-party CLI the pipeline drives (npm, vercel, netlify,
//! wrangler, git) goes through the [`CommandRunner`] seam so stages can be
//! exercised without touching the real tools.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{Error, Result};

/// A single external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory, inherited from the process when absent.
    pub working_dir: Option<PathBuf>,
    /// Upper bound on run time. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Inherit the terminal instead of capturing output.
    pub interactive: bool,
}

impl CommandSpec {
    /// Creates a captured, untimed command.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            timeout: None,
            interactive: false,
        }
    }

    /// Sets the working directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets a timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs the command attached to the operator's terminal.
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// The command line as the operator would type it.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of an external process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code, absent when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ProcessOutput {
    /// A zero-exit output with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A non-zero exit with the given stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the process exited with status zero.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Trait for running external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion.
    ///
    /// Returns [`Error::ToolNotFound`] when the executable is missing. A
    /// non-zero exit is not an error; it is reported in [`ProcessOutput`].
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    /// Creates a new system runner.
    pub fn new() -> Self {
        Self
    }

    fn build_command(spec: &CommandSpec) -> Command {
        // npm-installed CLIs are .cmd shims on Windows and need the shell to resolve.
        let mut command = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&spec.program);
            cmd
        } else {
            Command::new(&spec.program)
        };
        command.args(&spec.args);

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        if spec.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        // Dropping the future (timeout or cancellation) must not leave the child running.
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        tracing::debug!(
            command = %spec.command_line(),
            working_dir = ?spec.working_dir,
            interactive = spec.interactive,
            "running command"
        );

        let child = Self::build_command(spec).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound(spec.program.clone())
            } else {
                Error::Process(format!("failed to spawn {}: {}", spec.program, e))
            }
        })?;

        let wait = child.wait_with_output();
        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                Error::Process(format!(
                    "`{}` timed out after {}s",
                    spec.command_line(),
                    limit.as_secs()
                ))
            })?,
            None => wait.await,
        }
        .map_err(|e| Error::Process(format!("failed to wait for {}: {}", spec.program, e)))?;

        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        tracing::debug!(
            command = %spec.command_line(),
            exit_code = ?result.exit_code,
            "command finished"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Output(ProcessOutput),
    Missing,
}

/// Deterministic runner that replays canned responses.
///
/// Responses are keyed by [`CommandSpec::command_line`]. Queued responses
/// are consumed in order; the last one repeats. Commands with nothing
/// scripted behave as if their executable were not installed.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Creates a runner with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an output for a command line.
    pub fn on(self, command_line: impl Into<String>, output: ProcessOutput) -> Self {
        self.push(command_line, Scripted::Output(output));
        self
    }

    /// Makes a command line fail as if its executable were missing.
    pub fn missing(self, command_line: impl Into<String>) -> Self {
        self.push(command_line, Scripted::Missing);
        self
    }

    fn push(&self, command_line: impl Into<String>, response: Scripted) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(command_line.into())
            .or_default()
            .push_back(response);
    }

    /// Command lines invoked so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.invocations().iter().map(CommandSpec::command_line).collect()
    }

    /// Full invocations so far, in order.
    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of times a command line was invoked.
    pub fn count(&self, command_line: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == command_line).count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        let line = spec.command_line();
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let response = {
            let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            match responses.get_mut(&line) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Missing) | None => Err(Error::ToolNotFound(spec.program.clone())),
        }
    }
}
