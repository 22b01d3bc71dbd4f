//! Dependency install and build steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::project::ProjectProfile;

/// Why a build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildFailure {
    /// Installed packages are missing; recoverable by installing them.
    MissingDependencies,
    /// The manifest has no build script.
    MissingScript,
    /// The build tool itself is not installed.
    ToolMissing,
    /// Anything else.
    Other,
}

const MISSING_DEPENDENCY_SIGNATURES: &[&str] = &[
    "command not found",
    "not recognized",
    "cannot find module",
    "module not found",
    "err_module_not_found",
    "could not resolve",
];

/// Classifies failed build output.
pub fn classify_failure(output: &ProcessOutput) -> BuildFailure {
    let text = output.combined().to_lowercase();
    if text.contains("missing script") {
        BuildFailure::MissingScript
    } else if MISSING_DEPENDENCY_SIGNATURES.iter().any(|s| text.contains(s)) {
        BuildFailure::MissingDependencies
    } else {
        BuildFailure::Other
    }
}

/// Outcome of the build stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Whether a build was run at all.
    pub attempted: bool,
    /// Whether the final build attempt succeeded.
    pub succeeded: bool,
    /// Whether dependencies were installed and the build retried.
    pub retried: bool,
    /// Captured stdout of every step, in order.
    pub stdout: String,
    /// Captured stderr of every step, in order.
    pub stderr: String,
    /// Classification of the final failure.
    pub failure: Option<BuildFailure>,
}

impl BuildResult {
    /// Result for a project without a build step.
    pub fn skipped() -> Self {
        Self::default()
    }

    fn append(&mut self, step: &str, output: &ProcessOutput) {
        for (buffer, text) in [(&mut self.stdout, &output.stdout), (&mut self.stderr, &output.stderr)] {
            if text.is_empty() {
                continue;
            }
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(&format!("$ {}\n{}", step, text.trim_end()));
        }
    }
}

/// Runs install and build commands for a project.
///
/// At most one dependency-install retry happens per coordinator, and a
/// coordinator lives for one pipeline run.
pub struct BuildCoordinator {
    runner: Arc<dyn CommandRunner>,
    install_used: AtomicBool,
}

impl BuildCoordinator {
    /// Creates a coordinator.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            install_used: AtomicBool::new(false),
        }
    }

    fn build_command(profile: &ProjectProfile) -> CommandSpec {
        CommandSpec::new("npm", ["run", "build"]).in_dir(&profile.root)
    }

    fn install_command(profile: &ProjectProfile) -> CommandSpec {
        CommandSpec::new("npm", ["install"]).in_dir(&profile.root)
    }

    /// Runs one step, folding a missing executable into a synthetic output.
    async fn run_step(&self, spec: &CommandSpec) -> Result<ProcessOutput, BuildFailure> {
        match self.runner.run(spec).await {
            Ok(output) => Ok(output),
            Err(Error::ToolNotFound(program)) => {
                tracing::warn!(program = %program, "build tool not installed");
                Err(BuildFailure::ToolMissing)
            }
            Err(e) => {
                tracing::warn!(command = %spec.command_line(), error = %e, "build step errored");
                Ok(ProcessOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }

    /// Builds the project.
    ///
    /// No-op for project kinds without a build step. A failure caused by
    /// missing packages triggers one `npm install` and one rebuild; every
    /// other failure is final.
    pub async fn build(&self, profile: &ProjectProfile) -> BuildResult {
        if !profile.kind.requires_build() {
            tracing::info!(kind = ?profile.kind, "no build step required");
            return BuildResult::skipped();
        }

        let mut result = BuildResult {
            attempted: true,
            ..BuildResult::default()
        };
        let build = Self::build_command(profile);

        loop {
            tracing::info!(command = %build.command_line(), root = ?profile.root, "building project");
            let output = match self.run_step(&build).await {
                Ok(output) => output,
                Err(failure) => {
                    result.failure = Some(failure);
                    if !result.stderr.is_empty() {
                        result.stderr.push('\n');
                    }
                    result.stderr.push_str(&format!(
                        "`{}` could not be started: executable not found",
                        build.program
                    ));
                    return result;
                }
            };
            result.append(&build.command_line(), &output);

            if output.succeeded() {
                tracing::info!(retried = result.retried, "build succeeded");
                result.succeeded = true;
                result.failure = None;
                return result;
            }

            let failure = classify_failure(&output);
            result.failure = Some(failure);
            tracing::warn!(failure = ?failure, exit_code = ?output.exit_code, "build failed");

            if failure != BuildFailure::MissingDependencies
                || self.install_used.swap(true, Ordering::SeqCst)
            {
                return result;
            }

            result.retried = true;
            let install = Self::install_command(profile);
            tracing::info!(command = %install.command_line(), "installing dependencies before retry");
            match self.run_step(&install).await {
                Ok(output) => {
                    result.append(&install.command_line(), &output);
                    if !output.succeeded() {
                        tracing::warn!(exit_code = ?output.exit_code, "dependency install failed");
                        return result;
                    }
                }
                Err(failure) => {
                    result.failure = Some(failure);
                    return result;
                }
            }
        }
    }
}
