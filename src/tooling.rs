//! Platform CLI availability.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::operator::{Confirmation, Operator};
use crate::platform::{InstallMethod, Platform};
use crate::process::CommandRunner;

/// Availability of a platform's CLI at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Platform probed.
    pub platform: Platform,
    /// Whether the CLI answered its version query.
    pub installed: bool,
    /// First line of the version output.
    pub version: Option<String>,
    /// Suggested install command or location.
    pub install_hint: Option<String>,
}

/// How the operator left an install step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The operator says installation is done.
    Completed,
    /// The operator gave up.
    Cancelled,
}

/// Probes and installs platform CLIs.
pub struct ToolAvailabilityChecker {
    runner: Arc<dyn CommandRunner>,
    probe_timeout: Duration,
}

impl ToolAvailabilityChecker {
    /// Creates a checker.
    pub fn new(runner: Arc<dyn CommandRunner>, probe_timeout: Duration) -> Self {
        Self {
            runner,
            probe_timeout,
        }
    }

    /// Runs the platform CLI's version query.
    pub async fn check(&self, platform: Platform) -> ToolStatus {
        let Some(tool) = platform.tool() else {
            return ToolStatus {
                platform,
                installed: true,
                version: None,
                install_hint: None,
            };
        };

        let install_hint = Some(tool.install.describe());
        let spec = tool.version_command(self.probe_timeout);

        match self.runner.run(&spec).await {
            Ok(output) if output.succeeded() => {
                let version = output
                    .stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string);
                tracing::info!(platform = ?platform, binary = tool.binary, version = ?version, "platform CLI available");
                ToolStatus {
                    platform,
                    installed: true,
                    version,
                    install_hint,
                }
            }
            Ok(output) => {
                tracing::warn!(binary = tool.binary, exit_code = ?output.exit_code, "version query failed");
                ToolStatus {
                    platform,
                    installed: false,
                    version: None,
                    install_hint,
                }
            }
            Err(e) => {
                match e {
                    Error::ToolNotFound(_) => {
                        tracing::warn!(binary = tool.binary, "platform CLI not installed")
                    }
                    other => {
                        tracing::warn!(binary = tool.binary, error = %other, "version query errored")
                    }
                }
                ToolStatus {
                    platform,
                    installed: false,
                    version: None,
                    install_hint,
                }
            }
        }
    }

    /// Installs the platform CLI with the operator in the loop.
    ///
    /// Blocks until the operator confirms completion or gives up. Does not
    /// verify the result; callers re-run [`check`](Self::check).
    pub async fn install_interactively(
        &self,
        platform: Platform,
        operator: &dyn Operator,
    ) -> InstallOutcome {
        let Some(tool) = platform.tool() else {
            return InstallOutcome::Completed;
        };

        match &tool.install {
            InstallMethod::Command(spec) => {
                let prompt = format!(
                    "{} CLI `{}` is not installed. Install it with `{}`?",
                    platform,
                    tool.binary,
                    spec.command_line()
                );
                if operator.confirm(&prompt).await == Confirmation::Declined {
                    return InstallOutcome::Cancelled;
                }

                tracing::info!(command = %spec.command_line(), "installing platform CLI");
                match self.runner.run(&spec.clone().interactive()).await {
                    Ok(output) if output.succeeded() => {}
                    Ok(output) => {
                        operator
                            .inform(&format!(
                                "`{}` exited with {:?}; finish the installation manually if needed.",
                                spec.command_line(),
                                output.exit_code
                            ))
                            .await
                    }
                    Err(e) => {
                        operator
                            .inform(&format!("Could not run `{}`: {}", spec.command_line(), e))
                            .await
                    }
                }
            }
            InstallMethod::Manual(location) => {
                operator
                    .inform(&format!(
                        "{} requires `{}`, which must be installed manually from {}. Restart your terminal afterwards if needed.",
                        platform, tool.binary, location
                    ))
                    .await;
            }
        }

        let prompt = format!("Continue once `{}` is installed?", tool.binary);
        match operator.confirm(&prompt).await {
            Confirmation::Confirmed => InstallOutcome::Completed,
            Confirmation::Declined => InstallOutcome::Cancelled,
        }
    }
}
