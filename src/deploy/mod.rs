//! Deployment strategies and the coordinator that dispatches to them.
//!
//! Each platform resolves once to a [`DeployStrategy`]: automated
//! strategies drive the platform CLI, manual strategies only emit
//! instructions. Which one runs depends on the platform alone.

mod automated;
mod manual;

pub use automated::{extract_url, AuthState, AutomatedStrategy};
pub use manual::ManualStrategy;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::build::BuildResult;
use crate::config::DeployConfig;
use crate::platform::{DeployMode, Platform};
use crate::process::{CommandRunner, CommandSpec};
use crate::project::ProjectProfile;
use crate::scaffold::{self, ScaffoldRecord};

/// Build output folders, in preference order.
pub const PUBLISH_DIRS: &[&str] = &["dist", "build", "out"];

/// The folder a static deploy should publish, relative to the root.
pub fn publish_dir(root: &Path) -> String {
    PUBLISH_DIRS
        .iter()
        .find(|dir| root.join(dir).is_dir())
        .map(|dir| dir.to_string())
        .unwrap_or_else(|| ".".to_string())
}

/// Outcome of the deployment stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Target platform.
    pub platform: Platform,
    /// Automated or manual; fixed by the platform.
    pub mode: DeployMode,
    /// For automated platforms, whether the deploy command succeeded. For
    /// manual platforms, whether instructions were generated.
    pub succeeded: bool,
    /// Live URL, when one was recognized in the output.
    pub url: Option<String>,
    /// Manual steps for the operator.
    pub instructions: Option<String>,
    /// Combined output of the deploy command.
    pub raw_output: String,
}

/// What a deploy attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The strategy ran to completion, successfully or not.
    Completed(DeploymentResult),
    /// The platform CLI is not logged in; nothing was deployed.
    AuthRequired {
        /// Platform needing authentication.
        platform: Platform,
        /// Command that logs the operator in.
        login: CommandSpec,
    },
}

/// A deploy attempt together with the files prepared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAttempt {
    /// Platform config files written or checked before deploying.
    pub scaffold: Vec<ScaffoldRecord>,
    /// What the strategy reported.
    pub outcome: DeployOutcome,
}

/// How a platform is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStrategy {
    /// Through the platform CLI.
    Automated(AutomatedStrategy),
    /// Through operator instructions.
    Manual(ManualStrategy),
}

impl DeployStrategy {
    /// Resolves the strategy for a platform.
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform.deploy_mode() {
            DeployMode::Automated => AutomatedStrategy::for_platform(platform).map(Self::Automated),
            DeployMode::Manual => ManualStrategy::for_platform(platform).map(Self::Manual),
        }
    }

    /// Deploy mode of this strategy.
    pub fn mode(&self) -> DeployMode {
        match self {
            Self::Automated(_) => DeployMode::Automated,
            Self::Manual(_) => DeployMode::Manual,
        }
    }
}

/// Executes the deployment strategy for the chosen platform.
pub struct DeploymentCoordinator {
    runner: Arc<dyn CommandRunner>,
    strategies: BTreeMap<Platform, DeployStrategy>,
    auth_timeout: Duration,
    overwrite_platform_config: bool,
}

impl DeploymentCoordinator {
    /// Creates a coordinator with one strategy per known platform.
    pub fn new(runner: Arc<dyn CommandRunner>, config: &DeployConfig) -> Self {
        let strategies = Platform::ALL
            .iter()
            .filter_map(|p| DeployStrategy::for_platform(*p).map(|s| (*p, s)))
            .collect();
        Self {
            runner,
            strategies,
            auth_timeout: config.auth_timeout(),
            overwrite_platform_config: config.overwrite_platform_config,
        }
    }

    /// Strategy registered for a platform.
    pub fn strategy(&self, platform: Platform) -> Option<&DeployStrategy> {
        self.strategies.get(&platform)
    }

    /// Deploys `profile` to `platform`.
    ///
    /// Platform config files are written first. Manual platforms never run
    /// a process.
    pub async fn deploy(
        &self,
        platform: Platform,
        profile: &ProjectProfile,
        build: Option<&BuildResult>,
    ) -> DeployAttempt {
        if let Some(build) = build.filter(|b| b.attempted && !b.succeeded) {
            tracing::warn!(platform = ?platform, failure = ?build.failure, "deploying without a successful build");
        }

        let scaffold = match scaffold::prepare(profile, platform, self.overwrite_platform_config) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(platform = ?platform, error = %e, "could not write platform config");
                return DeployAttempt {
                    scaffold: Vec::new(),
                    outcome: DeployOutcome::Completed(DeploymentResult {
                        platform,
                        mode: platform.deploy_mode(),
                        succeeded: false,
                        url: None,
                        instructions: None,
                        raw_output: format!("failed to write platform config: {}", e),
                    }),
                };
            }
        };

        let outcome = match self.strategies.get(&platform) {
            Some(DeployStrategy::Automated(strategy)) => {
                strategy
                    .deploy(self.runner.as_ref(), profile, self.auth_timeout)
                    .await
            }
            Some(DeployStrategy::Manual(strategy)) => {
                DeployOutcome::Completed(strategy.deploy(profile))
            }
            None => DeployOutcome::Completed(DeploymentResult {
                platform,
                mode: platform.deploy_mode(),
                succeeded: false,
                url: None,
                instructions: None,
                raw_output: format!("no deployment strategy for {}", platform),
            }),
        };

        DeployAttempt { scaffold, outcome }
    }

    /// Runs a login command attached to the operator's terminal.
    ///
    /// Returns true if it exited successfully.
    pub async fn login(&self, login: &CommandSpec) -> bool {
        tracing::info!(command = %login.command_line(), "running platform login");
        match self.runner.run(login).await {
            Ok(output) => output.succeeded(),
            Err(e) => {
                tracing::warn!(command = %login.command_line(), error = %e, "login failed to run");
                false
            }
        }
    }
}
