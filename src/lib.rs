//! autodeploy - detect a web project, pick a host, deploy it
//!
//! This library inspects a project directory, recommends a hosting platform
//! (optionally asking a local model), makes sure the platform CLI is present,
//! builds the project and drives the deployment, recording every step in a
//! [`RunReport`].

pub mod advisor;
pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod operator;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod project;
pub mod report;
pub mod scaffold;
pub mod tooling;

pub use error::{Error, Result};

pub use advisor::{
    fallback_choice, AdviceRequest, AdvisoryOracle, ChoiceSource, OllamaOracle, PlatformAdvisor,
    PlatformChoice,
};
pub use build::{BuildCoordinator, BuildFailure, BuildResult};
pub use config::{
    AdvisorConfig, BuildConfig, BuildFailurePolicy, DeployConfig, PipelineConfig, ReportConfig,
    ToolsConfig, Validate, ValidationResult,
};
pub use deploy::{
    DeployAttempt, DeployOutcome, DeployStrategy, DeploymentCoordinator, DeploymentResult,
};
pub use operator::{Cancellation, Confirmation, Operator, ScriptedOperator, TerminalOperator};
pub use orchestrator::DeploymentOrchestrator;
pub use platform::{DeployMode, Platform};
pub use process::{CommandRunner, CommandSpec, ProcessOutput, ScriptedRunner, SystemRunner};
pub use project::{ProjectInspector, ProjectKind, ProjectProfile};
pub use report::{AbortReason, RunReport, RunState, Terminal, Transition};
pub use scaffold::{ScaffoldOutcome, ScaffoldRecord};
pub use tooling::{InstallOutcome, ToolAvailabilityChecker, ToolStatus};
