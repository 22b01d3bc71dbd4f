//! The deployment pipeline state machine.
//!
//! Stages run strictly in sequence:
//!
//! ```text
//! Detecting -> Recommending -> CheckingTool <-> InstallingTool
//!           -> Building -> Deploying <-> Authenticating -> Reporting -> Done | Aborted
//! ```
//!
//! Every stage returns a value that encodes its own failure; this module
//! decides whether a failure is absorbed, retried or escalated to
//! `Aborted`. Each stage also races the operator's interrupt.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use crate::advisor::{PlatformAdvisor, PlatformChoice};
use crate::build::{BuildCoordinator, BuildResult};
use crate::config::{BuildFailurePolicy, PipelineConfig};
use crate::deploy::{DeployOutcome, DeploymentCoordinator, DeploymentResult};
use crate::operator::{Cancellation, Confirmation, Operator};
use crate::platform::Platform;
use crate::process::CommandRunner;
use crate::project::{sanitize_project_name, ProjectInspector, ProjectKind, ProjectProfile};
use crate::report::{AbortReason, RunReport, RunState, Terminal};
use crate::tooling::{InstallOutcome, ToolAvailabilityChecker};

/// Sequences the pipeline stages for one project.
pub struct DeploymentOrchestrator {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    operator: Arc<dyn Operator>,
    inspector: ProjectInspector,
    advisor: PlatformAdvisor,
    checker: ToolAvailabilityChecker,
    deployer: DeploymentCoordinator,
    cancellation: Cancellation,
}

impl DeploymentOrchestrator {
    /// Creates an orchestrator. The advisor follows `config.advisor`.
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn CommandRunner>,
        operator: Arc<dyn Operator>,
    ) -> Self {
        let advisor = PlatformAdvisor::from_config(&config.advisor);
        let checker = ToolAvailabilityChecker::new(runner.clone(), config.tools.probe_timeout());
        let deployer = DeploymentCoordinator::new(runner.clone(), &config.deploy);
        Self {
            config,
            runner,
            operator,
            inspector: ProjectInspector::new(),
            advisor,
            checker,
            deployer,
            cancellation: Cancellation::never(),
        }
    }

    /// Replaces the platform advisor.
    pub fn with_advisor(mut self, advisor: PlatformAdvisor) -> Self {
        self.advisor = advisor;
        self
    }

    /// Makes the run interruptible.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Inspects the project and recommends a platform without deploying.
    pub async fn detect(&self, root: impl AsRef<Path>) -> (ProjectProfile, PlatformChoice) {
        let profile = self.inspector.inspect(root);
        let choice = self.advisor.recommend(&profile).await;
        (profile, choice)
    }

    /// Runs the whole pipeline and returns its report.
    ///
    /// Never fails: aborts and stage failures are recorded in the report.
    pub async fn run(&self, root: impl AsRef<Path>) -> RunReport {
        let root = root.as_ref();
        let mut report = RunReport::new(root);
        tracing::info!(run_id = %report.run_id, root = ?root, "starting deployment run");

        let outcome = self.drive(root, &mut report).await;
        report.transition(RunState::Reporting, None);
        report.finish(outcome);

        if self.config.report.write_json {
            self.save_report(root, &report);
        }

        tracing::info!(run_id = %report.run_id, outcome = ?report.outcome, "deployment run finished");
        report
    }

    /// Persists the report under `<report dir>/<project slug>/`.
    ///
    /// Refuses any directory inside the project, where a later deploy could
    /// publish it.
    fn save_report(&self, root: &Path, report: &RunReport) {
        let Some(base) = self.config.report.resolve_dir() else {
            tracing::warn!(run_id = %report.run_id, "no report directory available, report not saved");
            return;
        };
        let slug = report
            .profile
            .as_ref()
            .map(ProjectProfile::slug)
            .unwrap_or_else(|| {
                sanitize_project_name(&root.file_name().unwrap_or_default().to_string_lossy())
            });
        let dir = base.join(slug);
        if is_within(&dir, root) {
            tracing::warn!(
                run_id = %report.run_id,
                dir = ?dir,
                "report directory is inside the project, report not saved"
            );
            return;
        }
        if let Err(e) = report.save(&dir) {
            tracing::warn!(run_id = %report.run_id, error = %e, "failed to save run report");
        }
    }

    /// Awaits `stage` unless the operator interrupts first.
    async fn guard<F: Future>(&self, stage: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            output = stage => Some(output),
        }
    }

    fn interrupted(&self, report: &mut RunReport) -> Terminal {
        let stage = report.state;
        report.interrupted_stage = Some(stage);
        report.warn(format!("run interrupted during {}", stage));
        Terminal::Aborted {
            reason: AbortReason::Cancelled,
        }
    }

    async fn drive(&self, root: &Path, report: &mut RunReport) -> Terminal {
        if self.cancellation.is_cancelled() {
            return self.interrupted(report);
        }
        let profile = self.inspector.inspect(root);
        report.profile = Some(profile.clone());

        report.transition(RunState::Recommending, Some(profile.kind.to_string()));
        let Some(choice) = self.guard(self.advisor.recommend(&profile)).await else {
            return self.interrupted(report);
        };
        if profile.kind == ProjectKind::Unknown {
            report.warn(format!(
                "no recognizable project found; using {} with no build step",
                choice.platform
            ));
        }
        let platform = choice.platform;
        report.choice = Some(choice);

        if let Some(abort) = self.ensure_tool(report).await {
            return abort;
        }

        let build = if profile.kind.requires_build() {
            report.transition(RunState::Building, None);
            let builder = BuildCoordinator::new(self.runner.clone());
            let Some(result) = self.guard(builder.build(&profile)).await else {
                report.build = Some(BuildResult {
                    attempted: true,
                    ..BuildResult::default()
                });
                return self.interrupted(report);
            };
            report.build = Some(result.clone());
            Some(result)
        } else {
            None
        };

        if let Some(failed) = build.as_ref().filter(|b| !b.succeeded) {
            let failure = failed
                .failure
                .map(|f| format!("{:?}", f))
                .unwrap_or_else(|| "unknown".to_string());
            match self.config.build.failure_policy {
                BuildFailurePolicy::Suppress => {
                    report.warn(format!(
                        "build failed ({}); deployment suppressed by policy",
                        failure
                    ));
                    return Terminal::Done;
                }
                BuildFailurePolicy::Proceed => {
                    let message = format!(
                        "build failed ({}); deploying to {} anyway",
                        failure, platform
                    );
                    self.operator.inform(&message).await;
                    report.warn(message);
                }
            }
        }

        self.deploy(platform, &profile, build.as_ref(), report).await
    }

    /// Checks the platform CLI, looping through installs until it is
    /// present. Returns the terminal outcome if the run must stop.
    async fn ensure_tool(&self, report: &mut RunReport) -> Option<Terminal> {
        let platform = report.choice.as_ref()?.platform;
        let mut installs = 0;
        loop {
            report.transition(RunState::CheckingTool, Some(platform.to_string()));
            let Some(status) = self.guard(self.checker.check(platform)).await else {
                return Some(self.interrupted(report));
            };
            report.tool_checks += 1;
            let installed = status.installed;
            report.tool = Some(status);
            if installed {
                return None;
            }

            if installs >= self.config.tools.max_rechecks {
                report.warn(format!(
                    "{} CLI still missing after {} install attempt(s)",
                    platform, installs
                ));
                return Some(Terminal::Aborted {
                    reason: AbortReason::ToolUnavailable,
                });
            }
            installs += 1;

            report.transition(RunState::InstallingTool, None);
            match self
                .guard(
                    self.checker
                        .install_interactively(platform, self.operator.as_ref()),
                )
                .await
            {
                None => return Some(self.interrupted(report)),
                Some(InstallOutcome::Cancelled) => {
                    return Some(Terminal::Aborted {
                        reason: AbortReason::Cancelled,
                    })
                }
                Some(InstallOutcome::Completed) => {}
            }
        }
    }

    async fn deploy(
        &self,
        platform: Platform,
        profile: &ProjectProfile,
        build: Option<&BuildResult>,
        report: &mut RunReport,
    ) -> Terminal {
        let mut logins = 0;
        loop {
            report.transition(RunState::Deploying, Some(platform.to_string()));
            let Some(attempt) = self.guard(self.deployer.deploy(platform, profile, build)).await
            else {
                report.deployment = Some(DeploymentResult {
                    platform,
                    mode: platform.deploy_mode(),
                    succeeded: false,
                    url: None,
                    instructions: None,
                    raw_output: "interrupted".to_string(),
                });
                return self.interrupted(report);
            };
            if report.scaffold.is_empty() {
                report.scaffold = attempt.scaffold;
            }

            match attempt.outcome {
                DeployOutcome::Completed(result) => {
                    if !result.succeeded {
                        report.warn(format!("deployment to {} failed", platform));
                    }
                    report.deployment = Some(result);
                    return Terminal::Done;
                }
                DeployOutcome::AuthRequired { platform, login } => {
                    if logins >= self.config.deploy.max_auth_attempts {
                        report.warn(format!("{} CLI is not logged in", platform));
                        return Terminal::Aborted {
                            reason: AbortReason::AuthenticationRequired,
                        };
                    }
                    logins += 1;

                    report.transition(RunState::Authenticating, Some(login.command_line()));
                    let prompt = format!(
                        "{} CLI is not logged in. Run `{}` now?",
                        platform,
                        login.command_line()
                    );
                    match self.guard(self.operator.confirm(&prompt)).await {
                        None => return self.interrupted(report),
                        Some(Confirmation::Declined) => {
                            return Terminal::Aborted {
                                reason: AbortReason::Cancelled,
                            }
                        }
                        Some(Confirmation::Confirmed) => {}
                    }
                    match self.guard(self.deployer.login(&login)).await {
                        None => return self.interrupted(report),
                        Some(false) => report.warn(format!("`{}` did not succeed", login.command_line())),
                        Some(true) => {}
                    }
                }
            }
        }
    }
}

/// True when `path` lies inside `root`, after resolving symlinks on the
/// part of `path` that already exists.
fn is_within(path: &Path, root: &Path) -> bool {
    let (Ok(root), Ok(mut existing)) = (root.canonicalize(), std::path::absolute(path)) else {
        return false;
    };
    let mut missing = Vec::new();
    while !existing.exists() {
        let Some(name) = existing.file_name().map(|n| n.to_os_string()) else {
            break;
        };
        missing.push(name);
        if !existing.pop() {
            break;
        }
    }
    let mut resolved = existing.canonicalize().unwrap_or(existing);
    resolved.extend(missing.into_iter().rev());
    resolved.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::ScriptedOperator;
    use crate::process::{ProcessOutput, ScriptedRunner};
    use tempfile::TempDir;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.advisor.enabled = false;
        config.report.write_json = false;
        config
    }

    fn orchestrator(
        config: PipelineConfig,
        runner: ScriptedRunner,
        answers: Vec<Confirmation>,
    ) -> (DeploymentOrchestrator, Arc<ScriptedRunner>, Arc<ScriptedOperator>) {
        let runner = Arc::new(runner);
        let operator = Arc::new(ScriptedOperator::new(answers));
        let orchestrator = DeploymentOrchestrator::new(config, runner.clone(), operator.clone());
        (orchestrator, runner, operator)
    }

    fn states(report: &RunReport) -> Vec<RunState> {
        report.transitions.iter().map(|t| t.to).collect()
    }

    fn static_site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        dir
    }

    #[tokio::test]
    async fn static_site_skips_building() {
        let dir = static_site();
        let (orchestrator, runner, _) = orchestrator(
            config(),
            ScriptedRunner::new().on("git --version", ProcessOutput::success("git version 2.43.0")),
            vec![],
        );
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(
            states(&report),
            vec![
                RunState::Detecting,
                RunState::Recommending,
                RunState::CheckingTool,
                RunState::Deploying,
                RunState::Reporting,
                RunState::Done,
            ]
        );
        assert!(report.build.is_none());
        assert!(report.is_success());
        assert_eq!(runner.calls(), vec!["git --version"]);
    }

    #[tokio::test]
    async fn missing_tool_aborts_after_rechecks() {
        let dir = static_site();
        let mut config = config();
        config.tools.max_rechecks = 2;
        let (orchestrator, runner, operator) = orchestrator(
            config,
            ScriptedRunner::new().missing("git --version"),
            vec![Confirmation::Confirmed; 4],
        );
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(
            report.outcome,
            Some(Terminal::Aborted {
                reason: AbortReason::ToolUnavailable
            })
        );
        assert_eq!(report.tool_checks, 3);
        assert_eq!(runner.count("git --version"), 3);
        assert_eq!(operator.messages().len(), 2);
        assert!(report.deployment.is_none());
    }

    #[tokio::test]
    async fn install_then_recheck_succeeds() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"shop","dependencies":{"next":"14"}}"#,
        )
        .unwrap();
        let (orchestrator, runner, _) = orchestrator(
            config(),
            ScriptedRunner::new()
                .missing("vercel --version")
                .on("vercel --version", ProcessOutput::success("33.0.0"))
                .on("npm install -g vercel", ProcessOutput::success(""))
                .on("npm run build", ProcessOutput::success("built"))
                .on("vercel whoami", ProcessOutput::success("acme"))
                .on("vercel --prod --yes", ProcessOutput::success("https://shop.vercel.app")),
            vec![Confirmation::Confirmed, Confirmation::Confirmed],
        );
        let report = orchestrator.run(dir.path()).await;

        assert!(report.is_success());
        assert_eq!(report.tool_checks, 2);
        assert!(states(&report).contains(&RunState::InstallingTool));
        assert_eq!(runner.count("npm install -g vercel"), 1);
        assert_eq!(
            report.deployment.unwrap().url.as_deref(),
            Some("https://shop.vercel.app")
        );
    }

    #[tokio::test]
    async fn declining_install_cancels_run() {
        let dir = static_site();
        let (orchestrator, _, _) = orchestrator(
            config(),
            ScriptedRunner::new().missing("git --version"),
            vec![],
        );
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(
            report.outcome,
            Some(Terminal::Aborted {
                reason: AbortReason::Cancelled
            })
        );
        assert_eq!(report.state, RunState::Aborted);
    }

    fn vite_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"app","devDependencies":{"vite":"^5.0.0"}}"#,
        )
        .unwrap();
        dir
    }

    fn netlify_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on("netlify --version", ProcessOutput::success("netlify-cli/17.0.0"))
            .on("netlify status", ProcessOutput::success("Logged in"))
            .on("npm run build", ProcessOutput::failure(1, "SyntaxError"))
            .on(
                "netlify deploy --prod --dir .",
                ProcessOutput::success("Website URL: https://app.netlify.app"),
            )
    }

    #[tokio::test]
    async fn failed_build_proceeds_with_warning() {
        let dir = vite_project();
        let (orchestrator, runner, operator) = orchestrator(config(), netlify_runner(), vec![]);
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(report.outcome, Some(Terminal::Done));
        assert!(!report.build.as_ref().unwrap().succeeded);
        assert_eq!(runner.count("netlify deploy --prod --dir ."), 1);
        assert!(report.warnings.iter().any(|w| w.contains("deploying to Netlify anyway")));
        assert_eq!(operator.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_build_suppressed_by_policy() {
        let dir = vite_project();
        let mut config = config();
        config.build.failure_policy = BuildFailurePolicy::Suppress;
        let (orchestrator, runner, _) = orchestrator(config, netlify_runner(), vec![]);
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(report.outcome, Some(Terminal::Done));
        assert!(report.deployment.is_none());
        assert!(!report.is_success());
        assert_eq!(runner.count("netlify deploy --prod --dir ."), 0);
        assert!(!states(&report).contains(&RunState::Deploying));
    }

    #[tokio::test]
    async fn login_then_redeploy() {
        let dir = static_site();
        let config = config();
        let runner = ScriptedRunner::new()
            .on("wrangler --version", ProcessOutput::success("3.0.0"))
            .on("wrangler whoami", ProcessOutput::failure(1, "not logged in"))
            .on("wrangler whoami", ProcessOutput::success("me@example.com"))
            .on("wrangler login", ProcessOutput::success(""));
        let runner = Arc::new(runner);
        let operator = Arc::new(ScriptedOperator::new([Confirmation::Confirmed]));
        let advisor = PlatformAdvisor::new(
            Box::new(FixedOracle("cloudflare pages")),
            &config.advisor,
        );
        let orchestrator = DeploymentOrchestrator::new(config, runner.clone(), operator.clone())
            .with_advisor(advisor);

        let report = orchestrator.run(dir.path()).await;

        assert_eq!(report.outcome, Some(Terminal::Done));
        assert!(states(&report).contains(&RunState::Authenticating));
        assert_eq!(runner.count("wrangler login"), 1);
        assert!(runner.invocations().iter().any(|c| c.program == "wrangler" && c.args[0] == "pages"));
    }

    #[tokio::test]
    async fn auth_attempts_are_bounded() {
        let dir = static_site();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("wrangler --version", ProcessOutput::success("3.0.0"))
                .on("wrangler whoami", ProcessOutput::failure(1, "not logged in"))
                .on("wrangler login", ProcessOutput::success("")),
        );
        let operator = Arc::new(ScriptedOperator::new([Confirmation::Confirmed; 5]));
        let config = config();
        let advisor = PlatformAdvisor::new(Box::new(FixedOracle("Cloudflare")), &config.advisor);
        let orchestrator =
            DeploymentOrchestrator::new(config, runner.clone(), operator).with_advisor(advisor);

        let report = orchestrator.run(dir.path()).await;

        assert_eq!(
            report.outcome,
            Some(Terminal::Aborted {
                reason: AbortReason::AuthenticationRequired
            })
        );
        assert_eq!(runner.count("wrangler login"), 1);
        assert_eq!(runner.count("wrangler whoami"), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_aborts_immediately() {
        let dir = static_site();
        let (tx, cancellation) = Cancellation::channel();
        tx.send(true).unwrap();
        let (orchestrator, runner, _) = orchestrator(config(), ScriptedRunner::new(), vec![]);
        let report = orchestrator.with_cancellation(cancellation).run(dir.path()).await;

        assert_eq!(
            report.outcome,
            Some(Terminal::Aborted {
                reason: AbortReason::Cancelled
            })
        );
        assert_eq!(report.interrupted_stage, Some(RunState::Detecting));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_project_falls_back_with_warning() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, _, _) = orchestrator(
            config(),
            ScriptedRunner::new()
                .on("vercel --version", ProcessOutput::success("33.0.0"))
                .on("vercel whoami", ProcessOutput::success("acme"))
                .on("vercel --prod --yes", ProcessOutput::success("")),
            vec![],
        );
        let report = orchestrator.run(dir.path()).await;

        assert_eq!(report.profile.as_ref().unwrap().kind, ProjectKind::Unknown);
        assert_eq!(
            report.choice.as_ref().unwrap().platform,
            Platform::Vercel
        );
        assert!(report.build.is_none());
        assert!(!report.warnings.is_empty());
        assert_eq!(report.outcome, Some(Terminal::Done));
    }

    #[tokio::test]
    async fn report_is_saved_outside_the_project() {
        let dir = static_site();
        let reports = TempDir::new().unwrap();
        let mut config = config();
        config.report.write_json = true;
        config.report.dir = Some(reports.path().to_path_buf());
        let (orchestrator, _, _) = orchestrator(
            config,
            ScriptedRunner::new().on("git --version", ProcessOutput::success("git")),
            vec![],
        );
        let report = orchestrator.run(dir.path()).await;

        let saved = reports
            .path()
            .join(report.profile.as_ref().unwrap().slug())
            .join(format!("{}.json", report.run_id));
        assert!(saved.is_file());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("index.html")]);
    }

    #[tokio::test]
    async fn report_dir_inside_project_is_refused() {
        let dir = static_site();
        let mut config = config();
        config.report.write_json = true;
        config.report.dir = Some(dir.path().join(".autodeploy/runs"));
        let advisor = PlatformAdvisor::new(Box::new(FixedOracle("cloudflare")), &config.advisor);
        let (orchestrator, runner, _) = orchestrator(
            config,
            ScriptedRunner::new()
                .on("wrangler --version", ProcessOutput::success("3.0.0"))
                .on("wrangler whoami", ProcessOutput::success("me@example.com")),
            vec![],
        );
        let orchestrator = orchestrator.with_advisor(advisor);

        for _ in 0..2 {
            let report = orchestrator.run(dir.path()).await;
            assert_eq!(report.outcome, Some(Terminal::Done));
        }

        assert!(!dir.path().join(".autodeploy").exists());
        let deploy = runner
            .invocations()
            .into_iter()
            .find(|c| c.program == "wrangler" && c.args.first().map(String::as_str) == Some("pages"))
            .unwrap();
        assert_eq!(deploy.args[2], ".");
    }

    #[test]
    fn containment_resolves_missing_components() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();

        assert!(is_within(&root.path().join("a/b/c"), root.path()));
        assert!(is_within(root.path(), root.path()));
        assert!(!is_within(&outside.path().join("runs"), root.path()));
    }

    struct FixedOracle(&'static str);

    #[async_trait::async_trait]
    impl crate::advisor::AdvisoryOracle for FixedOracle {
        async fn advise(
            &self,
            _request: &crate::advisor::AdviceRequest,
        ) -> crate::error::Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }
}
