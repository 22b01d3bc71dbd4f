//! Run report: the record of one pipeline run.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::advisor::PlatformChoice;
use crate::build::BuildResult;
use crate::deploy::DeploymentResult;
use crate::error::{Error, Result};
use crate::project::ProjectProfile;
use crate::scaffold::ScaffoldRecord;
use crate::tooling::ToolStatus;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    /// Inspecting the project directory.
    Detecting,
    /// Asking the advisor for a platform.
    Recommending,
    /// Probing for the platform CLI.
    CheckingTool,
    /// Waiting on the operator to install the CLI.
    InstallingTool,
    /// Running the project build.
    Building,
    /// Running the deployment strategy.
    Deploying,
    /// Waiting on an interactive platform login.
    Authenticating,
    /// Assembling the report.
    Reporting,
    /// Finished; the report is final.
    Done,
    /// Stopped early; see the report's outcome for the reason.
    Aborted,
}

impl RunState {
    /// Returns true for `Done` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detecting => "detecting",
            Self::Recommending => "recommending",
            Self::CheckingTool => "checking-tool",
            Self::InstallingTool => "installing-tool",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Authenticating => "authenticating",
            Self::Reporting => "reporting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why a run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbortReason {
    /// The operator interrupted or declined to continue.
    Cancelled,
    /// The platform CLI stayed missing after the allowed re-checks.
    ToolUnavailable,
    /// The platform CLI stayed logged out after the allowed logins.
    AuthenticationRequired,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by operator"),
            Self::ToolUnavailable => write!(f, "platform CLI unavailable"),
            Self::AuthenticationRequired => write!(f, "platform authentication required"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Terminal {
    /// The pipeline ran to completion.
    Done,
    /// The pipeline stopped before completing.
    Aborted {
        /// Why it stopped.
        reason: AbortReason,
    },
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State left; `None` for the initial entry.
    pub from: Option<RunState>,
    /// State entered.
    pub to: RunState,
    /// Context for the change.
    pub note: Option<String>,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Everything known about a run.
///
/// Filled in incrementally, so an aborted run still reports what each
/// completed stage produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,
    /// Project root.
    pub root: PathBuf,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end, set once the run is terminal.
    pub finished_at: Option<DateTime<Utc>>,
    /// Current (or final) state.
    pub state: RunState,
    /// Ordered state changes.
    pub transitions: Vec<Transition>,
    /// Detection result.
    pub profile: Option<ProjectProfile>,
    /// Chosen platform.
    pub choice: Option<PlatformChoice>,
    /// Last tool availability check.
    pub tool: Option<ToolStatus>,
    /// Number of tool availability checks run.
    pub tool_checks: u32,
    /// Build outcome; absent when the build was skipped.
    pub build: Option<BuildResult>,
    /// Platform config files prepared for deployment.
    pub scaffold: Vec<ScaffoldRecord>,
    /// Deployment outcome.
    pub deployment: Option<DeploymentResult>,
    /// Stage that was running when the run was interrupted.
    pub interrupted_stage: Option<RunState>,
    /// Non-fatal problems worth the operator's attention.
    pub warnings: Vec<String>,
    /// Terminal outcome, set once the run ends.
    pub outcome: Option<Terminal>,
}

impl RunReport {
    /// Starts a report in the `Detecting` state.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            root: root.into(),
            started_at: now,
            finished_at: None,
            state: RunState::Detecting,
            transitions: vec![Transition {
                from: None,
                to: RunState::Detecting,
                note: None,
                at: now,
            }],
            profile: None,
            choice: None,
            tool: None,
            tool_checks: 0,
            build: None,
            scaffold: Vec::new(),
            deployment: None,
            interrupted_stage: None,
            warnings: Vec::new(),
            outcome: None,
        }
    }

    /// Moves to `to`, recording the change.
    pub fn transition(&mut self, to: RunState, note: Option<String>) {
        tracing::info!(run_id = %self.run_id, from = %self.state, to = %to, note = ?note, "state transition");
        self.transitions.push(Transition {
            from: Some(self.state),
            to,
            note,
            at: Utc::now(),
        });
        self.state = to;
    }

    /// Records a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = %self.run_id, "{}", message);
        self.warnings.push(message);
    }

    /// Ends the run.
    pub fn finish(&mut self, outcome: Terminal) {
        let (to, note) = match outcome {
            Terminal::Done => (RunState::Done, None),
            Terminal::Aborted { reason } => (RunState::Aborted, Some(reason.to_string())),
        };
        self.transition(to, note);
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    /// Returns true if the run finished and the deployment succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome == Some(Terminal::Done)
            && self.deployment.as_ref().is_some_and(|d| d.succeeded)
    }

    /// Renders the report for the terminal.
    ///
    /// Sections always appear in the same order: kind, platform, tool,
    /// build, deployment.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Run {}\n", self.run_id));

        match &self.profile {
            Some(profile) => out.push_str(&format!(
                "Project:    {} ({})\n",
                profile.kind,
                profile.root.display()
            )),
            None => out.push_str("Project:    not inspected\n"),
        }

        match &self.choice {
            Some(choice) => out.push_str(&format!(
                "Platform:   {} [{:?}] {}\n",
                choice.platform, choice.source, choice.rationale
            )),
            None => out.push_str("Platform:   not chosen\n"),
        }

        match &self.tool {
            Some(tool) if tool.installed => out.push_str(&format!(
                "Tool:       available{}\n",
                tool.version
                    .as_deref()
                    .map(|v| format!(" ({})", v))
                    .unwrap_or_default()
            )),
            Some(tool) => out.push_str(&format!(
                "Tool:       missing after {} check(s){}\n",
                self.tool_checks,
                tool.install_hint
                    .as_deref()
                    .map(|h| format!("; install with {}", h))
                    .unwrap_or_default()
            )),
            None => out.push_str("Tool:       not checked\n"),
        }

        match &self.build {
            Some(build) if build.succeeded => out.push_str(&format!(
                "Build:      succeeded (retried: {})\n",
                build.retried
            )),
            Some(build) => out.push_str(&format!(
                "Build:      failed{} (retried: {})\n",
                build
                    .failure
                    .map(|f| format!(": {:?}", f))
                    .unwrap_or_default(),
                build.retried
            )),
            None => out.push_str("Build:      skipped\n"),
        }

        match &self.deployment {
            Some(d) if d.succeeded => {
                match (&d.url, &d.instructions) {
                    (Some(url), _) => out.push_str(&format!("Deployment: live at {}\n", url)),
                    (None, Some(steps)) => {
                        out.push_str(&format!("Deployment: manual steps for {}\n", d.platform));
                        for line in steps.lines() {
                            out.push_str(&format!("  {}\n", line));
                        }
                    }
                    (None, None) => out.push_str("Deployment: succeeded (no URL found in output)\n"),
                }
            }
            Some(d) => {
                out.push_str(&format!("Deployment: failed on {}\n", d.platform));
                for line in d.raw_output.lines().rev().take(5).collect::<Vec<_>>().into_iter().rev() {
                    out.push_str(&format!("  {}\n", line));
                }
            }
            None => out.push_str("Deployment: not performed\n"),
        }

        for warning in &self.warnings {
            out.push_str(&format!("Warning:    {}\n", warning));
        }

        match self.outcome {
            Some(Terminal::Done) => out.push_str("Outcome:    done\n"),
            Some(Terminal::Aborted { reason }) => {
                out.push_str(&format!("Outcome:    aborted ({})\n", reason))
            }
            None => out.push_str(&format!("Outcome:    in progress ({})\n", self.state)),
        }

        out
    }

    /// Pretty JSON form of the report.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Writes the report as `<dir>/<run-id>.json`, creating `dir`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.run_id));
        std::fs::write(&path, self.to_json()?)?;
        tracing::info!(path = ?path, "saved run report");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::ChoiceSource;
    use crate::platform::{DeployMode, Platform};
    use crate::project::ProjectKind;
    use tempfile::TempDir;

    fn complete_report() -> RunReport {
        let mut report = RunReport::new("/tmp/site");
        report.profile = Some(ProjectProfile {
            root: PathBuf::from("/tmp/site"),
            kind: ProjectKind::Vite,
            markers: vec!["package.json".into()],
            manifest: None,
        });
        report.choice = Some(PlatformChoice {
            platform: Platform::Netlify,
            rationale: "static output".into(),
            source: ChoiceSource::Fallback,
        });
        report.tool = Some(ToolStatus {
            platform: Platform::Netlify,
            installed: true,
            version: Some("netlify-cli/17.0.0".into()),
            install_hint: None,
        });
        report.tool_checks = 1;
        report.build = Some(BuildResult {
            attempted: true,
            succeeded: true,
            retried: true,
            ..BuildResult::default()
        });
        report.deployment = Some(DeploymentResult {
            platform: Platform::Netlify,
            mode: DeployMode::Automated,
            succeeded: true,
            url: Some("https://site.netlify.app".into()),
            instructions: None,
            raw_output: String::new(),
        });
        report.finish(Terminal::Done);
        report
    }

    #[test]
    fn new_report_starts_detecting() {
        let report = RunReport::new("/tmp/x");
        assert_eq!(report.state, RunState::Detecting);
        assert_eq!(report.transitions.len(), 1);
        assert!(report.transitions[0].from.is_none());
        assert!(report.outcome.is_none());
    }

    #[test]
    fn transitions_are_recorded_in_order() {
        let mut report = RunReport::new("/tmp/x");
        report.transition(RunState::Recommending, None);
        report.transition(RunState::CheckingTool, Some("vercel".into()));

        let tos: Vec<_> = report.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            tos,
            vec![RunState::Detecting, RunState::Recommending, RunState::CheckingTool]
        );
        assert_eq!(report.transitions[2].from, Some(RunState::Recommending));
        assert_eq!(report.state, RunState::CheckingTool);
    }

    #[test]
    fn finish_sets_terminal_state() {
        let mut report = RunReport::new("/tmp/x");
        report.finish(Terminal::Aborted {
            reason: AbortReason::ToolUnavailable,
        });

        assert_eq!(report.state, RunState::Aborted);
        assert!(report.state.is_terminal());
        assert!(report.finished_at.is_some());
        assert!(!report.is_success());
    }

    #[test]
    fn render_sections_in_fixed_order() {
        let text = complete_report().render();

        let order = ["Project:", "Platform:", "Tool:", "Build:", "Deployment:"]
            .iter()
            .map(|s| text.find(s).unwrap())
            .collect::<Vec<_>>();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert!(text.contains("Vite"));
        assert!(text.contains("retried: true"));
        assert!(text.contains("https://site.netlify.app"));
        assert!(text.contains("Outcome:    done"));
    }

    #[test]
    fn render_partial_run() {
        let mut report = RunReport::new("/tmp/x");
        report.warn("operator interrupted");
        report.finish(Terminal::Aborted {
            reason: AbortReason::Cancelled,
        });
        let text = report.render();

        assert!(text.contains("Project:    not inspected"));
        assert!(text.contains("Build:      skipped"));
        assert!(text.contains("Deployment: not performed"));
        assert!(text.contains("aborted (cancelled by operator)"));
    }

    #[test]
    fn successful_run_is_success() {
        assert!(complete_report().is_success());
    }

    #[test]
    fn json_uses_tagged_outcome() {
        let json: serde_json::Value =
            serde_json::from_str(&complete_report().to_json().unwrap()).unwrap();

        assert_eq!(json["outcome"]["status"], "done");
        assert_eq!(json["state"], "done");
        assert_eq!(json["choice"]["platform"], "netlify");
    }

    #[test]
    fn save_writes_file_named_after_run() {
        let dir = TempDir::new().unwrap();
        let report = complete_report();
        let path = report.save(&dir.path().join("runs")).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("{}.json", report.run_id)
        );
        let loaded: RunReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
    }
}
