//! CLI-driven deployments.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Error;
use crate::platform::Platform;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};
use crate::project::ProjectProfile;

use super::{publish_dir, DeployOutcome, DeploymentResult};

/// Probe output meaning the CLI has no credentials.
const LOGGED_OUT_MARKERS: &[&str] = &["not logged in", "please log in", "not authenticated"];

/// Probe output meaning the CLI is logged in but the folder has no site yet.
const UNLINKED_MARKERS: &[&str] = &[
    "not linked",
    "linked to a project",
    "linked to a site",
    "netlify link",
];

/// What the login probe revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Logged in and ready to deploy.
    Ready,
    /// Logged in, but the folder is not linked to a site on the platform.
    Unlinked,
    /// Not logged in.
    LoggedOut,
}

/// Deploys through a platform CLI after checking its login state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutomatedStrategy {
    platform: Platform,
    binary: &'static str,
    auth_args: &'static [&'static str],
}

impl AutomatedStrategy {
    /// Strategy for an automated platform; `None` for manual ones.
    pub fn for_platform(platform: Platform) -> Option<Self> {
        let (binary, auth_args): (&'static str, &'static [&'static str]) = match platform {
            Platform::Vercel => ("vercel", &["whoami"]),
            Platform::Netlify => ("netlify", &["status"]),
            Platform::CloudflarePages => ("wrangler", &["whoami"]),
            Platform::GitHubPages | Platform::Render => return None,
        };
        Some(Self {
            platform,
            binary,
            auth_args,
        })
    }

    /// Login state query.
    pub fn auth_command(&self, profile: &ProjectProfile, timeout: Duration) -> CommandSpec {
        CommandSpec::new(self.binary, self.auth_args.iter().copied())
            .in_dir(&profile.root)
            .with_timeout(timeout)
    }

    /// Reads the probe's output, not just its exit code.
    ///
    /// `netlify status` exits non-zero both when logged out and when the
    /// folder has never been linked to a site; only the first needs a login.
    pub fn auth_state(&self, output: &ProcessOutput) -> AuthState {
        let text = output.combined().to_lowercase();
        if LOGGED_OUT_MARKERS.iter().any(|m| text.contains(m)) {
            return AuthState::LoggedOut;
        }
        if self.platform == Platform::Netlify && UNLINKED_MARKERS.iter().any(|m| text.contains(m)) {
            return AuthState::Unlinked;
        }
        if output.succeeded() {
            AuthState::Ready
        } else {
            AuthState::LoggedOut
        }
    }

    /// Interactive login, attached to the operator's terminal.
    pub fn login_command(&self, profile: &ProjectProfile) -> CommandSpec {
        CommandSpec::new(self.binary, ["login"])
            .in_dir(&profile.root)
            .interactive()
    }

    /// The deploy command. Deliberately untimed.
    ///
    /// An unlinked Netlify folder gets a new site named after the project.
    pub fn deploy_command(&self, profile: &ProjectProfile, state: AuthState) -> CommandSpec {
        let args: Vec<String> = match self.platform {
            Platform::Vercel => vec!["--prod".into(), "--yes".into()],
            Platform::Netlify => {
                let mut args = vec![
                    "deploy".into(),
                    "--prod".into(),
                    "--dir".into(),
                    publish_dir(&profile.root),
                ];
                if state == AuthState::Unlinked {
                    args.extend(["--create-site".into(), profile.slug()]);
                }
                args
            }
            _ => vec![
                "pages".into(),
                "deploy".into(),
                publish_dir(&profile.root),
                "--project-name".into(),
                profile.slug(),
            ],
        };
        CommandSpec::new(self.binary, args).in_dir(&profile.root)
    }

    fn failed(&self, raw_output: String) -> DeployOutcome {
        DeployOutcome::Completed(DeploymentResult {
            platform: self.platform,
            mode: self.platform.deploy_mode(),
            succeeded: false,
            url: None,
            instructions: None,
            raw_output,
        })
    }

    /// Probes authentication, then deploys.
    ///
    /// A logged-out CLI yields [`DeployOutcome::AuthRequired`] without
    /// running the deploy command.
    pub async fn deploy(
        &self,
        runner: &dyn CommandRunner,
        profile: &ProjectProfile,
        auth_timeout: Duration,
    ) -> DeployOutcome {
        let probe = self.auth_command(profile, auth_timeout);
        let state = match runner.run(&probe).await {
            Ok(output) => self.auth_state(&output),
            Err(Error::ToolNotFound(program)) => {
                return self.failed(format!("`{}` is not installed", program));
            }
            Err(e) => {
                tracing::warn!(platform = ?self.platform, error = %e, "auth probe failed");
                AuthState::LoggedOut
            }
        };
        match state {
            AuthState::Ready => tracing::debug!(platform = ?self.platform, "CLI authenticated"),
            AuthState::Unlinked => {
                tracing::info!(platform = ?self.platform, site = %profile.slug(), "folder not linked, creating site")
            }
            AuthState::LoggedOut => {
                tracing::info!(platform = ?self.platform, "CLI not authenticated");
                return DeployOutcome::AuthRequired {
                    platform: self.platform,
                    login: self.login_command(profile),
                };
            }
        }

        let command = self.deploy_command(profile, state);
        tracing::info!(platform = ?self.platform, command = %command.command_line(), "deploying");
        let output = match runner.run(&command).await {
            Ok(output) => output,
            Err(e) => return self.failed(e.to_string()),
        };

        let raw_output = output.combined();
        if !output.succeeded() {
            tracing::warn!(platform = ?self.platform, exit_code = ?output.exit_code, "deploy command failed");
            return self.failed(raw_output);
        }

        let url = extract_url(self.platform, &raw_output);
        tracing::info!(platform = ?self.platform, url = ?url, "deploy command succeeded");
        DeployOutcome::Completed(DeploymentResult {
            platform: self.platform,
            mode: self.platform.deploy_mode(),
            succeeded: true,
            url,
            instructions: None,
            raw_output,
        })
    }
}

/// Live-URL patterns per platform, tried in order. Group 1, when present,
/// is the URL.
const URL_PATTERNS: &[(Platform, &str)] = &[
    (Platform::Vercel, r"https://[\w.-]+\.vercel\.app\b"),
    (Platform::Netlify, r"Website URL:\s*(https://\S+)"),
    (Platform::Netlify, r"https://[\w.-]+\.netlify\.app\b"),
    (Platform::CloudflarePages, r"https://[\w.-]+\.pages\.dev\b"),
];

static URLS: Lazy<Vec<(Platform, Regex)>> = Lazy::new(|| {
    URL_PATTERNS
        .iter()
        .map(|(platform, pattern)| (*platform, Regex::new(pattern).expect("valid regex")))
        .collect()
});

/// Pulls the live URL out of a deploy command's output.
pub fn extract_url(platform: Platform, output: &str) -> Option<String> {
    let matched = URLS
        .iter()
        .filter(|(p, _)| *p == platform)
        .find_map(|(_, re)| {
            re.captures(output)
                .and_then(|c| c.get(1).or_else(|| c.get(0)))
                .map(|m| m.as_str().to_string())
        });
    if matched.is_some() || platform != Platform::Vercel {
        return matched;
    }
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("https://"))
        .and_then(|line| line.split_whitespace().next())
        .map(str::to_string)
}
