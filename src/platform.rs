//! Hosting platforms and their CLIs.

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::process::CommandSpec;

/// A supported hosting platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Platform {
    /// Vercel.
    Vercel,
    /// Netlify.
    Netlify,
    /// GitHub Pages.
    #[serde(rename = "github-pages")]
    GitHubPages,
    /// Cloudflare Pages.
    CloudflarePages,
    /// Render.
    Render,
}

/// How a platform deployment is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// The platform CLI performs the deployment.
    Automated,
    /// The operator follows generated instructions.
    Manual,
}

/// How a missing platform CLI gets installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMethod {
    /// A command the pipeline can run on the operator's behalf.
    Command(CommandSpec),
    /// The operator installs it by hand from this location.
    Manual(String),
}

impl InstallMethod {
    /// Human-readable install hint.
    pub fn describe(&self) -> String {
        match self {
            Self::Command(spec) => spec.command_line(),
            Self::Manual(url) => url.clone(),
        }
    }
}

/// The CLI a platform requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTool {
    /// Executable name.
    pub binary: &'static str,
    /// How to install it.
    pub install: InstallMethod,
}

impl PlatformTool {
    /// The version query used to probe availability.
    pub fn version_command(&self, timeout: Duration) -> CommandSpec {
        CommandSpec::new(self.binary, ["--version"]).with_timeout(timeout)
    }
}

impl Platform {
    /// Every platform, in display order.
    pub const ALL: [Platform; 5] = [
        Platform::Vercel,
        Platform::Netlify,
        Platform::GitHubPages,
        Platform::CloudflarePages,
        Platform::Render,
    ];

    /// Name as shown to the operator.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vercel => "Vercel",
            Self::Netlify => "Netlify",
            Self::GitHubPages => "GitHub Pages",
            Self::CloudflarePages => "Cloudflare Pages",
            Self::Render => "Render",
        }
    }

    /// Whether deployment is automated or instructions-only.
    ///
    /// Fixed per platform; runtime conditions never change it.
    pub fn deploy_mode(&self) -> DeployMode {
        match self {
            Self::Vercel | Self::Netlify | Self::CloudflarePages => DeployMode::Automated,
            Self::GitHubPages | Self::Render => DeployMode::Manual,
        }
    }

    /// The CLI this platform needs, if any.
    pub fn tool(&self) -> Option<PlatformTool> {
        let npm_global = |package: &str| {
            InstallMethod::Command(CommandSpec::new("npm", ["install", "-g", package]))
        };
        match self {
            Self::Vercel => Some(PlatformTool {
                binary: "vercel",
                install: npm_global("vercel"),
            }),
            Self::Netlify => Some(PlatformTool {
                binary: "netlify",
                install: npm_global("netlify-cli"),
            }),
            Self::CloudflarePages => Some(PlatformTool {
                binary: "wrangler",
                install: npm_global("wrangler"),
            }),
            Self::GitHubPages => Some(PlatformTool {
                binary: "git",
                install: InstallMethod::Manual("https://git-scm.com/downloads".to_string()),
            }),
            Self::Render => None,
        }
    }

    /// Finds the platform mentioned earliest in free text.
    ///
    /// Matching is case-insensitive and respects word boundaries, so
    /// "rendering" does not name Render.
    pub fn find_in(text: &str) -> Option<Platform> {
        MENTIONS
            .iter()
            .filter_map(|(platform, re)| re.find(text).map(|m| (m.start(), *platform)))
            .min_by_key(|(start, _)| *start)
            .map(|(_, platform)| platform)
    }
}

/// Free-text names for each platform, scanned by [`Platform::find_in`].
pub(crate) const MENTION_PATTERNS: &[(Platform, &str)] = &[
    (Platform::Vercel, r"(?i)\bvercel\b"),
    (Platform::Netlify, r"(?i)\bnetlify\b"),
    (Platform::GitHubPages, r"(?i)\bgit\s*hub[\s_-]*pages\b"),
    (Platform::CloudflarePages, r"(?i)\bcloudflare(?:[\s_-]*pages)?\b"),
    (Platform::Render, r"(?i)\brender\b"),
];

static MENTIONS: Lazy<Vec<(Platform, Regex)>> = Lazy::new(|| {
    MENTION_PATTERNS
        .iter()
        .map(|(platform, pattern)| (*platform, Regex::new(pattern).expect("valid regex")))
        .collect()
});

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
