//! Platform recommendation.
//!
//! Wraps the advisory oracle behind a total contract: whatever the oracle
//! does (time out, fail, ramble), [`PlatformAdvisor::recommend`] returns a
//! [`PlatformChoice`] naming one of the known platforms.

mod ollama;

pub use ollama::OllamaOracle;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AdvisorConfig;
use crate::error::Result;
use crate::platform::Platform;
use crate::project::{ProjectKind, ProjectProfile};

/// Where a platform choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoiceSource {
    /// The advisory oracle named the platform.
    Advisor,
    /// The deterministic fallback table.
    Fallback,
}

/// The platform a run deploys to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformChoice {
    /// Chosen platform.
    pub platform: Platform,
    /// Why it was chosen.
    pub rationale: String,
    /// Who chose it.
    pub source: ChoiceSource,
}

/// Request sent to the advisory oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceRequest {
    /// Detected project kind.
    pub kind: ProjectKind,
    /// Compact description of the project.
    pub summary: String,
}

impl AdviceRequest {
    /// Builds a request from a profile.
    pub fn from_profile(profile: &ProjectProfile) -> Self {
        Self {
            kind: profile.kind,
            summary: profile.summary(),
        }
    }
}

/// An external model that suggests a hosting platform.
#[async_trait]
pub trait AdvisoryOracle: Send + Sync {
    /// Returns the oracle's raw answer.
    async fn advise(&self, request: &AdviceRequest) -> Result<String>;

    /// Returns the name of this oracle.
    fn name(&self) -> &str;
}

/// Deterministic platform for each project kind.
pub fn fallback_choice(kind: ProjectKind) -> PlatformChoice {
    let (platform, rationale) = match kind {
        ProjectKind::NextJs => (
            Platform::Vercel,
            "Vercel builds Next.js and hosts it with zero configuration",
        ),
        ProjectKind::Vite => (
            Platform::Netlify,
            "Netlify serves Vite's static build output with instant rollbacks",
        ),
        ProjectKind::React => (
            Platform::Netlify,
            "Netlify hosts React single-page apps with automatic builds",
        ),
        ProjectKind::StaticSite => (
            Platform::GitHubPages,
            "GitHub Pages serves plain static sites straight from the repository",
        ),
        ProjectKind::PythonFlask => (
            Platform::Vercel,
            "Vercel runs Flask apps as Python serverless functions",
        ),
        ProjectKind::Unknown => (
            Platform::Vercel,
            "Vercel supports most web frameworks out of the box",
        ),
    };

    PlatformChoice {
        platform,
        rationale: rationale.to_string(),
        source: ChoiceSource::Fallback,
    }
}

/// Platform and optional rationale extracted from an oracle answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAdvice {
    /// Named platform.
    pub platform: Platform,
    /// Explanation, if one was given.
    pub rationale: Option<String>,
}

/// Parses an oracle answer.
///
/// A JSON object is read through its `platform` and `reason` fields;
/// anything else is scanned as free text. Returns `None` when no known
/// platform is named.
pub fn parse_advice(text: &str) -> Option<ParsedAdvice> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
        let platform = map
            .get("platform")
            .and_then(|p| p.as_str())
            .and_then(Platform::find_in)?;
        let rationale = ["reason", "rationale"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|r| r.as_str()))
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        return Some(ParsedAdvice {
            platform,
            rationale,
        });
    }

    Platform::find_in(text).map(|platform| ParsedAdvice {
        platform,
        rationale: Some(text.to_string()),
    })
}

/// Truncates to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_rationale(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut truncated: String = text.chars().take(max - 1).collect();
    truncated.push('…');
    truncated
}

/// Chooses a platform for a project.
pub struct PlatformAdvisor {
    oracle: Option<Box<dyn AdvisoryOracle>>,
    timeout: Duration,
    max_rationale_len: usize,
}

impl PlatformAdvisor {
    /// Creates an advisor backed by an oracle.
    pub fn new(oracle: Box<dyn AdvisoryOracle>, config: &AdvisorConfig) -> Self {
        Self {
            oracle: Some(oracle),
            timeout: config.timeout(),
            max_rationale_len: config.max_rationale_len,
        }
    }

    /// Creates an advisor that always uses the fallback table.
    pub fn fallback_only() -> Self {
        let config = AdvisorConfig::default();
        Self {
            oracle: None,
            timeout: config.timeout(),
            max_rationale_len: config.max_rationale_len,
        }
    }

    /// Creates an advisor from configuration, talking to Ollama when enabled.
    pub fn from_config(config: &AdvisorConfig) -> Self {
        if !config.enabled {
            return Self::fallback_only();
        }
        match OllamaOracle::new(&config.endpoint, &config.model, config.timeout()) {
            Ok(oracle) => Self::new(Box::new(oracle), config),
            Err(e) => {
                tracing::warn!(error = %e, "advisory oracle unavailable, using fallback table");
                Self::fallback_only()
            }
        }
    }

    /// Recommends a platform. Never fails.
    pub async fn recommend(&self, profile: &ProjectProfile) -> PlatformChoice {
        let fallback = fallback_choice(profile.kind);

        let Some(oracle) = &self.oracle else {
            tracing::info!(kind = ?profile.kind, platform = ?fallback.platform, "no advisory oracle, using fallback");
            return fallback;
        };

        let request = AdviceRequest::from_profile(profile);
        let answer = match tokio::time::timeout(self.timeout, oracle.advise(&request)).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                tracing::warn!(oracle = oracle.name(), error = %e, "advisory oracle failed, using fallback");
                return fallback;
            }
            Err(_) => {
                tracing::warn!(
                    oracle = oracle.name(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "advisory oracle timed out, using fallback"
                );
                return fallback;
            }
        };

        match parse_advice(&answer) {
            Some(advice) => {
                let rationale = advice
                    .rationale
                    .unwrap_or_else(|| format!("Suggested by {}", oracle.name()));
                tracing::info!(oracle = oracle.name(), platform = ?advice.platform, "advisory oracle recommendation");
                PlatformChoice {
                    platform: advice.platform,
                    rationale: truncate_rationale(&rationale, self.max_rationale_len),
                    source: ChoiceSource::Advisor,
                }
            }
            None => {
                tracing::warn!(
                    oracle = oracle.name(),
                    answer_len = answer.len(),
                    "advisory oracle named no known platform, using fallback"
                );
                fallback
            }
        }
    }
}
