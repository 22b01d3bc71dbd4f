//! Pipeline configuration.
//!
//! Loaded from `autodeploy.toml` or `autodeploy.yaml` in the project root.
//! Every field has a default, so an absent file means default behavior.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Config file names searched in the project root, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &["autodeploy.toml", "autodeploy.yaml", "autodeploy.yml"];

/// What to do when the build stage fails for a reason that was not recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildFailurePolicy {
    /// Warn and deploy anyway.
    #[default]
    Proceed,
    /// Skip deployment and report.
    Suppress,
}

/// Advisory oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Whether to consult the oracle at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ollama API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model to query.
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on the oracle exchange, in seconds.
    #[serde(default = "default_advisor_timeout")]
    pub timeout_secs: u64,
    /// Rationale text longer than this is truncated.
    #[serde(default = "default_max_rationale_len")]
    pub max_rationale_len: usize,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_advisor_timeout() -> u64 {
    30
}

fn default_max_rationale_len() -> usize {
    280
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_advisor_timeout(),
            max_rationale_len: default_max_rationale_len(),
        }
    }
}

impl AdvisorConfig {
    /// Returns the oracle timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Platform CLI availability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Re-checks after an install before the run gives up.
    #[serde(default = "default_max_rechecks")]
    pub max_rechecks: u32,
    /// Upper bound on a version probe, in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_max_rechecks() -> u32 {
    3
}

fn default_probe_timeout() -> u64 {
    10
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_rechecks: default_max_rechecks(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl ToolsConfig {
    /// Returns the probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Build stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Behavior after an unrecovered build failure.
    #[serde(default)]
    pub failure_policy: BuildFailurePolicy,
}

/// Deployment stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Login attempts before the run gives up on authentication.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: u32,
    /// Upper bound on an authentication probe, in seconds.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
    /// Replace an existing platform config file that differs from the generated one.
    #[serde(default)]
    pub overwrite_platform_config: bool,
}

fn default_max_auth_attempts() -> u32 {
    1
}

fn default_auth_timeout() -> u64 {
    30
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            max_auth_attempts: default_max_auth_attempts(),
            auth_timeout_secs: default_auth_timeout(),
            overwrite_platform_config: false,
        }
    }
}

impl DeployConfig {
    /// Returns the auth probe timeout as a Duration.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

/// Run report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Persist each report as JSON.
    #[serde(default = "default_true")]
    pub write_json: bool,
    /// Report directory. Unset means the per-user state directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_report_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("autodeploy").join("runs"))
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            write_json: true,
            dir: None,
        }
    }
}

impl ReportConfig {
    /// Directory reports are written under, if one can be determined.
    ///
    /// Each project gets its own subdirectory named after its slug.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(default_report_dir)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Advisory oracle configuration.
    #[serde(default)]
    pub advisor: AdvisorConfig,
    /// Tool availability configuration.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Build configuration.
    #[serde(default)]
    pub build: BuildConfig,
    /// Deployment configuration.
    #[serde(default)]
    pub deploy: DeployConfig,
    /// Report configuration.
    #[serde(default)]
    pub report: ReportConfig,
}

impl PipelineConfig {
    /// Loads configuration from a TOML or YAML file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                Error::Config(format!("failed to parse {}: {}", path.display(), e))
            })
        }
    }

    /// Loads the first config file found in `root`, or defaults if none exists.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        for name in CONFIG_FILE_NAMES {
            let candidate = root.join(name);
            if candidate.is_file() {
                tracing::debug!(path = ?candidate, "loading configuration");
                return Self::load(candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for AdvisorConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.enabled {
            return result;
        }

        if self.endpoint.trim().is_empty() {
            result.add_error("advisor.endpoint cannot be empty");
        } else if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://")
        {
            result.add_error(format!(
                "advisor.endpoint '{}' must be an http(s) URL",
                self.endpoint
            ));
        }

        if self.model.trim().is_empty() {
            result.add_error("advisor.model cannot be empty");
        }

        if self.timeout_secs == 0 {
            result.add_error("advisor.timeout_secs must be at least 1");
        } else if self.timeout_secs > 300 {
            result.add_warning("advisor.timeout_secs over 5 minutes delays the fallback");
        }

        if self.max_rationale_len < 20 {
            result.add_warning("advisor.max_rationale_len under 20 hides most of the rationale");
        }

        result
    }
}

impl Validate for ToolsConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_rechecks == 0 {
            result.add_warning(
                "tools.max_rechecks = 0 means a missing CLI aborts the run without an install attempt",
            );
        }

        if self.probe_timeout_secs == 0 {
            result.add_error("tools.probe_timeout_secs must be at least 1");
        }

        result
    }
}

impl Validate for DeployConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.auth_timeout_secs == 0 {
            result.add_error("deploy.auth_timeout_secs must be at least 1");
        }

        if self.max_auth_attempts == 0 {
            result.add_warning(
                "deploy.max_auth_attempts = 0 means an unauthenticated CLI aborts the run",
            );
        }

        result
    }
}

impl Validate for ReportConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !self.write_json {
            return result;
        }
        match &self.dir {
            Some(dir) if dir.is_relative() => result.add_warning(format!(
                "report.dir '{}' is relative; it resolves against the working directory",
                dir.display()
            )),
            Some(_) => {}
            None if default_report_dir().is_none() => result
                .add_warning("no per-user state directory found; run reports will not be saved"),
            None => {}
        }

        result
    }
}

impl Validate for PipelineConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        result.merge(self.advisor.validate());
        result.merge(self.tools.validate());
        result.merge(self.deploy.validate());
        result.merge(self.report.validate());
        result
    }
}
