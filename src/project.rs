//! Project inspection.
//!
//! Classifies a directory into a [`ProjectKind`] from its marker files.
//! Inspection never fails: anything unreadable degrades to "signal absent".

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Node package manifest.
pub const MANIFEST_FILE: &str = "package.json";
/// Root markup entry file of a static site.
pub const MARKUP_ENTRY_FILE: &str = "index.html";
/// Python dependency list.
pub const DEPENDENCY_LIST_FILE: &str = "requirements.txt";

/// Kind of web project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    /// Next.js application.
    NextJs,
    /// Vite-built application.
    Vite,
    /// Plain React application.
    React,
    /// Static HTML site.
    StaticSite,
    /// Python Flask application.
    PythonFlask,
    /// Nothing recognizable.
    Unknown,
}

impl ProjectKind {
    /// Returns true if the project has a build step.
    pub fn requires_build(&self) -> bool {
        matches!(self, Self::NextJs | Self::Vite | Self::React)
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NextJs => "Next.js",
            Self::Vite => "Vite",
            Self::React => "React",
            Self::StaticSite => "static site",
            Self::PythonFlask => "Python Flask",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Fields read from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSummary {
    /// Package name, if declared.
    pub name: Option<String>,
    /// Declared runtime dependency names, sorted.
    pub dependencies: Vec<String>,
    /// Declared dev-dependency names, sorted.
    pub dev_dependencies: Vec<String>,
}

impl ManifestSummary {
    fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    fn has_dev_dependency(&self, name: &str) -> bool {
        self.dev_dependencies.iter().any(|d| d == name)
    }
}

/// Result of inspecting a project directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProfile {
    /// Project root.
    pub root: PathBuf,
    /// Detected kind.
    pub kind: ProjectKind,
    /// Signals observed, in check order.
    pub markers: Vec<String>,
    /// Manifest fields, when a parsable manifest exists.
    pub manifest: Option<ManifestSummary>,
}

impl ProjectProfile {
    /// Project name: the manifest name, else the directory name.
    pub fn name(&self) -> String {
        self.manifest
            .as_ref()
            .and_then(|m| m.name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "site".to_string())
    }

    /// Project name usable in URLs and platform project identifiers.
    pub fn slug(&self) -> String {
        sanitize_project_name(&self.name())
    }

    /// One-line summary handed to the advisory oracle.
    pub fn summary(&self) -> String {
        let mut summary = format!("{} project \"{}\"", self.kind, self.name());
        if !self.markers.is_empty() {
            summary.push_str(&format!("; signals: {}", self.markers.join(", ")));
        }
        if let Some(manifest) = &self.manifest {
            if !manifest.dependencies.is_empty() {
                summary.push_str(&format!(
                    "; dependencies: {}",
                    manifest.dependencies.join(", ")
                ));
            }
        }
        summary
    }
}

/// Longest project name every supported platform accepts.
const MAX_PROJECT_NAME_LEN: usize = 58;

/// Reduces a name to `[a-z0-9-]`, the common subset of platform project
/// identifiers.
///
/// Other characters become single dashes, leading and trailing dashes are
/// dropped, and an empty result becomes `site`.
pub fn sanitize_project_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.truncate(MAX_PROJECT_NAME_LEN);
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "site".to_string()
    } else {
        slug.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

impl From<RawManifest> for ManifestSummary {
    fn from(raw: RawManifest) -> Self {
        Self {
            name: raw.name,
            dependencies: raw.dependencies.into_keys().collect(),
            dev_dependencies: raw.dev_dependencies.into_keys().collect(),
        }
    }
}

/// Reads and parses the manifest. Missing or malformed manifests yield `None`.
fn read_manifest(root: &Path) -> Option<ManifestSummary> {
    let path = root.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<RawManifest>(&content) {
        Ok(raw) => Some(raw.into()),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "ignoring malformed manifest");
            None
        }
    }
}

fn is_file(root: &Path, name: &str) -> bool {
    root.join(name).is_file()
}

/// Inspects project directories.
#[derive(Debug, Default, Clone)]
pub struct ProjectInspector;

impl ProjectInspector {
    /// Creates an inspector.
    pub fn new() -> Self {
        Self
    }

    /// Classifies the directory at `root`.
    ///
    /// Checks run in a fixed priority order and the first match wins, so a
    /// Next.js project is never mistaken for React.
    pub fn inspect(&self, root: impl AsRef<Path>) -> ProjectProfile {
        let root = root.as_ref();
        let mut markers = Vec::new();

        let manifest = read_manifest(root);
        if manifest.is_some() {
            markers.push(MANIFEST_FILE.to_string());
        }

        let mut kind = None;
        if let Some(m) = &manifest {
            if m.has_dependency("next") {
                markers.push(format!("{}#dependencies.next", MANIFEST_FILE));
                kind = Some(ProjectKind::NextJs);
            } else if m.has_dev_dependency("vite") {
                markers.push(format!("{}#devDependencies.vite", MANIFEST_FILE));
                kind = Some(ProjectKind::Vite);
            } else if m.has_dependency("react") {
                markers.push(format!("{}#dependencies.react", MANIFEST_FILE));
                kind = Some(ProjectKind::React);
            }
        }

        let kind = kind.unwrap_or_else(|| {
            if is_file(root, MARKUP_ENTRY_FILE) {
                markers.push(MARKUP_ENTRY_FILE.to_string());
                ProjectKind::StaticSite
            } else if is_file(root, DEPENDENCY_LIST_FILE) {
                markers.push(DEPENDENCY_LIST_FILE.to_string());
                ProjectKind::PythonFlask
            } else {
                ProjectKind::Unknown
            }
        });

        tracing::info!(root = ?root, kind = ?kind, markers = ?markers, "inspected project");

        ProjectProfile {
            root: root.to_path_buf(),
            kind,
            markers,
            manifest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().expect("failed to create temp dir");
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).expect("failed to write file");
        }
        dir
    }

    #[test]
    fn detects_nextjs() {
        let dir = project(&[(
            "package.json",
            r#"{"name":"shop","dependencies":{"next":"14.0.0","react":"18.2.0"}}"#,
        )]);
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::NextJs);
        assert_eq!(
            profile.markers,
            vec!["package.json", "package.json#dependencies.next"]
        );
    }

    #[test]
    fn nextjs_takes_precedence_over_react() {
        let dir = project(&[(
            "package.json",
            r#"{"dependencies":{"react":"18.2.0","next":"14.0.0"}}"#,
        )]);
        assert_eq!(
            ProjectInspector::new().inspect(dir.path()).kind,
            ProjectKind::NextJs
        );
    }

    #[test]
    fn detects_vite_from_dev_dependencies() {
        let dir = project(&[(
            "package.json",
            r#"{"name":"app","devDependencies":{"vite":"^5.0.0"}}"#,
        )]);
        assert_eq!(
            ProjectInspector::new().inspect(dir.path()).kind,
            ProjectKind::Vite
        );
    }

    #[test]
    fn vite_in_dependencies_is_not_vite() {
        let dir = project(&[("package.json", r#"{"dependencies":{"vite":"^5.0.0"}}"#)]);
        assert_eq!(
            ProjectInspector::new().inspect(dir.path()).kind,
            ProjectKind::Unknown
        );
    }

    #[test]
    fn detects_react() {
        let dir = project(&[(
            "package.json",
            r#"{"dependencies":{"react":"18.2.0","react-dom":"18.2.0"}}"#,
        )]);
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::React);
        let manifest = profile.manifest.unwrap();
        assert_eq!(manifest.dependencies, vec!["react", "react-dom"]);
    }

    #[test]
    fn detects_static_site() {
        let dir = project(&[("index.html", "<html></html>")]);
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::StaticSite);
        assert_eq!(profile.markers, vec!["index.html"]);
        assert!(profile.manifest.is_none());
    }

    #[test]
    fn detects_flask_from_requirements() {
        let dir = project(&[("requirements.txt", "flask\n"), ("app.py", "")]);
        assert_eq!(
            ProjectInspector::new().inspect(dir.path()).kind,
            ProjectKind::PythonFlask
        );
    }

    #[test]
    fn markup_outranks_dependency_list() {
        let dir = project(&[("index.html", ""), ("requirements.txt", "flask\n")]);
        assert_eq!(
            ProjectInspector::new().inspect(dir.path()).kind,
            ProjectKind::StaticSite
        );
    }

    #[test]
    fn manifest_without_framework_falls_through() {
        let dir = project(&[
            ("package.json", r#"{"dependencies":{"lodash":"4"}}"#),
            ("index.html", ""),
        ]);
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::StaticSite);
        assert_eq!(profile.markers, vec!["package.json", "index.html"]);
    }

    #[test]
    fn malformed_manifest_is_treated_as_absent() {
        let dir = project(&[("package.json", "{ not json"), ("index.html", "")]);
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::StaticSite);
        assert!(profile.manifest.is_none());
        assert_eq!(profile.markers, vec!["index.html"]);
    }

    #[test]
    fn empty_directory_is_unknown() {
        let dir = TempDir::new().unwrap();
        let profile = ProjectInspector::new().inspect(dir.path());

        assert_eq!(profile.kind, ProjectKind::Unknown);
        assert!(profile.markers.is_empty());
    }

    #[test]
    fn missing_directory_is_unknown() {
        let dir = TempDir::new().unwrap();
        let profile = ProjectInspector::new().inspect(dir.path().join("does-not-exist"));
        assert_eq!(profile.kind, ProjectKind::Unknown);
    }

    #[test]
    fn inspection_is_deterministic() {
        let dir = project(&[(
            "package.json",
            r#"{"name":"x","dependencies":{"zeta":"1","alpha":"1","react":"1"},"devDependencies":{"b":"1","a":"1"}}"#,
        )]);
        let inspector = ProjectInspector::new();

        let first = inspector.inspect(dir.path());
        let second = inspector.inspect(dir.path());

        assert_eq!(first, second);
        assert_eq!(
            first.manifest.unwrap().dependencies,
            vec!["alpha", "react", "zeta"]
        );
    }

    #[test]
    fn slugs_are_valid_platform_project_names() {
        assert_eq!(sanitize_project_name("@acme/My_Site"), "acme-my-site");
        assert_eq!(sanitize_project_name(".tmpTYPIc6"), "tmptypic6");
        assert_eq!(sanitize_project_name("  Hello,  World!  "), "hello-world");
        assert_eq!(sanitize_project_name("café"), "caf");
        assert_eq!(sanitize_project_name("@/._"), "site");
        assert_eq!(sanitize_project_name(""), "site");

        let long = sanitize_project_name(&"a-".repeat(40));
        assert!(long.len() <= MAX_PROJECT_NAME_LEN);
        assert!(!long.ends_with('-'));
    }

    #[test]
    fn dot_prefixed_directory_yields_clean_slug() {
        let dir = tempfile::Builder::new().prefix(".Hidden_Dir").tempdir().unwrap();
        let slug = ProjectInspector::new().inspect(dir.path()).slug();

        assert!(slug.starts_with("hidden-dir"));
        assert!(slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn name_prefers_manifest_then_directory() {
        let dir = project(&[("package.json", r#"{"name":"My_Cool App"}"#)]);
        let profile = ProjectInspector::new().inspect(dir.path());
        assert_eq!(profile.name(), "My_Cool App");
        assert_eq!(profile.slug(), "my-cool-app");

        let bare = TempDir::new().unwrap();
        let profile = ProjectInspector::new().inspect(bare.path());
        assert_eq!(
            profile.name(),
            bare.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[test]
    fn summary_mentions_kind_and_signals() {
        let dir = project(&[("package.json", r#"{"name":"web","dependencies":{"react":"1"}}"#)]);
        let summary = ProjectInspector::new().inspect(dir.path()).summary();

        assert!(summary.contains("React project \"web\""));
        assert!(summary.contains("package.json#dependencies.react"));
        assert!(summary.contains("dependencies: react"));
    }
}
