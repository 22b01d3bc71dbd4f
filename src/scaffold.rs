//! Platform configuration files written into the project before deploying.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::project::{ProjectKind, ProjectProfile};

/// Vercel project configuration file.
pub const VERCEL_CONFIG_FILE: &str = "vercel.json";
/// Flask entry module.
pub const FLASK_APP_FILE: &str = "app.py";
/// Where Vercel's Python runtime expects the entry module.
pub const VERCEL_PYTHON_ENTRY: &str = "api/index.py";

/// What happened to a generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaffoldOutcome {
    /// The file did not exist and was written.
    Created,
    /// The file already had the desired content.
    Unchanged,
    /// The file differed and was left alone.
    Preserved,
    /// The file differed and was replaced.
    Overwritten,
}

/// A generated file and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldRecord {
    /// Path relative to the project root.
    pub path: PathBuf,
    /// What happened.
    pub outcome: ScaffoldOutcome,
}

/// Desired Vercel configuration for a project kind, if it needs one.
pub fn vercel_config(kind: ProjectKind) -> Option<Value> {
    match kind {
        ProjectKind::PythonFlask => Some(json!({
            "version": 2,
            "builds": [{ "src": VERCEL_PYTHON_ENTRY, "use": "@vercel/python" }],
            "routes": [{ "src": "/(.*)", "dest": VERCEL_PYTHON_ENTRY }]
        })),
        ProjectKind::Vite => Some(json!({
            "version": 2,
            "builds": [{
                "src": "package.json",
                "use": "@vercel/static-build",
                "config": { "distDir": "dist" }
            }]
        })),
        _ => None,
    }
}

/// Writes `desired` as pretty JSON unless an equal document is already there.
pub fn write_json_file(path: &Path, desired: &Value, overwrite: bool) -> Result<ScaffoldOutcome> {
    let existed = path.exists();
    if existed {
        let current = std::fs::read_to_string(path)?;
        if serde_json::from_str::<Value>(&current).ok().as_ref() == Some(desired) {
            return Ok(ScaffoldOutcome::Unchanged);
        }
        if !overwrite {
            tracing::warn!(path = ?path, "existing file differs from generated config, leaving it untouched");
            return Ok(ScaffoldOutcome::Preserved);
        }
    }

    let mut content = serde_json::to_string_pretty(desired)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    content.push('\n');

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;

    let outcome = if existed {
        ScaffoldOutcome::Overwritten
    } else {
        ScaffoldOutcome::Created
    };
    tracing::info!(path = ?path, outcome = ?outcome, "wrote platform config");
    Ok(outcome)
}

/// Copies `from` to `to` unless `to` already exists. Existing files are
/// never replaced.
fn copy_if_absent(from: &Path, to: &Path) -> Result<Option<ScaffoldOutcome>> {
    if to.exists() {
        let same = std::fs::read(from).ok() == Some(std::fs::read(to)?);
        return Ok(Some(if same {
            ScaffoldOutcome::Unchanged
        } else {
            ScaffoldOutcome::Preserved
        }));
    }
    if !from.is_file() {
        return Ok(None);
    }
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    tracing::info!(from = ?from, to = ?to, "copied entry module");
    Ok(Some(ScaffoldOutcome::Created))
}

/// Writes the files `platform` needs for this project.
///
/// Returns one record per file considered; an empty list means the
/// combination needs nothing.
pub fn prepare(
    profile: &ProjectProfile,
    platform: Platform,
    overwrite: bool,
) -> Result<Vec<ScaffoldRecord>> {
    let mut records = Vec::new();
    if platform != Platform::Vercel {
        return Ok(records);
    }
    let Some(config) = vercel_config(profile.kind) else {
        return Ok(records);
    };

    let outcome = write_json_file(&profile.root.join(VERCEL_CONFIG_FILE), &config, overwrite)?;
    records.push(ScaffoldRecord {
        path: PathBuf::from(VERCEL_CONFIG_FILE),
        outcome,
    });

    if profile.kind == ProjectKind::PythonFlask {
        let copied = copy_if_absent(
            &profile.root.join(FLASK_APP_FILE),
            &profile.root.join(VERCEL_PYTHON_ENTRY),
        )?;
        if let Some(outcome) = copied {
            records.push(ScaffoldRecord {
                path: PathBuf::from(VERCEL_PYTHON_ENTRY),
                outcome,
            });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(dir: &TempDir, kind: ProjectKind) -> ProjectProfile {
        ProjectProfile {
            root: dir.path().to_path_buf(),
            kind,
            markers: vec![],
            manifest: None,
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn flask_on_vercel_writes_config_and_entry() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "from flask import Flask\n").unwrap();

        let records = prepare(&profile(&dir, ProjectKind::PythonFlask), Platform::Vercel, false).unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.outcome == ScaffoldOutcome::Created));
        let config = read_json(&dir.path().join("vercel.json"));
        assert_eq!(config["builds"][0]["use"], "@vercel/python");
        assert_eq!(config["routes"][0]["dest"], "api/index.py");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("api/index.py")).unwrap(),
            "from flask import Flask\n"
        );
    }

    #[test]
    fn flask_without_app_module_only_writes_config() {
        let dir = TempDir::new().unwrap();
        let records = prepare(&profile(&dir, ProjectKind::PythonFlask), Platform::Vercel, false).unwrap();

        assert_eq!(records.len(), 1);
        assert!(!dir.path().join("api").exists());
    }

    #[test]
    fn vite_on_vercel_uses_static_build() {
        let dir = TempDir::new().unwrap();
        prepare(&profile(&dir, ProjectKind::Vite), Platform::Vercel, false).unwrap();

        let config = read_json(&dir.path().join("vercel.json"));
        assert_eq!(config["builds"][0]["use"], "@vercel/static-build");
        assert_eq!(config["builds"][0]["config"]["distDir"], "dist");
    }

    #[test]
    fn other_combinations_write_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(prepare(&profile(&dir, ProjectKind::NextJs), Platform::Vercel, false)
            .unwrap()
            .is_empty());
        assert!(prepare(&profile(&dir, ProjectKind::PythonFlask), Platform::Render, false)
            .unwrap()
            .is_empty());
        assert!(!dir.path().join("vercel.json").exists());
    }

    #[test]
    fn second_run_leaves_files_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "app = 1\n").unwrap();
        let profile = profile(&dir, ProjectKind::PythonFlask);

        prepare(&profile, Platform::Vercel, false).unwrap();
        let modified = std::fs::metadata(dir.path().join("vercel.json"))
            .unwrap()
            .modified()
            .unwrap();
        let records = prepare(&profile, Platform::Vercel, false).unwrap();

        assert!(records.iter().all(|r| r.outcome == ScaffoldOutcome::Unchanged));
        assert_eq!(
            std::fs::metadata(dir.path().join("vercel.json"))
                .unwrap()
                .modified()
                .unwrap(),
            modified
        );
    }

    #[test]
    fn equal_json_with_different_formatting_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vercel.json");
        std::fs::write(
            &path,
            r#"{"routes":[{"dest":"api/index.py","src":"/(.*)"}],"version":2,"builds":[{"use":"@vercel/python","src":"api/index.py"}]}"#,
        )
        .unwrap();

        let desired = vercel_config(ProjectKind::PythonFlask).unwrap();
        assert_eq!(
            write_json_file(&path, &desired, false).unwrap(),
            ScaffoldOutcome::Unchanged
        );
    }

    #[test]
    fn differing_config_is_preserved_unless_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vercel.json");
        std::fs::write(&path, r#"{"version":2,"cleanUrls":true}"#).unwrap();
        let desired = vercel_config(ProjectKind::Vite).unwrap();

        assert_eq!(
            write_json_file(&path, &desired, false).unwrap(),
            ScaffoldOutcome::Preserved
        );
        assert_eq!(read_json(&path)["cleanUrls"], true);

        assert_eq!(
            write_json_file(&path, &desired, true).unwrap(),
            ScaffoldOutcome::Overwritten
        );
        assert_eq!(read_json(&path), desired);
    }

    #[test]
    fn existing_entry_module_is_never_replaced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.py"), "new\n").unwrap();
        std::fs::create_dir_all(dir.path().join("api")).unwrap();
        std::fs::write(dir.path().join("api/index.py"), "custom\n").unwrap();

        let records = prepare(&profile(&dir, ProjectKind::PythonFlask), Platform::Vercel, true).unwrap();

        assert_eq!(records[1].outcome, ScaffoldOutcome::Preserved);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("api/index.py")).unwrap(),
            "custom\n"
        );
    }
}
