//! Instruction-only deployments.

use crate::platform::Platform;
use crate::project::{ProjectProfile, DEPENDENCY_LIST_FILE};

use super::{publish_dir, DeploymentResult};

const GIT_DIR: &str = ".git";

/// Produces the steps the operator follows to deploy by hand.
///
/// Never runs a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualStrategy {
    platform: Platform,
}

impl ManualStrategy {
    /// Strategy for a manual platform; `None` for automated ones.
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::GitHubPages | Platform::Render => Some(Self { platform }),
            _ => None,
        }
    }

    /// Numbered instructions for this project.
    pub fn instructions(&self, profile: &ProjectProfile) -> String {
        let steps: Vec<String> = match self.platform {
            Platform::Render => render_steps(profile),
            _ => github_pages_steps(profile),
        };
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Generates the instructions. Always succeeds.
    pub fn deploy(&self, profile: &ProjectProfile) -> DeploymentResult {
        let instructions = self.instructions(profile);
        tracing::info!(platform = ?self.platform, "generated manual deployment instructions");
        DeploymentResult {
            platform: self.platform,
            mode: self.platform.deploy_mode(),
            succeeded: true,
            url: None,
            instructions: Some(instructions),
            raw_output: String::new(),
        }
    }
}

/// Both manual platforms deploy from a GitHub repository, so a project
/// without one starts by creating it.
fn git_steps(profile: &ProjectProfile) -> Vec<String> {
    if profile.root.join(GIT_DIR).exists() {
        return vec!["Push the latest changes to GitHub: `git push`".to_string()];
    }
    vec![
        "Initialize a git repository: `git init`".to_string(),
        "Commit the project: `git add . && git commit -m \"Initial commit\"`".to_string(),
        "Create an empty repository on GitHub, then add it: `git remote add origin <repository-url>`"
            .to_string(),
        "Push it: `git branch -M main && git push -u origin main`".to_string(),
    ]
}

fn github_pages_steps(profile: &ProjectProfile) -> Vec<String> {
    let folder = publish_dir(&profile.root);
    let source = if folder == "." {
        "the repository root (/)".to_string()
    } else {
        format!("the `{}` output (commit it, or move it to /docs)", folder)
    };
    let mut steps = git_steps(profile);
    steps.extend([
        "Open the repository Settings > Pages.".to_string(),
        format!("Select branch 'main' and publish {}.", source),
        "Save, then push changes to trigger a publish.".to_string(),
    ]);
    steps
}

fn render_steps(profile: &ProjectProfile) -> Vec<String> {
    let mut steps = git_steps(profile);
    steps.extend([
        "Sign in at https://render.com.".to_string(),
        "Connect the project's GitHub repository.".to_string(),
    ]);
    if profile.root.join(DEPENDENCY_LIST_FILE).is_file() {
        steps.extend([
            "Create a new Web Service with environment Python.".to_string(),
            format!("Build command: pip install -r {}", DEPENDENCY_LIST_FILE),
            "Start command: gunicorn app:app".to_string(),
        ]);
    } else {
        steps.extend([
            "Create a new Static Site.".to_string(),
            "Build command: leave empty, or `npm run build` for bundled projects.".to_string(),
            format!("Publish directory: {}", publish_dir(&profile.root)),
        ]);
    }
    steps.push("Create the service and wait for the first deploy.".to_string());
    steps
}
