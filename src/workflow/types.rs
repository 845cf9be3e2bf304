use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use url::Url;

/// Characters that would change the structure of the project URL
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '?', '#', ':'];

/// Namespace characters that would end the URL path (query, fragment) or be
/// rewritten as a path separator
const FORBIDDEN_NAMESPACE_CHARS: &[char] = &['\\', '?', '#'];

/// Inputs of a provisioning run, fixed before the first step starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    project_name: String,
    namespace: String,
    template_url: String,
    dest_base_url: Url,
    target_path: PathBuf,
}

impl ProvisioningConfig {
    pub fn new(
        project_name: &str,
        namespace: &str,
        template_url: &str,
        dest_base_url: &str,
        target_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let project_name = normalize_project_name(project_name)?;
        let namespace = validate_namespace(namespace)?;

        let template_url = template_url.trim();
        if template_url.is_empty() {
            return Err(anyhow!("Template repository URL must not be empty"));
        }

        let dest_base_url = Url::parse(dest_base_url.trim()).map_err(|e| {
            anyhow!(
                "Invalid destination base URL '{}': {}",
                dest_base_url.trim(),
                e
            )
        })?;
        if dest_base_url.cannot_be_a_base() {
            return Err(anyhow!(
                "Destination base URL '{}' cannot be used as a base for project URLs",
                dest_base_url
            ));
        }

        Ok(Self {
            project_name,
            namespace,
            template_url: template_url.to_string(),
            dest_base_url,
            target_path: target_path.into(),
        })
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn template_url(&self) -> &str {
        &self.template_url
    }

    pub fn dest_base_url(&self) -> &Url {
        &self.dest_base_url
    }

    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

/// Trim the name, replace inner spaces with hyphens and drop every trailing
/// `.git`. The result is used verbatim for all project URLs and the local
/// directory name.
pub fn normalize_project_name(raw: &str) -> Result<String> {
    let mut stem = raw.trim();
    while let Some(rest) = stem.strip_suffix(".git") {
        stem = rest;
    }
    let name = stem.replace(' ', "-");

    if name.is_empty() {
        return Err(anyhow!("Project name must not be empty"));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(anyhow!(
            "Project name '{}' contains the invalid character '{}'",
            name,
            c
        ));
    }
    Ok(name)
}

fn validate_namespace(raw: &str) -> Result<String> {
    let namespace = raw.trim();
    if let Some(c) = namespace.chars().find(|c| FORBIDDEN_NAMESPACE_CHARS.contains(c)) {
        return Err(anyhow!(
            "Namespace '{}' contains the invalid character '{}'",
            namespace,
            c
        ));
    }
    Ok(namespace.to_string())
}

/// Steps of the provisioning workflow, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    ValidateTarget,
    Clone,
    LocateRepo,
    PullLargeFiles,
    DetachOrigin,
    PushToCreate,
    AttachOrigin,
    SeedInitialCommit,
    PushInitialCommit,
    Finalize,
}

impl Step {
    pub fn description(&self) -> &'static str {
        match self {
            Step::ValidateTarget => "Checking target directory",
            Step::Clone => "Cloning template",
            Step::LocateRepo => "Locating cloned repository",
            Step::PullLargeFiles => "Pulling LFS content",
            Step::DetachOrigin => "Removing template remote",
            Step::PushToCreate => "Pushing to new project",
            Step::AttachOrigin => "Adding new origin remote",
            Step::SeedInitialCommit => "Adding initial commit",
            Step::PushInitialCommit => "Pushing",
            Step::Finalize => "Moving out of temporary directory",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// What happened when the provenance commit was attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedCommit {
    Created,
    /// git reported nothing to commit; the workflow continued without a new commit
    NothingToCommit,
}

/// Result of a successful provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionResult {
    pub project_path: PathBuf,
    pub project_url: Url,
    pub settings_url: Url,
    pub namespace_url: Url,
    pub template_url: String,
    pub branch: String,
    pub seed_commit: SeedCommit,
}

/// Receives progress notifications from the workflow.
///
/// Keeps the workflow free of terminal handling.
pub trait ProgressReporter {
    fn step_started(&self, step: Step, detail: &str);
    fn step_finished(&self, step: Step, success: bool);
    /// Non-empty stdout of a command that succeeded
    fn command_output(&self, output: &str);
    fn warning(&self, message: &str);
}
