use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::cmd::{Cmd, CommandExecutor, CommandOutcome};
use crate::urls::RemoteUrls;
use crate::workspace::{self, StagingArea, WorkspaceLock};

use super::error::ProvisionError;
use super::types::{
    ProgressReporter, ProvisionResult, ProvisioningConfig, SeedCommit, Step,
};

const GIT: &str = "git";

/// File in the repository root that receives the provenance note
pub const MARKER_FILE: &str = "README.md";

pub const INIT_COMMIT_MESSAGE: &str = "REPO CREATOR: INIT";

/// Collaborators used by a provisioning run
pub struct ProvisionContext<'a> {
    pub executor: &'a dyn CommandExecutor,
    pub progress: &'a dyn ProgressReporter,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, progress: &'a dyn ProgressReporter) -> Self {
        Self { executor, progress }
    }

    fn step<T>(
        &self,
        step: Step,
        detail: &str,
        op: impl FnOnce() -> Result<T, ProvisionError>,
    ) -> Result<T, ProvisionError> {
        debug!(?step, detail, "provision:step start");
        self.progress.step_started(step, detail);
        let result = op();
        self.progress.step_finished(step, result.is_ok());
        if let Err(ref e) = result {
            warn!(?step, error = %e, "provision:step failed");
        }
        result
    }

    fn run(&self, cmd: &Cmd) -> Result<CommandOutcome, ProvisionError> {
        self.executor
            .execute(cmd)
            .map_err(|source| ProvisionError::Spawn {
                command: cmd.to_string(),
                source,
            })
    }

    /// Run a command, turning a nonzero exit into `CommandFailure`.
    fn run_checked(
        &self,
        step: Step,
        cmd: Cmd,
        failure: impl Into<String>,
    ) -> Result<CommandOutcome, ProvisionError> {
        let outcome = self.run(&cmd)?;
        if !outcome.success() {
            return Err(command_failure(step, &cmd, failure.into(), &outcome));
        }
        Ok(outcome)
    }

    /// Like `run_checked`, forwarding the command's stdout to the reporter.
    fn run_reported(
        &self,
        step: Step,
        cmd: Cmd,
        failure: impl Into<String>,
    ) -> Result<(), ProvisionError> {
        let outcome = self.run_checked(step, cmd, failure)?;
        let stdout = outcome.stdout_lossy();
        if !stdout.trim().is_empty() {
            self.progress.command_output(stdout.trim_end());
        }
        Ok(())
    }

    fn current_branch(&self, repo: &Path) -> Result<String, ProvisionError> {
        let outcome = self.run_checked(
            Step::PushToCreate,
            Cmd::new(GIT).args(["branch", "--show-current"]).workdir(repo),
            "Failed to determine the current branch of the template",
        )?;
        let branch = outcome.stdout_lossy().trim().to_string();
        if branch.is_empty() {
            return Err(ProvisionError::State(
                "The cloned template has a detached HEAD; cannot determine which branch to push"
                    .to_string(),
            ));
        }
        Ok(branch)
    }

    fn seed_initial_commit(
        &self,
        repo: &Path,
        template_url: &str,
    ) -> Result<SeedCommit, ProvisionError> {
        let marker = repo.join(MARKER_FILE);
        let note = provenance_note(&Local::now().naive_local(), template_url);
        append_note(&marker, &note)?;

        // A freshly created marker is untracked, and `commit -a` only picks up tracked files.
        self.run_checked(
            Step::SeedInitialCommit,
            Cmd::new(GIT).args(["add", "--", MARKER_FILE]).workdir(repo),
            format!("Failed to stage {}", MARKER_FILE),
        )?;

        let cmd = Cmd::new(GIT)
            .args(["commit", "-am", INIT_COMMIT_MESSAGE])
            .workdir(repo);
        let outcome = self.run(&cmd)?;

        if outcome.success() {
            let stdout = outcome.stdout_lossy();
            if !stdout.trim().is_empty() {
                self.progress.command_output(stdout.trim_end());
            }
            return Ok(SeedCommit::Created);
        }

        if is_nothing_to_commit(&outcome) {
            warn!(path = %repo.display(), "provision:nothing to commit, continuing");
            self.progress.warning(
                "git reported nothing to commit; the provenance note did not change the template",
            );
            return Ok(SeedCommit::NothingToCommit);
        }

        Err(command_failure(
            Step::SeedInitialCommit,
            &cmd,
            "Failed to commit the provenance note".to_string(),
            &outcome,
        ))
    }
}

/// Provision a new remote project from a template repository.
///
/// Steps run strictly in order and the first failure ends the run. Nothing
/// is rolled back: a project created by push-to-create stays on the server,
/// and the staging directory is left in place for inspection.
pub fn provision(
    ctx: &ProvisionContext,
    config: &ProvisioningConfig,
) -> Result<ProvisionResult, ProvisionError> {
    let urls = RemoteUrls::resolve(
        config.dest_base_url(),
        config.namespace(),
        config.project_name(),
    )
    .map_err(|e| {
        ProvisionError::Precondition(format!(
            "Could not build project URLs from '{}' and namespace '{}': {}",
            config.dest_base_url(),
            config.namespace(),
            e
        ))
    })?;
    let push_url = urls.push.to_string();

    info!(
        project = config.project_name(),
        namespace = config.namespace(),
        template = config.template_url(),
        push_url = %push_url,
        target = %config.target_path().display(),
        "provision:start"
    );

    let target_display = config.target_path().display().to_string();
    let (_lock, staging) = ctx.step(Step::ValidateTarget, &target_display, || {
        validate_target(config)
    })?;

    ctx.step(Step::Clone, config.template_url(), || {
        ctx.run_reported(
            Step::Clone,
            Cmd::new(GIT)
                .args(["clone", config.template_url()])
                .workdir(staging.path()),
            format!("Failed to clone template from {}", config.template_url()),
        )
    })?;

    let repo = ctx.step(Step::LocateRepo, "", || workspace::locate_clone(&staging))?;
    let repo_path = repo.path().to_path_buf();
    info!(path = %repo_path.display(), "provision:cloned");

    ctx.step(Step::PullLargeFiles, "", || {
        ctx.run_reported(
            Step::PullLargeFiles,
            Cmd::new(GIT).args(["lfs", "pull"]).workdir(&repo_path),
            "Failed to pull LFS content",
        )
    })?;

    ctx.step(Step::DetachOrigin, "", || {
        ctx.run_reported(
            Step::DetachOrigin,
            Cmd::new(GIT)
                .args(["remote", "remove", "origin"])
                .workdir(&repo_path),
            "Failed to remove the template's origin remote",
        )
    })?;

    let branch = ctx.step(Step::PushToCreate, &push_url, || {
        let branch = ctx.current_branch(&repo_path)?;
        ctx.run_reported(
            Step::PushToCreate,
            Cmd::new(GIT)
                .args(["push", "--set-upstream", push_url.as_str(), branch.as_str()])
                .workdir(&repo_path),
            format!(
                "Failed to create new repository at {} (does it already exist?)",
                push_url
            ),
        )?;
        Ok(branch)
    })?;
    info!(url = %push_url, branch = %branch, "provision:project created");

    ctx.step(Step::AttachOrigin, &push_url, || {
        ctx.run_reported(
            Step::AttachOrigin,
            Cmd::new(GIT)
                .args(["remote", "add", "origin", push_url.as_str()])
                .workdir(&repo_path),
            "Failed to add the new origin remote",
        )
    })?;

    let seed_commit = ctx.step(Step::SeedInitialCommit, "", || {
        ctx.seed_initial_commit(&repo_path, config.template_url())
    })?;

    ctx.step(Step::PushInitialCommit, "", || {
        ctx.run_reported(
            Step::PushInitialCommit,
            Cmd::new(GIT).arg("push").workdir(&repo_path),
            "Failed to push the initial commit",
        )
    })?;

    let project_path = ctx.step(Step::Finalize, "", || {
        workspace::finalize(staging, repo, config.project_name())
    })?;

    info!(
        path = %project_path.display(),
        url = %urls.display,
        ?seed_commit,
        "provision:completed"
    );

    Ok(ProvisionResult {
        project_path,
        project_url: urls.display,
        settings_url: urls.settings,
        namespace_url: urls.namespace,
        template_url: config.template_url().to_string(),
        branch,
        seed_commit,
    })
}

fn validate_target(
    config: &ProvisioningConfig,
) -> Result<(WorkspaceLock, StagingArea), ProvisionError> {
    let lock = WorkspaceLock::acquire(config.target_path())?;

    let destination = config.target_path().join(config.project_name());
    if destination.exists() {
        return Err(ProvisionError::Precondition(format!(
            "Destination {} already exists",
            destination.display()
        )));
    }

    let staging = workspace::prepare(config.target_path())?;
    Ok((lock, staging))
}

/// Text appended to the marker file recording when and from what template
/// the project was generated.
pub fn provenance_note(created_at: &NaiveDateTime, template_url: &str) -> String {
    format!(
        "\n\n---\n\nThis project was created {} by copying {}.",
        created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
        template_url
    )
}

fn append_note(path: &Path, note: &str) -> Result<(), ProvisionError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ProvisionError::io(format!("Failed to open {}", path.display()), e))?;
    file.write_all(note.as_bytes())
        .map_err(|e| ProvisionError::io(format!("Failed to write {}", path.display()), e))
}

fn is_nothing_to_commit(outcome: &CommandOutcome) -> bool {
    let stdout = outcome.stdout_lossy();
    let stderr = outcome.stderr_lossy();
    [stdout, stderr].iter().any(|text| {
        text.contains("nothing to commit") || text.contains("nothing added to commit")
    })
}

fn command_failure(
    step: Step,
    cmd: &Cmd,
    message: String,
    outcome: &CommandOutcome,
) -> ProvisionError {
    ProvisionError::CommandFailure {
        step,
        command: cmd.to_string(),
        message,
        stderr: outcome.stderr_lossy().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::STAGING_DIR_NAME;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    struct SilentProgress;

    impl ProgressReporter for SilentProgress {
        fn step_started(&self, _step: Step, _detail: &str) {}
        fn step_finished(&self, _step: Step, _success: bool) {}
        fn command_output(&self, _output: &str) {}
        fn warning(&self, _message: &str) {}
    }

    /// Fake git: records every invocation and fails the k-th one when scripted.
    struct ScriptedExecutor {
        calls: RefCell<Vec<Cmd>>,
        fail_at: Option<(usize, CommandOutcome)>,
        commit_outcome: Option<CommandOutcome>,
        branch: &'static str,
        clone_dirs: &'static [&'static str],
        spawn_error: bool,
    }

    impl ScriptedExecutor {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_at: None,
                commit_outcome: None,
                branch: "main\n",
                clone_dirs: &["tmpl"],
                spawn_error: false,
            }
        }

        fn failing_at(index: usize, outcome: CommandOutcome) -> Self {
            Self {
                fail_at: Some((index, outcome)),
                ..Self::new()
            }
        }

        fn invoked(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|c| c.arguments().join(" "))
                .collect()
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, cmd: &Cmd) -> io::Result<CommandOutcome> {
            if self.spawn_error {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            let index = self.calls.borrow().len();
            self.calls.borrow_mut().push(cmd.clone());

            if let Some((k, outcome)) = &self.fail_at
                && *k == index
            {
                return Ok(outcome.clone());
            }

            let args = cmd.arguments();
            match args.first().map(String::as_str) {
                Some("clone") => {
                    let dir = cmd.working_dir().expect("clone needs a workdir");
                    for name in self.clone_dirs {
                        fs::create_dir(dir.join(name))?;
                    }
                    Ok(CommandOutcome::default())
                }
                Some("branch") => Ok(CommandOutcome {
                    stdout: self.branch.as_bytes().to_vec(),
                    ..CommandOutcome::default()
                }),
                Some("commit") => Ok(self.commit_outcome.clone().unwrap_or_default()),
                _ => Ok(CommandOutcome::default()),
            }
        }
    }

    fn failure(stderr: &str) -> CommandOutcome {
        CommandOutcome {
            exit_code: 1,
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn scenario_config(target: &Path) -> ProvisioningConfig {
        ProvisioningConfig::new(
            "My Proj",
            "team/",
            "https://host/tmpl.git",
            "https://host/",
            target,
        )
        .unwrap()
    }

    const EXPECTED_CALLS: [&str; 9] = [
        "clone https://host/tmpl.git",
        "lfs pull",
        "remote remove origin",
        "branch --show-current",
        "push --set-upstream https://host/team/My-Proj.git main",
        "remote add origin https://host/team/My-Proj.git",
        "add -- README.md",
        "commit -am REPO CREATOR: INIT",
        "push",
    ];

    #[test]
    fn provisions_project_end_to_end() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let result = provision(&ctx, &scenario_config(temp.path())).unwrap();

        assert_eq!(executor.invoked(), EXPECTED_CALLS);
        assert_eq!(result.project_path, temp.path().join("My-Proj"));
        assert_eq!(result.project_url.as_str(), "https://host/team/My-Proj");
        assert_eq!(
            result.settings_url.as_str(),
            "https://host/team/My-Proj/edit"
        );
        assert_eq!(result.namespace_url.as_str(), "https://host/team/");
        assert_eq!(result.branch, "main");
        assert_eq!(result.seed_commit, SeedCommit::Created);

        let readme = fs::read_to_string(result.project_path.join(MARKER_FILE)).unwrap();
        assert!(readme.contains("by copying https://host/tmpl.git."));
        assert!(!temp.path().join(STAGING_DIR_NAME).exists());
    }

    #[test]
    fn commands_run_in_expected_directories() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        provision(&ctx, &scenario_config(temp.path())).unwrap();

        let calls = executor.calls.borrow();
        let staging = temp.path().join(STAGING_DIR_NAME);
        assert_eq!(calls[0].working_dir(), Some(staging.as_path()));
        for call in calls.iter().skip(1) {
            assert_eq!(call.working_dir(), Some(staging.join("tmpl").as_path()));
            assert_eq!(call.command(), "git");
        }
    }

    #[test]
    fn halts_at_first_failing_command() {
        let expected_steps = [
            Step::Clone,
            Step::PullLargeFiles,
            Step::DetachOrigin,
            Step::PushToCreate,
            Step::PushToCreate,
            Step::AttachOrigin,
            Step::SeedInitialCommit,
            Step::SeedInitialCommit,
            Step::PushInitialCommit,
        ];

        for (k, expected_step) in expected_steps.iter().enumerate() {
            let temp = TempDir::new().unwrap();
            let executor = ScriptedExecutor::failing_at(k, failure("boom"));
            let ctx = ProvisionContext::new(&executor, &SilentProgress);

            let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

            assert_eq!(executor.invoked(), EXPECTED_CALLS[..=k], "failing at {k}");
            assert_eq!(err.step(), Some(*expected_step), "failing at {k}");
            assert!(err.to_string().contains("boom"));
            assert!(temp.path().join(STAGING_DIR_NAME).exists());
            assert!(!temp.path().join("My-Proj").exists());
        }
    }

    #[test]
    fn clone_failure_reports_stderr_and_keeps_staging() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::failing_at(0, failure("auth failed"));
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        assert!(matches!(err, ProvisionError::CommandFailure { step: Step::Clone, .. }));
        assert!(err.to_string().contains("auth failed"));
        assert_eq!(executor.invoked().len(), 1);
        assert!(temp.path().join(STAGING_DIR_NAME).is_dir());
    }

    #[test]
    fn stray_file_in_staging_runs_no_commands() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(STAGING_DIR_NAME);
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("stray.txt"), "x").unwrap();

        let executor = ScriptedExecutor::new();
        let ctx = ProvisionContext::new(&executor, &SilentProgress);
        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        assert!(matches!(err, ProvisionError::Precondition(_)));
        assert!(executor.invoked().is_empty());
        assert!(staging.join("stray.txt").exists());
    }

    #[test]
    fn existing_destination_runs_no_commands() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("My-Proj")).unwrap();

        let executor = ScriptedExecutor::new();
        let ctx = ProvisionContext::new(&executor, &SilentProgress);
        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        assert!(matches!(err, ProvisionError::Precondition(_)));
        assert!(executor.invoked().is_empty());
    }

    #[test]
    fn ambiguous_clone_stops_before_lfs() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor {
            clone_dirs: &["one", "two"],
            ..ScriptedExecutor::new()
        };
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        assert!(matches!(err, ProvisionError::State(_)));
        assert_eq!(executor.invoked(), EXPECTED_CALLS[..1]);
    }

    #[test]
    fn detached_head_stops_before_push() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor {
            branch: "\n",
            ..ScriptedExecutor::new()
        };
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        assert!(matches!(err, ProvisionError::State(_)));
        assert_eq!(executor.invoked(), EXPECTED_CALLS[..4]);
    }

    #[test]
    fn push_to_create_failure_hints_existing_project() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::failing_at(4, failure("rejected"));
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("does it already exist?"));
        assert!(message.contains("https://host/team/My-Proj.git"));
        assert!(message.contains("rejected"));
    }

    #[test]
    fn nothing_to_commit_continues_to_push() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor {
            commit_outcome: Some(CommandOutcome {
                exit_code: 1,
                stdout: b"On branch main\nnothing to commit, working tree clean\n".to_vec(),
                stderr: Vec::new(),
            }),
            ..ScriptedExecutor::new()
        };
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let result = provision(&ctx, &scenario_config(temp.path())).unwrap();

        assert_eq!(result.seed_commit, SeedCommit::NothingToCommit);
        assert_eq!(executor.invoked(), EXPECTED_CALLS);
        assert!(result.project_path.is_dir());
    }

    #[test]
    fn spawn_error_is_reported() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor {
            spawn_error: true,
            ..ScriptedExecutor::new()
        };
        let ctx = ProvisionContext::new(&executor, &SilentProgress);

        let err = provision(&ctx, &scenario_config(temp.path())).unwrap_err();

        match err {
            ProvisionError::Spawn { command, .. } => {
                assert_eq!(command, "git clone https://host/tmpl.git")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provenance_note_format() {
        let created_at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 9, 42)
            .unwrap();
        assert_eq!(
            provenance_note(&created_at, "https://host/tmpl.git"),
            "\n\n---\n\nThis project was created 2024-03-05 14:07:09.000042 by copying https://host/tmpl.git."
        );
    }

    #[test]
    fn note_is_appended_to_existing_marker() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join(MARKER_FILE);
        fs::write(&marker, "# Template").unwrap();

        append_note(&marker, "\n\nnote").unwrap();

        assert_eq!(fs::read_to_string(&marker).unwrap(), "# Template\n\nnote");
    }
}
