use anyhow::{Context, Result};
use console::style;
use std::io;
use std::path::Path;
use tracing::{error, info};

use crate::cmd::SystemExecutor;
use crate::config::Config;
use crate::spinner::SpinnerProgress;
use crate::wizard::Wizard;
use crate::workflow::{self, ProvisionContext, ProvisionResult, ProvisioningConfig, SeedCommit};

use super::args::{CreateArgs, ProvisionInputs};

pub fn run(args: CreateArgs, config_path: &Path) -> Result<()> {
    let wizard = args.wizard;

    match create(args, config_path) {
        Ok(result) => {
            print_summary(&result);
            Ok(())
        }
        Err(e) if wizard => {
            error!(error = ?e, "create:failed");
            let mut prompt = Wizard::new(io::stdin().lock(), io::stdout());
            prompt.acknowledge_failure(&format!("{:#}", e))?;
            crate::logger::flush();
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

fn create(args: CreateArgs, config_path: &Path) -> Result<ProvisionResult> {
    let defaults = Config::load_or_init(config_path)?;
    let inputs = ProvisionInputs::resolve(&args, &defaults);

    let inputs = if args.wizard {
        Wizard::new(io::stdin().lock(), io::stdout()).collect(inputs)?
    } else {
        inputs
    };
    let config = inputs.into_config()?;

    ensure_git_available()?;
    provision(&config)
}

fn provision(config: &ProvisioningConfig) -> Result<ProvisionResult> {
    info!(
        project = config.project_name(),
        target = %config.target_path().display(),
        "create:provisioning"
    );
    let progress = SpinnerProgress::new();
    let ctx = ProvisionContext::new(&SystemExecutor, &progress);
    workflow::provision(&ctx, config).map_err(|e| {
        if let Some(step) = e.step() {
            error!(?step, "create:step failed");
        }
        e.into()
    })
}

fn ensure_git_available() -> Result<()> {
    which::which("git").context("git was not found on PATH")?;
    Ok(())
}

fn summary_lines(result: &ProvisionResult) -> Vec<String> {
    let mut lines = vec![
        format!("URL of new project is {}", result.project_url),
        format!(
            "Project visibility is currently set to private, navigate to {} to update it.",
            result.settings_url
        ),
        format!("All code sourced from {}", result.template_url),
        format!(
            "Branch '{}' pushed under {}",
            result.branch, result.namespace_url
        ),
        format!("Local copy at {}", result.project_path.display()),
    ];
    if result.seed_commit == SeedCommit::NothingToCommit {
        lines.push("No provenance commit was created (nothing to commit).".to_string());
    }
    lines
}

fn print_summary(result: &ProvisionResult) {
    println!(
        "{} {}",
        style("✔").green(),
        style("Repository created successfully!").bold()
    );
    for line in summary_lines(result) {
        println!("  {}", line);
    }
}
