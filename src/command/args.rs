use anyhow::{Result, anyhow};
use std::path::PathBuf;

use crate::config::Config;
use crate::workflow::ProvisioningConfig;

#[derive(clap::Args, Debug, Default)]
pub struct CreateArgs {
    /// Name of the new project. Required unless --wizard is set.
    #[arg(long = "project-name", required_unless_present = "wizard")]
    pub project_name: Option<String>,

    /// Namespace of the project on the server (default from config file)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Template repository to copy into the new project (default from config file)
    #[arg(long = "template-url")]
    pub template_url: Option<String>,

    /// Local directory the new project is placed in
    #[arg(long = "target-path", default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub target_path: PathBuf,

    /// Base URL of the server, without namespace or project (default from config file)
    #[arg(long = "dest-base-url")]
    pub dest_base_url: Option<String>,

    /// Walk through every setting interactively
    #[arg(long)]
    pub wizard: bool,
}

/// Raw provisioning inputs after applying config defaults, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionInputs {
    pub project_name: Option<String>,
    pub namespace: String,
    pub template_url: String,
    pub dest_base_url: String,
    pub target_path: PathBuf,
}

impl ProvisionInputs {
    /// Flags take precedence over the config file defaults.
    pub fn resolve(args: &CreateArgs, defaults: &Config) -> Self {
        Self {
            project_name: args.project_name.clone(),
            namespace: args
                .namespace
                .clone()
                .unwrap_or_else(|| defaults.default_namespace.clone()),
            template_url: args
                .template_url
                .clone()
                .unwrap_or_else(|| defaults.default_template_url.clone()),
            dest_base_url: args
                .dest_base_url
                .clone()
                .unwrap_or_else(|| defaults.default_dest_base_url.clone()),
            target_path: args.target_path.clone(),
        }
    }

    pub fn into_config(self) -> Result<ProvisioningConfig> {
        let project_name = self.project_name.ok_or_else(|| {
            anyhow!("Must supply either a project name, or set the --wizard flag")
        })?;
        ProvisioningConfig::new(
            &project_name,
            &self.namespace,
            &self.template_url,
            &self.dest_base_url,
            self.target_path,
        )
    }
}
