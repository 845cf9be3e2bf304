use crate::command::args::CreateArgs;
use crate::{command, config};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(name = "repo-creator")]
#[command(about = "Create a new remote git project from a template repository")]
#[command(subcommand_negates_reqs = true)]
struct Cli {
    /// Path of the JSON defaults file (created if missing)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[command(flatten)]
    create: CreateArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a defaults file with the built-in values
    Init,

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// --- Public Entry Point ---
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::Config::default_path);

    match cli.command {
        Some(Commands::Init) => config::Config::init(&config_path),
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
            Ok(())
        }
        None => command::create::run(cli.create, &config_path),
    }
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
