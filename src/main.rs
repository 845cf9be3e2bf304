mod cli;
mod cmd;
mod command;
mod config;
mod logger;
mod spinner;
mod urls;
mod wizard;
mod workflow;
mod workspace;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "repo-creator start");

    let result = cli::run();
    match &result {
        Ok(()) => info!("repo-creator finished successfully"),
        Err(err) => error!(error = ?err, "repo-creator failed"),
    }
    logger::flush();
    result
}
