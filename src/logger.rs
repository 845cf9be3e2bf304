use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const APP_DIR: &str = "repo-creator";
const LOG_FILE_NAME: &str = "repo-creator.log";

static GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Install the file logger. Verbosity follows `RUST_LOG`, default `info`.
pub fn init() -> Result<()> {
    if guard_slot().is_some() {
        return Ok(());
    }

    let log_dir = log_dir(
        std::env::var("XDG_STATE_HOME").ok().as_deref(),
        home::home_dir().as_deref(),
    )?;
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory at {}", log_dir.display()))?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    *guard_slot() = Some(guard);
    Ok(())
}

/// Write out buffered log lines and stop the writer thread.
///
/// Statics are never dropped, so this must run before the process exits,
/// including before `std::process::exit`. Events logged afterwards are lost.
pub fn flush() {
    drop(guard_slot().take());
}

fn guard_slot() -> std::sync::MutexGuard<'static, Option<WorkerGuard>> {
    GUARD.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `$XDG_STATE_HOME/repo-creator`, else `~/.local/state/repo-creator`, else the CWD.
fn log_dir(state_home: Option<&str>, home_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(state_home) = state_home
        && !state_home.is_empty()
    {
        return Ok(PathBuf::from(state_home).join(APP_DIR));
    }

    if let Some(home_dir) = home_dir {
        return Ok(home_dir.join(".local").join("state").join(APP_DIR));
    }

    Ok(std::env::current_dir()?)
}
