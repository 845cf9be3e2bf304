use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, trace};

/// A builder describing a single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    command: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            workdir: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: impl Into<PathBuf>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Process exit code; -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout decoded lossily; command output is not guaranteed to be UTF-8.
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Runs external commands.
///
/// Implementations must not treat a nonzero exit code as an error: callers
/// inspect `CommandOutcome::exit_code`. Only a failure to start the process
/// is reported through `Err`.
pub trait CommandExecutor {
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandOutcome>;
}

/// Executes commands as child processes of the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, cmd: &Cmd) -> io::Result<CommandOutcome> {
        let workdir_display = cmd.working_dir().map(|p| p.display().to_string());
        trace!(
            command = cmd.command(),
            args = ?cmd.arguments(),
            workdir = ?workdir_display,
            "cmd:run start"
        );

        let mut process = Command::new(cmd.command());
        if let Some(dir) = cmd.working_dir() {
            process.current_dir(dir);
        }
        let output = process.args(cmd.arguments()).output()?;

        let outcome = CommandOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if outcome.success() {
            trace!(command = cmd.command(), "cmd:run success");
        } else {
            debug!(
                command = cmd.command(),
                args = ?cmd.arguments(),
                status = outcome.exit_code,
                stderr = %outcome.stderr_lossy().trim(),
                "cmd:run failure"
            );
        }
        Ok(outcome)
    }
}
