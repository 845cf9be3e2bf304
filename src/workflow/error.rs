use std::io;

use super::types::Step;

/// Failure of a provisioning run.
///
/// None of these are retried. Remote side effects that happened before the
/// failing step (a created project, pushed commits) are not rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The filesystem or inputs were not in a usable state before any git command ran
    #[error("{0}")]
    Precondition(String),

    /// An external command exited with a nonzero status
    #[error("{message}\n{command}: {stderr}")]
    CommandFailure {
        step: Step,
        command: String,
        message: String,
        stderr: String,
    },

    /// An external command could not be started at all
    #[error("Failed to execute command: {command}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The filesystem or repository was left in an unexpected shape by a command
    #[error("{0}")]
    State(String),

    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// The step that failed, when the failure came from a command
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::CommandFailure { step, .. } => Some(*step),
            _ => None,
        }
    }
}
