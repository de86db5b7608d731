//! Error types for the CLI

use entrywatch_common::poll::PollError;
use entrywatch_consul::ConsulError;

use crate::scenario::Phase;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("consul error: {0}")]
    Consul(#[from] ConsulError),

    #[error(transparent)]
    Common(#[from] entrywatch_common::Error),

    #[error("{0}")]
    Convergence(#[from] PollError),

    #[error("invalid configuration: {message}")]
    Validation { message: String },

    #[error("failed to {action} {target}: {message}")]
    Mutation {
        action: &'static str,
        target: String,
        message: String,
    },

    #[error("{phase} failed: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn mutation(
        action: &'static str,
        target: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Error::Mutation {
            action,
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }

    /// Attribute an error to the scenario phase it happened in
    pub fn in_phase(phase: Phase, source: Error) -> Self {
        Error::Phase {
            phase,
            source: Box::new(source),
        }
    }

    /// Phase a scenario failed in, if this error came from one
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
