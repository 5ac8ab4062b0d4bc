use std::time::Duration;

use thiserror::Error;

use crate::reassign::ReassignStage;
use crate::remote::RemoteError;
use crate::types::{EnvironmentId, EnvironmentKey, TaskId, TaskStatus, UnitId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    /// A remote read or write failed. Never retried by the pollers.
    #[error("{operation} failed for {target}: {source}")]
    TransientFetch {
        operation: &'static str,
        target: String,
        #[source]
        source: RemoteError,
    },

    #[error("Task {task_id} ended with status {status}")]
    TerminalTask { task_id: TaskId, status: TaskStatus },

    #[error("Timed out after {timeout:?} waiting for {what} ({polls} polls)")]
    PollTimeout {
        what: String,
        timeout: Duration,
        polls: u32,
    },

    #[error("Cancelled while waiting for {what}")]
    Cancelled { what: String },

    #[error(
        "Cannot move from unit {current} to unit {requested}: allowed targets are [{}]",
        join_ids(.allowed)
    )]
    InvalidPlacement {
        current: UnitId,
        requested: UnitId,
        allowed: Vec<UnitId>,
    },

    #[error("No environment found for {key}")]
    EnvironmentNotFound { key: EnvironmentKey },

    #[error("Environment {key} matches {} environments: [{}]", .matches.len(), join_ids(.matches))]
    AmbiguousEnvironment {
        key: EnvironmentKey,
        matches: Vec<EnvironmentId>,
    },

    #[error("Environment {key} is a member of {actual}, not {expected}")]
    StaleMembership {
        key: EnvironmentKey,
        expected: UnitId,
        actual: UnitId,
    },

    #[error("Environment {key} is not ready (status: {status})")]
    NotReady { key: EnvironmentKey, status: String },

    #[error("Reassignment of {environment} failed at stage {stage}: {source}")]
    Reassign {
        stage: ReassignStage,
        environment: EnvironmentKey,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap a remote failure with the operation and identifier it concerned.
    pub fn remote(operation: &'static str, target: impl ToString, source: RemoteError) -> Self {
        Error::TransientFetch {
            operation,
            target: target.to_string(),
            source,
        }
    }

    /// True for failures an outer retry layer may safely retry: remote calls
    /// that failed in transport, were throttled, or hit a server error.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientFetch { source, .. } => source.is_retryable(),
            Error::Reassign { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// The innermost error, looking through orchestrator stage wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Reassign { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// The orchestrator stage this error was raised at, if any.
    pub fn stage(&self) -> Option<ReassignStage> {
        match self {
            Error::Reassign { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

fn join_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;
