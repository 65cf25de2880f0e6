// src/errors.rs

//! Crate-wide error types.
//!
//! - [`GraphError`]: construction-time problems with the task graph. A run
//!   cannot start while one of these is outstanding.
//! - [`ActionError`]: task-level failures, handled by the retry policy.
//! - [`ExecutionError`]: failures reported by the external warehouse
//!   collaborator; always wrapped in an [`ActionError`].
//! - [`EtlError`]: everything else that can go wrong around a run (config,
//!   IO, schedules).

use thiserror::Error;

use crate::engine::TaskId;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Schedule error: {0}")]
    Schedule(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Problems detected while building or validating a [`DependencyGraph`].
///
/// [`DependencyGraph`]: crate::dag::DependencyGraph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cycle detected in task graph: {}", path.join(" -> "))]
    Cycle {
        /// Task ids along the cycle; the first id is repeated at the end.
        path: Vec<TaskId>,
    },

    #[error("edge '{upstream}' -> '{downstream}' references unknown task '{missing}'")]
    UnknownTask {
        upstream: TaskId,
        downstream: TaskId,
        missing: TaskId,
    },

    #[error("duplicate task id '{0}'")]
    DuplicateTask(TaskId),
}

/// Failure reported by a [`StatementExecutor`](crate::exec::StatementExecutor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("statement on connection '{connection_id}' failed: {message}")]
pub struct ExecutionError {
    pub connection_id: String,
    pub message: String,
}

impl ExecutionError {
    pub fn new(connection_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            message: message.into(),
        }
    }
}

/// Error returned by a single attempt of a task action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The external system rejected or failed the statement.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A data-quality assertion did not hold. Never retried.
    #[error("quality check on '{table}' failed: {reason}")]
    QualityCheckFailure { table: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActionError::Failed(message.into())
    }

    /// `true` for assertion-level failures that a retry cannot fix.
    pub fn is_assertion(&self) -> bool {
        matches!(self, ActionError::QualityCheckFailure { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EtlError>;
