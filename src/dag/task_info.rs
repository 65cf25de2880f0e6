// src/dag/task_info.rs

//! Task definitions and per-run task state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::retry::RetryPolicy;
use crate::engine::{RunId, TaskId};
use crate::errors::ActionError;
use crate::task::{Loadable, TaskKind};

/// Lifecycle state of a task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A node of the dependency graph.
///
/// The id is fixed once the task is added to a graph; the action is shared
/// between every run of that graph.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub action: Arc<dyn Loadable>,
    pub retry: RetryPolicy,
}

impl Task {
    /// Task with no retries.
    pub fn new(id: impl Into<TaskId>, action: impl Loadable + 'static) -> Self {
        Self::from_arc(id, Arc::new(action))
    }

    pub fn from_arc(id: impl Into<TaskId>, action: Arc<dyn Loadable>) -> Self {
        Self {
            id: id.into(),
            action,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.action.kind()
    }
}

/// Why a task ended up `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipCause {
    /// A required upstream did not succeed. `root` is the task that actually
    /// failed; `upstream` is the direct dependency that blocked this one.
    UpstreamFailed { upstream: TaskId, root: TaskId },
    /// The run was cancelled before the task was dispatched.
    Cancelled,
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::UpstreamFailed { upstream, root } if upstream == root => {
                write!(f, "upstream '{upstream}' failed")
            }
            SkipCause::UpstreamFailed { upstream, root } => {
                write!(f, "upstream '{upstream}' skipped after '{root}' failed")
            }
            SkipCause::Cancelled => f.write_str("run cancelled"),
        }
    }
}

/// Mutable per-run bookkeeping for one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub state: TaskState,
    /// Attempts started so far (0 until the task is dispatched).
    pub attempts: u32,
    pub last_error: Option<ActionError>,
    pub skip_cause: Option<SkipCause>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            attempts: 0,
            last_error: None,
            skip_cause: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A single state change, recorded so the engine can publish it.
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
    pub attempt: u32,
    pub error: Option<ActionError>,
    pub at: DateTime<Utc>,
}

/// Description of a task that the scheduler wants a worker to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub action: Arc<dyn Loadable>,
    pub retry: RetryPolicy,
    pub run_id: RunId,
}

impl ScheduledTask {
    pub fn from_task(task: &Task, run_id: &RunId) -> Self {
        Self {
            id: task.id.clone(),
            kind: task.kind(),
            action: Arc::clone(&task.action),
            retry: task.retry.clone(),
            run_id: run_id.clone(),
        }
    }
}
