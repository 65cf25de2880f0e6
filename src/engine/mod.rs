// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the per-run DAG scheduler
//! - the executor backend that runs task actions
//! - the main runtime event loop that reacts to:
//!   - failed attempts that will be retried
//!   - task completion events
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]; [`runner`] is the `run(graph, context)`
//! entry point used by the CLI and by tests.

use std::time::Duration;

use crate::errors::ActionError;

/// Canonical task identifier used throughout the engine.
pub type TaskId = String;

/// Identifier of one run of the graph.
pub type RunId = String;

/// Final outcome of a task, after retries, reported to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: ActionError },
    /// The run was cancelled while the task waited for a worker slot; no
    /// attempt was made.
    Cancelled,
}

impl TaskOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            TaskOutcome::Succeeded { attempts } | TaskOutcome::Failed { attempts, .. } => *attempts,
            TaskOutcome::Cancelled => 0,
        }
    }
}

/// Events flowing into the runtime from workers and the caller.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// An attempt failed and the task will be retried after `retry_in`.
    AttemptFailed {
        task: TaskId,
        attempt: u32,
        error: ActionError,
        retry_in: Duration,
    },
    /// A task reached its final outcome.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// Cancel the run (e.g. Ctrl-C).
    CancelRequested,
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod runner;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{RunFailure, RunResult, RunStatus, TaskReport};
pub use runner::{CancelHandle, Engine, PreparedRun};
pub use runtime::Runtime;
