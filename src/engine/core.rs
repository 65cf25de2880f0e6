// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//! - the observability events for the state changes made
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the executor
//! - publishing events to the sink
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, or warehouse.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_attempt_failure, handle_cancel, handle_start, handle_task_completion, CoreStep,
};
use crate::engine::report::RunResult;
use crate::engine::{RunId, RuntimeEvent, TaskId};
use crate::task::TaskKind;

/// Pure core runtime state.
///
/// This owns the per-run scheduler and the run's start time.
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    started_at: DateTime<Utc>,
    /// Table checked by each quality-check task, for the gate report.
    check_tables: HashMap<TaskId, String>,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        let check_tables = scheduler
            .graph()
            .tasks()
            .filter(|t| t.kind() == TaskKind::QualityCheck)
            .map(|t| {
                let table = t.action.table().unwrap_or(t.id.as_str()).to_string();
                (t.id.clone(), table)
            })
            .collect();

        Self {
            scheduler,
            started_at: Utc::now(),
            check_tables,
        }
    }

    pub fn run_id(&self) -> &RunId {
        self.scheduler.run_id()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether every task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Dispatch the initial ready set.
    pub fn start(&mut self) -> CoreStep {
        self.started_at = Utc::now();
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::AttemptFailed {
                task,
                attempt,
                error,
                retry_in,
            } => handle_attempt_failure(&mut self.scheduler, task, attempt, error, retry_in),
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, task, outcome)
            }
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
        }
    }

    /// Build the final report.
    pub fn into_result(self) -> RunResult {
        RunResult::from_scheduler(
            &self.scheduler,
            &self.check_tables,
            self.started_at,
            Utc::now(),
        )
    }
}
