// src/engine/report.rs

//! Final report of a run.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::{Scheduler, SkipCause, TaskState};
use crate::engine::{RunId, TaskId};
use crate::gate::GateReport;
use crate::task::TaskKind;

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Final state of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    #[serde(skip)]
    pub kind: TaskKind,
    pub state: TaskState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub skip_cause: Option<String>,
    #[serde(skip)]
    pub skip: Option<SkipCause>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A task that ended `Failed`, with its last error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub task: TaskId,
    pub error: String,
}

/// Result of `Engine::run`.
///
/// Every task appears in `tasks`, in topological order; failed and skipped
/// tasks carry their cause.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
    pub failures: Vec<RunFailure>,
    pub gate: GateReport,
    pub cancelled: bool,
}

impl RunResult {
    pub(crate) fn from_scheduler(
        scheduler: &Scheduler,
        check_tables: &HashMap<TaskId, String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let graph = scheduler.graph();
        let order = graph
            .topological_order()
            .unwrap_or_else(|_| graph.tasks().map(|t| t.id.clone()).collect());

        let mut tasks = Vec::with_capacity(order.len());
        let mut failures = Vec::new();
        let mut gate = GateReport::default();

        for id in order {
            let (Some(task), Some(record)) = (graph.task(&id), scheduler.record(&id)) else {
                continue;
            };

            if record.state == TaskState::Failed {
                failures.push(RunFailure {
                    task: id.clone(),
                    error: record
                        .last_error
                        .as_ref()
                        .map_or_else(|| "unknown error".to_string(), ToString::to_string),
                });
            }

            if let Some(table) = check_tables.get(&id) {
                gate.record(&id, table, record);
            }

            tasks.push(TaskReport {
                id: id.clone(),
                kind: task.kind(),
                state: record.state,
                attempts: record.attempts,
                last_error: record.last_error.as_ref().map(ToString::to_string),
                skip_cause: record.skip_cause.as_ref().map(ToString::to_string),
                skip: record.skip_cause.clone(),
                started_at: record.started_at,
                finished_at: record.finished_at,
            });
        }

        let cancelled = scheduler.is_cancelled();
        let status = if !scheduler.is_finished() {
            RunStatus::Running
        } else if cancelled || !failures.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        Self {
            run_id: scheduler.run_id().clone(),
            status,
            started_at,
            finished_at,
            tasks,
            failures,
            gate,
            cancelled,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn task(&self, id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.task(id).map(|t| t.state)
    }

    pub fn attempts_of(&self, id: &str) -> Option<u32> {
        self.task(id).map(|t| t.attempts)
    }

    pub fn failed_tasks(&self) -> Vec<&TaskId> {
        self.ids_in(TaskState::Failed)
    }

    pub fn skipped_tasks(&self) -> Vec<&TaskId> {
        self.ids_in(TaskState::Skipped)
    }

    pub fn succeeded_tasks(&self) -> Vec<&TaskId> {
        self.ids_in(TaskState::Succeeded)
    }

    fn ids_in(&self, state: TaskState) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| &t.id)
            .collect()
    }

    /// Human-readable failure reason; `None` for a successful run.
    ///
    /// Quality-gate failures are listed first and name each failing table.
    pub fn reason(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }

        let mut parts = Vec::new();
        if self.cancelled {
            parts.push("cancelled".to_string());
        }

        let failed_checks: Vec<_> = self.gate.failed_checks().collect();
        if !failed_checks.is_empty() {
            let detail = failed_checks
                .iter()
                .map(|c| match &c.reason {
                    Some(reason) => format!("{} ({reason})", c.table),
                    None => c.table.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("quality gate failed on {detail}"));
        }

        for failure in &self.failures {
            if self.gate.checks.iter().any(|c| c.task_id == failure.task) {
                continue;
            }
            parts.push(format!("task '{}' failed: {}", failure.task, failure.error));
        }

        if parts.is_empty() {
            parts.push(format!("run ended {}", self.status));
        }
        Some(parts.join("; "))
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}: {}", self.run_id, self.status)?;
        for task in &self.tasks {
            write!(f, "  {:<40} {:<10} attempts={}", task.id, task.state.to_string(), task.attempts)?;
            if let Some(err) = &task.last_error {
                write!(f, "  error: {err}")?;
            }
            if let Some(cause) = &task.skip_cause {
                write!(f, "  ({cause})")?;
            }
            writeln!(f)?;
        }
        if let Some(reason) = self.reason() {
            writeln!(f, "reason: {reason}")?;
        }
        Ok(())
    }
}
