// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dag::graph::DependencyGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, Readiness, StateManager};
use crate::dag::task_info::{SkipCause, StateTransition, TaskRecord, TaskState};
use crate::engine::{RunId, TaskId, TaskOutcome};
use crate::errors::ActionError;

/// Scheduler holds an immutable graph snapshot plus the mutable per-run
/// state of every task.
///
/// It is responsible for:
/// - deciding when a task is "ready" (upstreams satisfied)
/// - marking tasks as running/succeeded/failed
/// - skipping every descendant of a failed task
/// - skipping all pending work when the run is cancelled
///
/// The scheduler is the only place the per-task state map is mutated.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<DependencyGraph>,
    records: HashMap<TaskId, TaskRecord>,
    run_id: RunId,
    cancelled: bool,
}

impl Scheduler {
    /// Create the run state for a validated graph. Every task starts
    /// `Pending`.
    pub fn new(graph: Arc<DependencyGraph>, run_id: impl Into<RunId>) -> Self {
        let records = graph
            .tasks()
            .map(|t| (t.id.clone(), TaskRecord::pending()))
            .collect();

        Self {
            graph,
            records,
            run_id: run_id.into(),
            cancelled: false,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// `true` once every task is `Succeeded`, `Failed` or `Skipped`.
    pub fn is_finished(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.state)
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.records.get(task)
    }

    pub fn records(&self) -> &HashMap<TaskId, TaskRecord> {
        &self.records
    }

    /// Tasks currently dispatched to a worker.
    pub fn in_flight(&self) -> Vec<TaskId> {
        self.graph
            .tasks()
            .filter(|t| self.state_of(&t.id) == Some(TaskState::Running))
            .map(|t| t.id.clone())
            .collect()
    }

    /// Readiness of a task for the current run; `None` if the task is unknown.
    pub fn readiness(&self, task: &str) -> Option<Readiness> {
        if !self.records.contains_key(task) {
            return None;
        }
        Some(ReadOnlyStateManager::new(&self.graph, &self.records).readiness(task))
    }

    /// Dispatch the initial ready set (tasks without upstreams).
    pub fn start(&mut self) -> SchedulerStep {
        info!(
            run_id = %self.run_id,
            tasks = self.records.len(),
            "scheduler: starting run"
        );

        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        let (newly_scheduled, transitions) = manager.collect_new_ready_tasks();
        let run_just_finished = manager.all_tasks_terminal();

        SchedulerStep {
            newly_scheduled,
            transitions,
            run_just_finished,
        }
    }

    /// Apply a task's final outcome and work out what happens next.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut transitions = Vec::new();

        match self.records.get_mut(task) {
            Some(record) if record.state == TaskState::Running => {
                let now = Utc::now();
                let from = record.state;
                record.finished_at = Some(now);

                let (to, attempts, error) = match outcome {
                    TaskOutcome::Succeeded { attempts } => {
                        debug!(task = %task, run_id = %self.run_id, attempts, "task succeeded");
                        (TaskState::Succeeded, attempts, None)
                    }
                    TaskOutcome::Cancelled => {
                        info!(task = %task, run_id = %self.run_id, "task cancelled before its first attempt");
                        record.skip_cause = Some(SkipCause::Cancelled);
                        (TaskState::Skipped, 0, None)
                    }
                    TaskOutcome::Failed { attempts, error } => {
                        warn!(
                            task = %task,
                            run_id = %self.run_id,
                            attempts,
                            error = %error,
                            "task failed; skipping its descendants"
                        );
                        (TaskState::Failed, attempts, Some(error))
                    }
                };

                record.state = to;
                record.attempts = if to == TaskState::Skipped {
                    0
                } else {
                    attempts.max(record.attempts)
                };
                record.last_error = error.clone();

                transitions.push(StateTransition {
                    task: task.to_string(),
                    from,
                    to,
                    attempt: attempts,
                    error,
                    at: now,
                });
            }
            Some(record) => {
                warn!(
                    task = %task,
                    state = %record.state,
                    "completion for task that is not running; ignoring"
                );
                return SchedulerStep {
                    run_just_finished: false,
                    ..SchedulerStep::default()
                };
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return SchedulerStep::default();
            }
        }

        let cancelled = self.cancelled;
        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        transitions.extend(manager.propagate_skips());

        let mut newly_scheduled = Vec::new();
        if !cancelled {
            let (ready, ready_transitions) = manager.collect_new_ready_tasks();
            newly_scheduled = ready;
            transitions.extend(ready_transitions);
        }

        let run_just_finished = manager.all_tasks_terminal();
        if run_just_finished {
            info!(run_id = %self.run_id, "scheduler: all tasks terminal");
        }

        SchedulerStep {
            newly_scheduled,
            transitions,
            run_just_finished,
        }
    }

    /// Record a failed attempt that is about to be retried. The task stays
    /// `Running`.
    pub fn record_attempt_failure(
        &mut self,
        task: &str,
        attempt: u32,
        error: ActionError,
    ) -> Option<StateTransition> {
        let record = self.records.get_mut(task)?;
        if record.state != TaskState::Running {
            warn!(task = %task, state = %record.state, "attempt failure for task that is not running");
            return None;
        }

        record.attempts = record.attempts.max(attempt);
        record.last_error = Some(error.clone());

        Some(StateTransition {
            task: task.to_string(),
            from: TaskState::Running,
            to: TaskState::Running,
            attempt,
            error: Some(error),
            at: Utc::now(),
        })
    }

    /// Cancel the run: nothing new is dispatched and every pending task is
    /// skipped. Running tasks are left to finish their current attempt.
    pub fn cancel(&mut self) -> SchedulerStep {
        if self.cancelled {
            return SchedulerStep {
                run_just_finished: self.is_finished(),
                ..SchedulerStep::default()
            };
        }

        self.cancelled = true;
        info!(
            run_id = %self.run_id,
            in_flight = ?self.in_flight(),
            "scheduler: run cancelled; skipping pending tasks"
        );

        let mut manager = StateManager::new(&self.graph, &mut self.records, &self.run_id);
        let transitions = manager.skip_all_pending(SkipCause::Cancelled);
        let run_just_finished = manager.all_tasks_terminal();

        SchedulerStep {
            newly_scheduled: Vec::new(),
            transitions,
            run_just_finished,
        }
    }
}
