// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::dag::graph::{DependencyGraph, EdgeKind};
use crate::dag::task_info::{ScheduledTask, SkipCause, StateTransition, TaskRecord, TaskState};
use crate::engine::{RunId, TaskId};

/// Result of looking at a pending task's upstream states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Every upstream is satisfied; the task may be dispatched.
    Ready,
    /// At least one upstream has not reached a terminal state yet.
    Waiting,
    /// A required upstream failed or was skipped.
    Blocked(SkipCause),
}

/// Applies state transitions to the record map of a single run.
pub struct StateManager<'a> {
    graph: &'a DependencyGraph,
    records: &'a mut HashMap<TaskId, TaskRecord>,
    run_id: &'a RunId,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        records: &'a mut HashMap<TaskId, TaskRecord>,
        run_id: &'a RunId,
    ) -> Self {
        Self {
            graph,
            records,
            run_id,
        }
    }

    /// Evaluate whether `task` can leave `Pending`.
    pub fn readiness(&self, task: &str) -> Readiness {
        ReadOnlyStateManager::new(self.graph, &*self.records).readiness(task)
    }

    /// Skip every pending task that is blocked by a failed or skipped
    /// required upstream, repeating until nothing changes so that skips
    /// reach all transitive descendants.
    pub fn propagate_skips(&mut self) -> Vec<StateTransition> {
        let mut transitions = Vec::new();

        loop {
            let blocked: Vec<(TaskId, SkipCause)> = self
                .graph
                .tasks()
                .filter(|t| self.state_of(&t.id) == Some(TaskState::Pending))
                .filter_map(|t| match self.readiness(&t.id) {
                    Readiness::Blocked(cause) => Some((t.id.clone(), cause)),
                    _ => None,
                })
                .collect();

            if blocked.is_empty() {
                break;
            }

            for (id, cause) in blocked {
                debug!(
                    task = %id,
                    run_id = %self.run_id,
                    cause = %cause,
                    "marking Skipped due to upstream failure"
                );
                if let Some(t) = self.transition(&id, TaskState::Skipped, Some(cause)) {
                    transitions.push(t);
                }
            }
        }

        transitions
    }

    /// Collect pending tasks whose dependencies are satisfied, mark them as
    /// `Running`, and return them for dispatch.
    pub fn collect_new_ready_tasks(&mut self) -> (Vec<ScheduledTask>, Vec<StateTransition>) {
        let candidates: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| self.state_of(&t.id) == Some(TaskState::Pending))
            .filter(|t| self.readiness(&t.id) == Readiness::Ready)
            .map(|t| t.id.clone())
            .collect();

        let graph = self.graph;
        let mut ready = Vec::new();
        let mut transitions = Vec::new();

        for id in candidates {
            let Some(task) = graph.task(&id) else {
                warn!(task = %id, "ready task missing from graph");
                continue;
            };

            info!(
                task = %id,
                run_id = %self.run_id,
                kind = ?task.kind(),
                "dependencies satisfied; dispatching task"
            );

            if let Some(t) = self.transition(&id, TaskState::Running, None) {
                transitions.push(t);
            }
            ready.push(ScheduledTask::from_task(task, self.run_id));
        }

        (ready, transitions)
    }

    /// Mark every pending task as skipped (used on cancellation).
    pub fn skip_all_pending(&mut self, cause: SkipCause) -> Vec<StateTransition> {
        let pending: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| self.state_of(&t.id) == Some(TaskState::Pending))
            .map(|t| t.id.clone())
            .collect();

        pending
            .into_iter()
            .filter_map(|id| self.transition(&id, TaskState::Skipped, Some(cause.clone())))
            .collect()
    }

    /// `true` once no task is pending or running.
    pub fn all_tasks_terminal(&self) -> bool {
        self.records.values().all(|r| r.state.is_terminal())
    }

    fn state_of(&self, task: &str) -> Option<TaskState> {
        self.records.get(task).map(|r| r.state)
    }

    fn transition(
        &mut self,
        task: &str,
        to: TaskState,
        skip_cause: Option<SkipCause>,
    ) -> Option<StateTransition> {
        let record = self.records.get_mut(task)?;
        let from = record.state;
        let now = Utc::now();

        record.state = to;
        match to {
            TaskState::Running => {
                record.started_at = Some(now);
                record.attempts = 1;
            }
            TaskState::Skipped => {
                record.skip_cause = skip_cause;
                record.finished_at = Some(now);
            }
            _ => {}
        }

        Some(StateTransition {
            task: task.to_string(),
            from,
            to,
            attempt: record.attempts,
            error: None,
            at: now,
        })
    }
}

/// Read-only view over the records of a run, for readiness checks from
/// shared references.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a DependencyGraph,
    records: &'a HashMap<TaskId, TaskRecord>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a DependencyGraph, records: &'a HashMap<TaskId, TaskRecord>) -> Self {
        Self { graph, records }
    }

    /// A task is ready exactly when every required upstream `Succeeded` and
    /// every optional upstream is terminal. A failed or skipped required
    /// upstream blocks it, even while other upstreams are still running.
    pub fn readiness(&self, task: &str) -> Readiness {
        let mut waiting = false;

        for dep in self.graph.dependencies_of(task) {
            let Some(record) = self.records.get(&dep.task) else {
                warn!(task = %task, dep = %dep.task, "dependency missing from run records");
                waiting = true;
                continue;
            };

            match (dep.kind, record.state) {
                (EdgeKind::Required, TaskState::Succeeded) => {}
                (EdgeKind::Required, TaskState::Failed) => {
                    return Readiness::Blocked(SkipCause::UpstreamFailed {
                        upstream: dep.task.clone(),
                        root: dep.task.clone(),
                    });
                }
                (EdgeKind::Required, TaskState::Skipped) => {
                    let cause = match &record.skip_cause {
                        Some(SkipCause::UpstreamFailed { root, .. }) => {
                            SkipCause::UpstreamFailed {
                                upstream: dep.task.clone(),
                                root: root.clone(),
                            }
                        }
                        Some(SkipCause::Cancelled) => SkipCause::Cancelled,
                        None => SkipCause::UpstreamFailed {
                            upstream: dep.task.clone(),
                            root: dep.task.clone(),
                        },
                    };
                    return Readiness::Blocked(cause);
                }
                (EdgeKind::Optional, state) if state.is_terminal() => {}
                (_, TaskState::Pending) | (_, TaskState::Running) => waiting = true,
                (EdgeKind::Optional, _) => waiting = true,
            }
        }

        if waiting {
            Readiness::Waiting
        } else {
            Readiness::Ready
        }
    }
}
