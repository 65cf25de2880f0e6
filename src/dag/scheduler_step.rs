// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::{ScheduledTask, StateTransition, TaskState};
use crate::engine::TaskId;

/// Structured result of a single scheduler "step".
///
/// Tests use it to step the graph by hand and assert on what changed; the
/// engine turns the transitions into observability events.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready and were marked `Running` in this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Every state change made in this step, in the order applied.
    pub transitions: Vec<StateTransition>,
    /// Whether this step left every task in a terminal state.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub fn newly_failed(&self) -> Vec<TaskId> {
        self.ids_moved_to(TaskState::Failed)
    }

    pub fn newly_skipped(&self) -> Vec<TaskId> {
        self.ids_moved_to(TaskState::Skipped)
    }

    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        self.newly_scheduled.iter().map(|t| t.id.clone()).collect()
    }

    fn ids_moved_to(&self, state: TaskState) -> Vec<TaskId> {
        self.transitions
            .iter()
            .filter(|t| t.to == state)
            .map(|t| t.task.clone())
            .collect()
    }
}
