// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::time::Duration;

use crate::dag::{Scheduler, SchedulerStep, ScheduledTask};
use crate::engine::{TaskId, TaskOutcome};
use crate::errors::ActionError;
use crate::events::TaskEvent;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Tell the executor to stop starting new attempts.
    BroadcastCancel,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Observability events to publish, in the order the changes happened.
    pub events: Vec<TaskEvent>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn from_scheduler_step(scheduler: &Scheduler, step: SchedulerStep) -> Self {
        let events = step
            .transitions
            .iter()
            .map(|t| TaskEvent::from_transition(scheduler.run_id(), t))
            .collect();

        let mut commands = Vec::new();
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }

        CoreStep {
            commands,
            events,
            keep_running: !scheduler.is_finished(),
        }
    }

    pub fn dispatched_ids(&self) -> Vec<TaskId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks),
                CoreCommand::BroadcastCancel => None,
            })
            .flatten()
            .map(|t| t.id.clone())
            .collect()
    }
}

/// Seed the run with every task that has no upstream.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.start();
    CoreStep::from_scheduler_step(scheduler, step)
}

/// A failed attempt that will be retried: no state change beyond the
/// attempt counter, but it is published.
pub fn handle_attempt_failure(
    scheduler: &mut Scheduler,
    task: TaskId,
    attempt: u32,
    error: ActionError,
    retry_in: Duration,
) -> CoreStep {
    let events = scheduler
        .record_attempt_failure(&task, attempt, error)
        .map(|t| TaskEvent::from_transition(scheduler.run_id(), &t).with_retry_in(retry_in))
        .into_iter()
        .collect();

    CoreStep {
        commands: Vec::new(),
        events,
        keep_running: !scheduler.is_finished(),
    }
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(&task, outcome);
    CoreStep::from_scheduler_step(scheduler, step)
}

/// Cancel the run: skip everything pending and stop retries of in-flight
/// tasks.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    let already_cancelled = scheduler.is_cancelled();
    let step = scheduler.cancel();
    let mut core_step = CoreStep::from_scheduler_step(scheduler, step);
    if !already_cancelled {
        core_step.commands.push(CoreCommand::BroadcastCancel);
    }
    core_step
}
