// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::events::EventSink;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::report::RunResult;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates actual task execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, dispatching tasks to the executor and publishing task events.
/// Worker results are applied here one at a time, so the per-task state map
/// has a single writer.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    sink: Arc<dyn EventSink>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            sink,
        }
    }

    /// Main event loop.
    ///
    /// - Seeds the run with the initial ready set.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Executes commands returned by the core (dispatch tasks, cancel).
    /// - Returns the final report once every task is terminal.
    pub async fn run(mut self) -> Result<RunResult> {
        info!(run_id = %self.core.run_id(), "runtime started");

        let step = self.core.start();
        let mut keep_running = self.apply(step).await?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed before the run finished");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            // Feed the event into the pure core and apply what comes back.
            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        let result = self.core.into_result();
        info!(
            run_id = %result.run_id,
            status = %result.status,
            failed = ?result.failed_tasks(),
            skipped = result.skipped_tasks().len(),
            "runtime exiting"
        );
        Ok(result)
    }

    /// Publish the step's events, then execute its commands.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        for event in &step.events {
            self.sink.emit(event);
        }

        for command in step.commands {
            self.execute_command(command).await?;
        }

        if !step.keep_running {
            info!("all tasks terminal; stopping runtime");
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::BroadcastCancel => {
                info!("cancelling run; in-flight tasks finish their current attempt");
                self.executor.cancel_retries();
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        debug!(?ids, run_id = %self.core.run_id(), "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
