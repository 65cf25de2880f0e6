// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production worker pool here.
//!
//! - `WorkerPoolBackend` is the default implementation used by the engine.
//!   It runs every dispatched task on its own Tokio task, bounded by a
//!   semaphore of `max_workers` permits.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::{ActionError, Result};
use crate::task::RunContext;

use super::task_runner::run_task;

/// Trait abstracting how scheduled tasks are executed.
///
/// Production code uses [`WorkerPoolBackend`]; tests can provide their own
/// implementation that doesn't run real actions.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Every dispatched task must eventually be reported back with exactly
    /// one `RuntimeEvent::TaskCompleted`.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// The run was cancelled: in-flight tasks may finish their current
    /// attempt but must not start another one.
    fn cancel_retries(&mut self) {}
}

/// Bounded worker pool used in production.
pub struct WorkerPoolBackend {
    ctx: Arc<RunContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    permits: Arc<Semaphore>,
    cancel_tx: watch::Sender<bool>,
}

impl WorkerPoolBackend {
    pub fn new(
        ctx: Arc<RunContext>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        max_workers: usize,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            ctx,
            runtime_tx,
            permits: Arc::new(Semaphore::new(max_workers.max(1))),
            cancel_tx,
        }
    }

    fn spawn_one(&self, task: ScheduledTask) {
        let ctx = Arc::clone(&self.ctx);
        let tx = self.runtime_tx.clone();
        let permits = Arc::clone(&self.permits);
        let cancel_rx = self.cancel_tx.subscribe();

        tokio::spawn(async move {
            let id = task.id.clone();

            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(task = %id, error = %e, "worker pool closed before task could start");
                    report_failure(&tx, id, 0, format!("worker pool closed: {e}")).await;
                    return;
                }
            };
            debug!(task = %id, "worker slot acquired");

            if *cancel_rx.borrow() {
                info!(task = %id, "run cancelled while queued; not starting task");
                let event = RuntimeEvent::TaskCompleted {
                    task: id,
                    outcome: TaskOutcome::Cancelled,
                };
                if tx.send(event).await.is_err() {
                    debug!("runtime gone; dropping cancellation report");
                }
                return;
            }

            // The runner gets its own Tokio task so a panicking action is
            // observed here as a JoinError instead of a lost completion.
            let handle = tokio::spawn(run_task(task, ctx, tx.clone(), cancel_rx));
            if let Err(join_err) = handle.await {
                error!(task = %id, error = %join_err, "task worker panicked");
                report_failure(&tx, id, 1, format!("worker panicked: {join_err}")).await;
            }
        });
    }
}

async fn report_failure(
    tx: &mpsc::Sender<RuntimeEvent>,
    task: String,
    attempts: u32,
    message: String,
) {
    let event = RuntimeEvent::TaskCompleted {
        task,
        outcome: TaskOutcome::Failed {
            attempts,
            error: ActionError::failed(message),
        },
    };
    if tx.send(event).await.is_err() {
        debug!("runtime gone; dropping failure report");
    }
}

impl ExecutorBackend for WorkerPoolBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for task in tasks {
                self.spawn_one(task);
            }
            Ok(())
        })
    }

    fn cancel_retries(&mut self) {
        // send_replace succeeds even while no worker is subscribed.
        self.cancel_tx.send_replace(true);
    }
}
