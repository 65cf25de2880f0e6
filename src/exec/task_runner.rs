// src/exec/task_runner.rs

//! Runs one scheduled task to its final outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::task::RunContext;

/// Run a task, retrying per its policy, and send exactly one
/// `TaskCompleted` event.
///
/// Every failed attempt that will be retried is reported as
/// `AttemptFailed` first. Once `cancel_rx` flips to `true` no further
/// attempt is started; the last error becomes the final outcome.
pub async fn run_task(
    task: ScheduledTask,
    ctx: Arc<RunContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: watch::Receiver<bool>,
) {
    let id = task.id.clone();
    let outcome = run_attempts(&task, &ctx, &runtime_tx, cancel_rx).await;

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted { task: id.clone(), outcome })
        .await
        .is_err()
    {
        warn!(task = %id, "runtime event channel closed; completion dropped");
    }
}

async fn run_attempts(
    task: &ScheduledTask,
    ctx: &RunContext,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) -> TaskOutcome {
    let mut attempt: u32 = 1;

    loop {
        info!(
            task = %task.id,
            run_id = %task.run_id,
            kind = %task.kind,
            attempt,
            "starting task attempt"
        );

        let error = match task.action.execute(ctx).await {
            Ok(()) => {
                info!(task = %task.id, attempt, "task attempt succeeded");
                return TaskOutcome::Succeeded { attempts: attempt };
            }
            Err(error) => error,
        };

        let retries_made = attempt - 1;
        if !task.retry.should_retry(retries_made, &error) {
            warn!(
                task = %task.id,
                attempt,
                error = %error,
                "task attempt failed; no retries left"
            );
            return TaskOutcome::Failed { attempts: attempt, error };
        }

        let delay = task.retry.delay_for(attempt);
        warn!(
            task = %task.id,
            attempt,
            error = %error,
            retry_in = ?delay,
            "task attempt failed; will retry"
        );

        let event = RuntimeEvent::AttemptFailed {
            task: task.id.clone(),
            attempt,
            error: error.clone(),
            retry_in: delay,
        };
        if runtime_tx.send(event).await.is_err() {
            debug!(task = %task.id, "runtime gone; abandoning retries");
            return TaskOutcome::Failed { attempts: attempt, error };
        }

        if sleep_unless_cancelled(delay, &mut cancel_rx).await {
            info!(task = %task.id, attempt, "run cancelled during backoff; not retrying");
            return TaskOutcome::Failed { attempts: attempt, error };
        }

        attempt += 1;
    }
}

/// Sleep for `delay`; returns `true` if cancellation arrived first.
async fn sleep_unless_cancelled(delay: Duration, cancel_rx: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    tokio::select! {
        _ = &mut sleep => return false,
        cancelled = wait_for_cancel(cancel_rx) => {
            if cancelled {
                return true;
            }
        }
    }

    // Cancel sender dropped: finish the backoff normally.
    sleep.await;
    false
}

/// Resolves `true` once cancellation is signalled, `false` if the sender
/// is dropped first.
async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *cancel_rx.borrow_and_update() {
            return true;
        }
        if cancel_rx.changed().await.is_err() {
            return false;
        }
    }
}
