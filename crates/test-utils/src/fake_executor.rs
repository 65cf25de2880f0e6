use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use etldag::dag::ScheduledTask;
use etldag::engine::{RuntimeEvent, TaskOutcome};
use etldag::errors::{ActionError, Result};
use etldag::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were "run", in dispatch order
/// - immediately reports each scheduled task's scripted outcome
///   (`Succeeded { attempts: 1 }` unless told otherwise)
/// - never reports tasks marked as held, so tests can cancel mid-run
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    outcomes: HashMap<String, TaskOutcome>,
    held: HashSet<String>,
    cancelled: Arc<AtomicBool>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            outcomes: HashMap::new(),
            held: HashSet::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_outcome(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task.to_string(), outcome);
        self
    }

    /// Report `task` as failed after `attempts` attempts.
    pub fn failing(self, task: &str, attempts: u32) -> Self {
        self.with_outcome(
            task,
            TaskOutcome::Failed {
                attempts,
                error: ActionError::failed(format!("{task} failed")),
            },
        )
    }

    /// Never report completion for `task`.
    pub fn holding(mut self, task: &str) -> Self {
        self.held.insert(task.to_string());
        self
    }

    /// Flag flipped by `cancel_retries`.
    pub fn cancelled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(t.id.clone());
                }

                if self.held.contains(&t.id) {
                    continue;
                }

                let outcome = self
                    .outcomes
                    .get(&t.id)
                    .cloned()
                    .unwrap_or(TaskOutcome::Succeeded { attempts: 1 });

                tx.send(RuntimeEvent::TaskCompleted {
                    task: t.id.clone(),
                    outcome,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_retries(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
