use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use etldag::errors::{ActionError, ExecutionError};
use etldag::task::{Loadable, RunContext};

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU32,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// Test action with scripted behaviour.
///
/// Clones share counters, so a test can keep one clone and put another in
/// the graph.
#[derive(Debug, Clone)]
pub struct ScriptedAction {
    counters: Arc<Counters>,
    /// Attempts that fail before the action starts succeeding.
    fail_first: u32,
    delay: Duration,
    panics: bool,
}

impl ScriptedAction {
    pub fn succeed() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_first: 0,
            delay: Duration::ZERO,
            panics: false,
        }
    }

    pub fn fail_always() -> Self {
        Self {
            fail_first: u32::MAX,
            ..Self::succeed()
        }
    }

    pub fn fail_times(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::succeed()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Self::succeed()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.counters.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.counters.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Loadable for ScriptedAction {
    async fn execute(&self, _ctx: &RunContext) -> Result<(), ActionError> {
        let call = self.counters.calls.fetch_add(1, Ordering::SeqCst);

        let now_running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_running
            .fetch_max(now_running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.running.fetch_sub(1, Ordering::SeqCst);

        if self.panics {
            panic!("scripted panic");
        }

        if call < self.fail_first {
            return Err(ExecutionError::new("scripted", format!("attempt {} failed", call + 1)).into());
        }
        Ok(())
    }
}
