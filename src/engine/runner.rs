// src/engine/runner.rs

//! `run(graph, context)` entry point.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::{DependencyGraph, Scheduler};
use crate::errors::Result;
use crate::events::{EventSink, TracingSink};
use crate::exec::WorkerPoolBackend;
use crate::task::RunContext;

use super::core::CoreRuntime;
use super::report::RunResult;
use super::runtime::Runtime;
use super::RuntimeEvent;

/// Capacity of the runtime event channel.
const EVENT_BUFFER: usize = 256;

/// Runs graphs on a bounded worker pool.
#[derive(Debug, Clone)]
pub struct Engine {
    max_workers: usize,
    sink: Arc<dyn EventSink>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(4)
    }
}

impl Engine {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Validate the graph and run it to completion.
    ///
    /// Graph errors are returned before any task runs. Task failures do not
    /// make this return `Err`; they are part of the [`RunResult`].
    pub async fn run(&self, graph: Arc<DependencyGraph>, ctx: RunContext) -> Result<RunResult> {
        let (run, _cancel) = self.prepare(graph, ctx)?;
        run.execute().await
    }

    /// Validate and wire up a run without starting it, returning a handle
    /// that can cancel it.
    pub fn prepare(
        &self,
        graph: Arc<DependencyGraph>,
        ctx: RunContext,
    ) -> Result<(PreparedRun, CancelHandle)> {
        graph.validate()?;

        let run_id = ctx.run_id().clone();
        info!(
            run_id = %run_id,
            window = %ctx.window(),
            tasks = graph.len(),
            max_workers = self.max_workers,
            "preparing run"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = WorkerPoolBackend::new(Arc::new(ctx), tx.clone(), self.max_workers);
        let core = CoreRuntime::new(Scheduler::new(graph, run_id));
        let runtime = Runtime::new(core, rx, backend, Arc::clone(&self.sink));

        Ok((PreparedRun { runtime }, CancelHandle { tx }))
    }
}

/// A validated run, ready to execute.
#[derive(Debug)]
pub struct PreparedRun {
    runtime: Runtime<WorkerPoolBackend>,
}

impl PreparedRun {
    pub async fn execute(self) -> Result<RunResult> {
        self.runtime.run().await
    }
}

/// Cancels the run it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Request cancellation. Has no effect once the run has finished.
    pub async fn cancel(&self) {
        if self.tx.send(RuntimeEvent::CancelRequested).await.is_err() {
            debug!("cancel requested after run finished");
        }
    }
}
