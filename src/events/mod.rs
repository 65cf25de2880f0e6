// src/events/mod.rs

//! Structured task lifecycle events.
//!
//! The engine loop turns every state transition (and every failed attempt
//! that is about to be retried) into a [`TaskEvent`] and hands it to an
//! [`EventSink`]. Only the engine loop emits, so sinks see events in the
//! order the state changes were applied.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::dag::{StateTransition, TaskState};
use crate::engine::{RunId, TaskId};

/// One observable state change of a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEvent {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: TaskState,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a failed attempt will be retried after this delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

impl TaskEvent {
    pub fn from_transition(run_id: &RunId, transition: &StateTransition) -> Self {
        Self {
            run_id: run_id.clone(),
            task_id: transition.task.clone(),
            from: transition.from,
            to: transition.to,
            timestamp: transition.at,
            attempt: transition.attempt,
            error: transition.error.as_ref().map(ToString::to_string),
            retry_in_ms: None,
        }
    }

    pub fn with_retry_in(mut self, delay: Duration) -> Self {
        self.retry_in_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn is_retry(&self) -> bool {
        self.retry_in_ms.is_some()
    }
}

/// Destination for task events.
pub trait EventSink: Send + Sync + fmt::Debug {
    fn emit(&self, event: &TaskEvent);
}

/// Logs every event through `tracing`. The engine default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TaskEvent) {
        match (&event.error, event.retry_in_ms) {
            (Some(error), Some(retry_in_ms)) => warn!(
                target: "etldag::events",
                run_id = %event.run_id,
                task = %event.task_id,
                attempt = event.attempt,
                retry_in_ms,
                %error,
                "attempt failed"
            ),
            (Some(error), None) => warn!(
                target: "etldag::events",
                run_id = %event.run_id,
                task = %event.task_id,
                from = %event.from,
                to = %event.to,
                attempt = event.attempt,
                %error,
                "task state changed"
            ),
            (None, _) => info!(
                target: "etldag::events",
                run_id = %event.run_id,
                task = %event.task_id,
                from = %event.from,
                to = %event.to,
                attempt = event.attempt,
                "task state changed"
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<TaskEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, task: &str) -> Vec<TaskEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.task_id == task)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    out: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: &TaskEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "could not serialise task event");
                return;
            }
        };

        let Ok(mut out) = self.out.lock() else {
            warn!("event sink lock poisoned; dropping event");
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %e, "could not write task event");
        }
    }
}

/// Sends every event to each of the inner sinks.
#[derive(Debug, Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &TaskEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
