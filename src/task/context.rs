// src/task/context.rs

//! Explicit per-run context handed to every task action.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::engine::RunId;
use crate::errors::ExecutionError;
use crate::exec::StatementExecutor;

/// Half-open data interval `[start, end)` a run is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Date partition of the window start, `YYYY-MM-DD`.
    pub fn ds(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Parameters bound for one run, plus the warehouse collaborator.
///
/// Built once per run and passed by reference to every action; nothing is
/// looked up from process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    window: TimeWindow,
    params: BTreeMap<String, String>,
    warehouse: Arc<dyn StatementExecutor>,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<RunId>,
        window: TimeWindow,
        warehouse: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            window,
            params: BTreeMap::new(),
            warehouse,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn warehouse(&self) -> &Arc<dyn StatementExecutor> {
        &self.warehouse
    }

    /// Forward an opaque statement to the warehouse collaborator.
    pub async fn run_statement(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        self.warehouse.run_statement(connection_id, statement).await
    }

    /// Run a count probe through the warehouse collaborator.
    pub async fn query_count(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        self.warehouse.query_count(connection_id, statement).await
    }

    /// Substitute `{{ ds }}`, `{{ year }}`, `{{ month }}`, `{{ day }}`,
    /// `{{ hour }}`, `{{ run_id }}` and `{{ params.<key> }}` in a template.
    ///
    /// Unknown placeholders are left untouched.
    pub fn render(&self, template: &str) -> String {
        let start = self.window.start;
        let mut out = template.to_string();

        let builtins = [
            ("ds", self.window.ds()),
            ("year", format!("{:04}", start.year())),
            ("month", format!("{:02}", start.month())),
            ("day", format!("{:02}", start.day())),
            ("hour", format!("{:02}", start.hour())),
            ("run_id", self.run_id.clone()),
        ];
        for (name, value) in builtins {
            out = replace_placeholder(&out, name, &value);
        }
        for (key, value) in &self.params {
            out = replace_placeholder(&out, &format!("params.{key}"), value);
        }

        out
    }
}

fn replace_placeholder(input: &str, name: &str, value: &str) -> String {
    input
        .replace(&format!("{{{{ {name} }}}}"), value)
        .replace(&format!("{{{{{name}}}}}"), value)
}
