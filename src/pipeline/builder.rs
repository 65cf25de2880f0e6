// src/pipeline/builder.rs

use std::sync::Arc;

use tracing::debug;

use crate::dag::{DependencyGraph, RetryPolicy, Task};
use crate::engine::TaskId;
use crate::errors::GraphError;
use crate::gate::QualityCheck;
use crate::task::{DimensionLoad, FactLoad, Loadable, Marker, StageLoad};

/// Task id prefix of generated quality checks.
pub const CHECK_ID_PREFIX: &str = "Data_quality_check_";

/// Id of the quality check generated for `table`.
pub fn check_id(table: &str) -> TaskId {
    format!("{CHECK_ID_PREFIX}{table}")
}

#[derive(Debug, Clone)]
struct Node {
    id: TaskId,
    action: Arc<dyn Loadable>,
    retry: Option<RetryPolicy>,
}

/// Builds the layered ETL graph:
///
/// ```text
/// start -> stages -> fact -> dimensions -> quality checks -> end
/// ```
///
/// Consecutive layers are fully connected (fan-out then fan-in), so each
/// layer is a barrier. Empty layers are bridged. Every quality check also
/// depends directly on its target load task, so the check never runs
/// against a table whose load did not succeed.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    start_id: TaskId,
    end_id: TaskId,
    stages: Vec<Node>,
    fact: Option<Node>,
    dimensions: Vec<Node>,
    checks: Vec<(TaskId, QualityCheck)>,
    load_retry: RetryPolicy,
    check_retry: RetryPolicy,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            start_id: "Begin_execution".to_string(),
            end_id: "Stop_execution".to_string(),
            stages: Vec::new(),
            fact: None,
            dimensions: Vec::new(),
            checks: Vec::new(),
            load_retry: RetryPolicy::none(),
            check_retry: RetryPolicy::none(),
        }
    }

    pub fn markers(mut self, start: impl Into<TaskId>, end: impl Into<TaskId>) -> Self {
        self.start_id = start.into();
        self.end_id = end.into();
        self
    }

    /// Retry policy for loaders that do not set their own.
    pub fn load_retry(mut self, policy: RetryPolicy) -> Self {
        self.load_retry = policy;
        self
    }

    /// Retry policy for every quality check.
    pub fn check_retry(mut self, policy: RetryPolicy) -> Self {
        self.check_retry = policy;
        self
    }

    pub fn stage(self, id: impl Into<TaskId>, stage: StageLoad) -> Self {
        self.stage_action(id, Arc::new(stage), None)
    }

    pub fn fact(self, id: impl Into<TaskId>, fact: FactLoad) -> Self {
        self.fact_action(id, Arc::new(fact), None)
    }

    pub fn dimension(self, id: impl Into<TaskId>, dimension: DimensionLoad) -> Self {
        self.dimension_action(id, Arc::new(dimension), None)
    }

    /// Staging-layer task with an arbitrary action and optional own policy.
    pub fn stage_action(
        mut self,
        id: impl Into<TaskId>,
        action: Arc<dyn Loadable>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        self.stages.push(Node {
            id: id.into(),
            action,
            retry,
        });
        self
    }

    pub fn fact_action(
        mut self,
        id: impl Into<TaskId>,
        action: Arc<dyn Loadable>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        self.fact = Some(Node {
            id: id.into(),
            action,
            retry,
        });
        self
    }

    pub fn dimension_action(
        mut self,
        id: impl Into<TaskId>,
        action: Arc<dyn Loadable>,
        retry: Option<RetryPolicy>,
    ) -> Self {
        self.dimensions.push(Node {
            id: id.into(),
            action,
            retry,
        });
        self
    }

    /// Add a quality check with id `Data_quality_check_<table>`.
    pub fn check(mut self, check: QualityCheck) -> Self {
        self.checks.push((check_id(&check.table), check));
        self
    }

    /// Add a quality check with an explicit task id.
    pub fn check_with_id(mut self, id: impl Into<TaskId>, check: QualityCheck) -> Self {
        self.checks.push((id.into(), check));
        self
    }

    /// Add a non-zero row-count check for each table. The target of each
    /// check is the loader writing that table.
    pub fn row_count_checks(mut self, connection_id: &str, tables: &[&str]) -> Self {
        for table in tables {
            // An unmatched table becomes an unknown-task error at build time.
            let target = self
                .loader_for_table(table)
                .unwrap_or_else(|| table.to_string());
            self = self.check(QualityCheck::row_count(target, connection_id, *table));
        }
        self
    }

    fn loaders(&self) -> impl Iterator<Item = &Node> {
        self.stages
            .iter()
            .chain(self.fact.iter())
            .chain(self.dimensions.iter())
    }

    fn loader_for_table(&self, table: &str) -> Option<TaskId> {
        self.loaders()
            .find(|n| n.action.table() == Some(table))
            .map(|n| n.id.clone())
    }

    /// Build and validate the graph.
    pub fn build(self) -> Result<DependencyGraph, GraphError> {
        let mut graph = DependencyGraph::new();

        graph.add_task(Task::new(self.start_id.clone(), Marker))?;
        for node in self.loaders() {
            let retry = node.retry.clone().unwrap_or_else(|| self.load_retry.clone());
            graph.add_task(Task::from_arc(node.id.clone(), Arc::clone(&node.action)).with_retry(retry))?;
        }
        for (id, check) in &self.checks {
            graph.add_task(Task::new(id.clone(), check.clone()).with_retry(self.check_retry.clone()))?;
        }
        graph.add_task(Task::new(self.end_id.clone(), Marker))?;

        let ids = |nodes: &[Node]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        let layers: Vec<Vec<TaskId>> = [
            vec![self.start_id.clone()],
            ids(&self.stages),
            self.fact.iter().map(|n| n.id.clone()).collect(),
            ids(&self.dimensions),
        ]
        .into_iter()
        .filter(|layer| !layer.is_empty())
        .collect();

        for pair in layers.windows(2) {
            connect_layers(&mut graph, &pair[0], &pair[1]);
        }

        let barrier = layers.last().cloned().unwrap_or_default();
        let end = vec![self.end_id.clone()];
        if self.checks.is_empty() {
            connect_layers(&mut graph, &barrier, &end);
        } else {
            let check_ids: Vec<TaskId> = self.checks.iter().map(|(id, _)| id.clone()).collect();
            connect_layers(&mut graph, &barrier, &check_ids);
            for (id, check) in &self.checks {
                graph.add_edge(&check.target, id);
            }
            connect_layers(&mut graph, &check_ids, &end);
        }

        debug!(tasks = graph.len(), edges = graph.edges().len(), "pipeline graph built");
        graph.validate()?;
        Ok(graph)
    }
}

fn connect_layers(graph: &mut DependencyGraph, upstream: &[TaskId], downstream: &[TaskId]) {
    for down in downstream {
        let ups: Vec<&str> = upstream.iter().map(String::as_str).collect();
        graph.fan_in(&ups, down);
    }
}
