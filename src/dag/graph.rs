// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::task_info::Task;
use crate::engine::TaskId;
use crate::errors::GraphError;

/// How a downstream task depends on an upstream one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeKind {
    /// The upstream must succeed. If it fails or is skipped, the downstream
    /// task is skipped.
    #[default]
    Required,
    /// The upstream only has to finish; its outcome does not matter.
    Optional,
}

/// Directed `upstream -> downstream` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub upstream: TaskId,
    pub downstream: TaskId,
    pub kind: EdgeKind,
}

/// One side of an edge, as seen from the task at the other end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub task: TaskId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Task graph: tasks keyed by id plus the edge set.
///
/// Edges may be added before their endpoints exist; [`validate`] reports
/// dangling references and cycles. The engine refuses to run a graph that
/// does not validate.
///
/// [`validate`]: DependencyGraph::validate
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    edges: Vec<Edge>,
    upstream: HashMap<TaskId, Vec<Dependency>>,
    downstream: HashMap<TaskId, Vec<Dependency>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Ids must be unique.
    pub fn add_task(&mut self, task: Task) -> Result<(), GraphError> {
        if self.index.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Add a required edge: `downstream` runs only after `upstream` succeeded.
    pub fn add_edge(&mut self, upstream: &str, downstream: &str) {
        self.add_edge_with_kind(upstream, downstream, EdgeKind::Required);
    }

    /// Add an optional edge: `downstream` waits for `upstream` to finish,
    /// whatever its outcome.
    pub fn add_optional_edge(&mut self, upstream: &str, downstream: &str) {
        self.add_edge_with_kind(upstream, downstream, EdgeKind::Optional);
    }

    pub fn add_edge_with_kind(&mut self, upstream: &str, downstream: &str, kind: EdgeKind) {
        let exists = self
            .edges
            .iter()
            .any(|e| e.upstream == upstream && e.downstream == downstream);
        if exists {
            return;
        }

        self.edges.push(Edge {
            upstream: upstream.to_string(),
            downstream: downstream.to_string(),
            kind,
        });
        self.upstream
            .entry(downstream.to_string())
            .or_default()
            .push(Dependency {
                task: upstream.to_string(),
                kind,
            });
        self.downstream
            .entry(upstream.to_string())
            .or_default()
            .push(Dependency {
                task: downstream.to_string(),
                kind,
            });
    }

    /// Fan-out: every task in `downstream` depends on `upstream`.
    pub fn fan_out(&mut self, upstream: &str, downstream: &[&str]) {
        for d in downstream {
            self.add_edge(upstream, d);
        }
    }

    /// Fan-in: `downstream` becomes ready only once every task in
    /// `upstream` has succeeded.
    pub fn fan_in(&mut self, upstream: &[&str], downstream: &str) {
        for u in upstream {
            self.add_edge(u, downstream);
        }
    }

    /// Check that every edge references known tasks and that the edge set is
    /// acyclic.
    ///
    /// Cycle detection is a depth-first walk with a visiting/visited marker;
    /// meeting a node that is still being visited means a back-edge.
    pub fn validate(&self) -> Result<(), GraphError> {
        for edge in &self.edges {
            for end in [&edge.upstream, &edge.downstream] {
                if !self.index.contains_key(end) {
                    return Err(GraphError::UnknownTask {
                        upstream: edge.upstream.clone(),
                        downstream: edge.downstream.clone(),
                        missing: end.clone(),
                    });
                }
            }
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for task in &self.tasks {
            if !marks.contains_key(task.id.as_str()) {
                let mut path = Vec::new();
                self.visit(&task.id, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        marks.insert(id, Mark::Visiting);
        path.push(id);

        for dep in self.dependents_of(id) {
            match marks.get(dep.task.as_str()) {
                Some(Mark::Visiting) => {
                    let start = path
                        .iter()
                        .position(|p| *p == dep.task)
                        .unwrap_or(0);
                    let mut cycle: Vec<TaskId> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.task.clone());
                    return Err(GraphError::Cycle { path: cycle });
                }
                Some(Mark::Visited) => {}
                None => self.visit(&dep.task, marks, path)?,
            }
        }

        path.pop();
        marks.insert(id, Mark::Visited);
        Ok(())
    }

    /// Task ids ordered so that every upstream precedes its downstreams.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        self.validate()?;

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for task in &self.tasks {
            graph.add_node(task.id.as_str());
        }
        for edge in &self.edges {
            graph.add_edge(edge.upstream.as_str(), edge.downstream.as_str(), ());
        }

        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(GraphError::Cycle {
                path: vec![cycle.node_id().to_string()],
            }),
        }
    }

    /// All tasks, in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Direct upstream dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[Dependency] {
        self.upstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct downstream dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[Dependency] {
        self.downstream.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks with no upstream dependencies.
    pub fn roots(&self) -> Vec<&TaskId> {
        self.tasks
            .iter()
            .filter(|t| self.dependencies_of(&t.id).is_empty())
            .map(|t| &t.id)
            .collect()
    }

    /// Every task reachable downstream of `id` (excluding `id`).
    pub fn descendants(&self, id: &str) -> HashSet<TaskId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = vec![id];

        while let Some(current) = stack.pop() {
            for dep in self.dependents_of(current) {
                if seen.insert(dep.task.clone()) {
                    stack.push(&dep.task);
                }
            }
        }

        seen.remove(id);
        seen
    }
}
