// tests/property_scheduler.rs

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use etldag::dag::{DependencyGraph, Scheduler, Task, TaskState};
use etldag::engine::TaskOutcome;
use etldag::errors::{ActionError, GraphError};
use etldag::task::Marker;
use proptest::prelude::*;

/// Random DAG: edges only go from a lower index to a higher one.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<bool>)> {
    (2usize..12).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..n * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect::<Vec<_>>()
        });
        let failing = prop::collection::vec(prop::bool::weighted(0.2), n);
        (Just(n), edges, failing)
    })
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut g = DependencyGraph::new();
    for i in 0..n {
        g.add_task(Task::new(format!("t{i}"), Marker)).unwrap();
    }
    for (a, b) in edges {
        g.add_edge(&format!("t{a}"), &format!("t{b}"));
    }
    g
}

proptest! {
    #[test]
    fn forward_edges_never_form_a_cycle((n, edges, _) in dag_strategy()) {
        let g = build(n, &edges);
        prop_assert!(g.validate().is_ok());
        prop_assert_eq!(g.topological_order().unwrap().len(), n);
    }

    #[test]
    fn any_back_edge_over_a_path_is_a_cycle(n in 2usize..10) {
        let mut g = build(n, &(0..n - 1).map(|i| (i, i + 1)).collect::<Vec<_>>());
        g.add_edge(&format!("t{}", n - 1), "t0");

        let is_cycle = matches!(g.validate(), Err(GraphError::Cycle { .. }));
        prop_assert!(is_cycle);
    }

    #[test]
    fn runs_terminate_and_never_dispatch_behind_a_failure((n, edges, failing) in dag_strategy()) {
        let graph = Arc::new(build(n, &edges));
        let mut scheduler = Scheduler::new(Arc::clone(&graph), "prop");

        let mut running: VecDeque<String> = scheduler.start().scheduled_ids().into();
        let mut dispatched: Vec<String> = running.iter().cloned().collect();
        let mut failed: HashSet<String> = HashSet::new();
        let mut steps = 0;

        while let Some(id) = running.pop_front() {
            steps += 1;
            prop_assert!(steps <= n, "more completions than tasks");

            let idx: usize = id[1..].parse().unwrap();
            let outcome = if failing[idx] {
                failed.insert(id.clone());
                TaskOutcome::Failed { attempts: 1, error: ActionError::failed("boom") }
            } else {
                TaskOutcome::Succeeded { attempts: 1 }
            };

            let step = scheduler.step_completion(&id, outcome);
            for next in step.scheduled_ids() {
                for dep in graph.dependencies_of(&next) {
                    prop_assert_eq!(scheduler.state_of(&dep.task), Some(TaskState::Succeeded));
                }
                dispatched.push(next.clone());
                running.push_back(next);
            }
        }

        prop_assert!(scheduler.is_finished());

        let blocked: HashSet<String> = failed.iter().flat_map(|f| graph.descendants(f)).collect();
        for id in &dispatched {
            prop_assert!(!blocked.contains(id), "{} ran behind a failure", id);
        }
        for id in &blocked {
            prop_assert_eq!(scheduler.state_of(id), Some(TaskState::Skipped));
        }

        let unique: HashSet<&String> = dispatched.iter().collect();
        prop_assert_eq!(unique.len(), dispatched.len());
    }
}
