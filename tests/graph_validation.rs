// tests/graph_validation.rs

use etldag::dag::{DependencyGraph, EdgeKind, Task};
use etldag::errors::GraphError;
use etldag::task::Marker;

fn graph_of(ids: &[&str]) -> DependencyGraph {
    let mut g = DependencyGraph::new();
    for id in ids {
        g.add_task(Task::new(*id, Marker)).unwrap();
    }
    g
}

#[test]
fn acyclic_graph_validates() {
    let mut g = graph_of(&["start", "a", "b", "join"]);
    g.fan_out("start", &["a", "b"]);
    g.fan_in(&["a", "b"], "join");

    assert!(g.validate().is_ok());
    assert_eq!(g.roots(), vec!["start"]);
    assert_eq!(g.dependencies_of("join").len(), 2);
    assert_eq!(g.dependents_of("start").len(), 2);
}

#[test]
fn self_loop_is_a_cycle() {
    let mut g = graph_of(&["a"]);
    g.add_edge("a", "a");

    assert_eq!(
        g.validate(),
        Err(GraphError::Cycle {
            path: vec!["a".into(), "a".into()]
        })
    );
}

#[test]
fn back_edge_into_chain_is_detected() {
    let mut g = graph_of(&["a", "b", "c", "d"]);
    g.add_edge("a", "b");
    g.add_edge("b", "c");
    g.add_edge("c", "d");
    assert!(g.validate().is_ok());

    g.add_edge("d", "b");
    let err = g.validate().unwrap_err();
    match err {
        GraphError::Cycle { path } => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"b".to_string()));
            assert!(path.contains(&"d".to_string()));
        }
        other => panic!("expected cycle, got {other:?}"),
    }
}

#[test]
fn edge_to_unknown_task_is_rejected() {
    let mut g = graph_of(&["a"]);
    g.add_edge("a", "ghost");

    assert_eq!(
        g.validate(),
        Err(GraphError::UnknownTask {
            upstream: "a".into(),
            downstream: "ghost".into(),
            missing: "ghost".into(),
        })
    );
}

#[test]
fn unknown_task_is_reported_before_cycles() {
    let mut g = graph_of(&["a", "b"]);
    g.add_edge("a", "b");
    g.add_edge("b", "a");
    g.add_edge("nope", "a");

    assert!(matches!(g.validate(), Err(GraphError::UnknownTask { .. })));
}

#[test]
fn topological_order_respects_edges() {
    let mut g = graph_of(&["end", "load", "stage_b", "stage_a", "start"]);
    g.fan_out("start", &["stage_a", "stage_b"]);
    g.fan_in(&["stage_a", "stage_b"], "load");
    g.add_edge("load", "end");

    let order = g.topological_order().unwrap();
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    for edge in g.edges() {
        assert!(pos(&edge.upstream) < pos(&edge.downstream), "{edge:?}");
    }
}

#[test]
fn optional_edges_are_typed() {
    let mut g = graph_of(&["a", "b"]);
    g.add_optional_edge("a", "b");
    assert_eq!(g.edges()[0].kind, EdgeKind::Optional);
    assert_eq!(g.dependencies_of("b")[0].kind, EdgeKind::Optional);
}

#[test]
fn error_messages_name_the_tasks() {
    let err = GraphError::Cycle {
        path: vec!["a".into(), "b".into(), "a".into()],
    };
    assert_eq!(err.to_string(), "cycle detected in task graph: a -> b -> a");

    let err = GraphError::UnknownTask {
        upstream: "a".into(),
        downstream: "x".into(),
        missing: "x".into(),
    };
    assert!(err.to_string().contains("unknown task 'x'"));
}
