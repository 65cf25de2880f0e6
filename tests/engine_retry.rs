// tests/engine_retry.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use etldag::dag::{DependencyGraph, RetryPolicy, Task, TaskState};
use etldag::engine::{Engine, RunStatus};
use etldag::errors::EtlError;
use etldag::events::MemorySink;
use etldag::task::Marker;
use etldag_test_utils::{init_tracing, test_context, with_timeout, FakeWarehouse, ScriptedAction};

type TestResult = Result<(), Box<dyn Error>>;

fn single(action: ScriptedAction, retry: RetryPolicy) -> Arc<DependencyGraph> {
    let mut g = DependencyGraph::new();
    g.add_task(Task::new("start", Marker)).unwrap();
    g.add_task(Task::new("load", action).with_retry(retry)).unwrap();
    g.add_task(Task::new("end", Marker)).unwrap();
    g.add_edge("start", "load");
    g.add_edge("load", "end");
    Arc::new(g)
}

fn ctx() -> etldag::task::RunContext {
    test_context(Arc::new(FakeWarehouse::new()))
}

#[tokio::test]
async fn persistent_failure_runs_retries_plus_one_attempts() -> TestResult {
    init_tracing();

    let action = ScriptedAction::fail_always();
    let graph = single(action.clone(), RetryPolicy::fixed(3, Duration::from_millis(1)));
    let sink = MemorySink::new();

    let result = with_timeout(
        Engine::new(2)
            .with_sink(Arc::new(sink.clone()))
            .run(graph, ctx()),
    )
    .await?;

    assert_eq!(action.calls(), 4);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state_of("load"), Some(TaskState::Failed));
    assert_eq!(result.attempts_of("load"), Some(4));
    assert_eq!(result.state_of("end"), Some(TaskState::Skipped));

    let retries = sink.events_for("load").into_iter().filter(|e| e.is_retry()).count();
    assert_eq!(retries, 3);

    Ok(())
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() -> TestResult {
    init_tracing();

    let action = ScriptedAction::fail_times(2);
    let graph = single(action.clone(), RetryPolicy::fixed(3, Duration::from_millis(1)));

    let result = with_timeout(Engine::new(2).run(graph, ctx())).await?;

    assert!(result.is_success());
    assert_eq!(action.calls(), 3);
    assert_eq!(result.attempts_of("load"), Some(3));
    assert_eq!(result.state_of("end"), Some(TaskState::Succeeded));

    Ok(())
}

#[tokio::test]
async fn no_retry_policy_means_single_attempt() -> TestResult {
    init_tracing();

    let action = ScriptedAction::fail_always();
    let graph = single(action.clone(), RetryPolicy::none());

    let result = with_timeout(Engine::default().run(graph, ctx())).await?;

    assert_eq!(action.calls(), 1);
    assert_eq!(result.attempts_of("load"), Some(1));
    assert_eq!(result.failed_tasks(), vec!["load"]);

    Ok(())
}

#[tokio::test]
async fn exponential_backoff_delays_are_reported() -> TestResult {
    init_tracing();

    let action = ScriptedAction::fail_always();
    let policy = RetryPolicy::exponential(3, Duration::from_millis(2), Duration::from_millis(5));
    let graph = single(action, policy);
    let sink = MemorySink::new();

    with_timeout(
        Engine::new(1)
            .with_sink(Arc::new(sink.clone()))
            .run(graph, ctx()),
    )
    .await?;

    let delays: Vec<u64> = sink
        .events_for("load")
        .into_iter()
        .filter_map(|e| e.retry_in_ms)
        .collect();
    assert_eq!(delays, vec![2, 4, 5]);

    Ok(())
}

#[tokio::test]
async fn panicking_action_is_reported_as_failed() -> TestResult {
    init_tracing();

    let graph = single(ScriptedAction::panicking(), RetryPolicy::fixed(2, Duration::from_millis(1)));

    let result = with_timeout(Engine::new(2).run(graph, ctx())).await?;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state_of("load"), Some(TaskState::Failed));
    let error = result.task("load").and_then(|t| t.last_error.clone()).unwrap_or_default();
    assert!(error.contains("panicked"), "unexpected error: {error}");
    assert_eq!(result.state_of("end"), Some(TaskState::Skipped));

    Ok(())
}

#[tokio::test]
async fn concurrency_is_bounded_by_max_workers() -> TestResult {
    init_tracing();

    let action = ScriptedAction::succeed().with_delay(Duration::from_millis(20));
    let mut g = DependencyGraph::new();
    g.add_task(Task::new("start", Marker))?;
    g.add_task(Task::new("end", Marker))?;
    let loads: Vec<String> = (0..8).map(|i| format!("load_{i}")).collect();
    for id in &loads {
        g.add_task(Task::new(id.clone(), action.clone()))?;
    }
    let ids: Vec<&str> = loads.iter().map(String::as_str).collect();
    g.fan_out("start", &ids);
    g.fan_in(&ids, "end");

    let result = with_timeout(Engine::new(3).run(Arc::new(g), ctx())).await?;

    assert!(result.is_success());
    assert_eq!(action.calls(), 8);
    assert!(action.max_concurrency() <= 3, "ran {} at once", action.max_concurrency());
    assert!(action.max_concurrency() >= 2);

    Ok(())
}

#[tokio::test]
async fn invalid_graph_is_rejected_before_any_task_runs() -> TestResult {
    init_tracing();

    let action = ScriptedAction::succeed();
    let mut g = DependencyGraph::new();
    g.add_task(Task::new("a", action.clone()))?;
    g.add_task(Task::new("b", action.clone()))?;
    g.add_edge("a", "b");
    g.add_edge("b", "a");

    let err = Engine::default().run(Arc::new(g), ctx()).await.unwrap_err();

    assert!(matches!(err, EtlError::Graph(_)), "unexpected error: {err}");
    assert_eq!(action.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn report_lists_every_task_in_dependency_order() -> TestResult {
    init_tracing();

    let graph = single(ScriptedAction::succeed(), RetryPolicy::none());

    let result = with_timeout(Engine::default().run(graph, ctx())).await?;

    let ids: Vec<&str> = result.tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["start", "load", "end"]);
    assert_eq!(result.run_id, "manual__2018-11-03T07:00:00");
    assert!(result.reason().is_none());
    assert!(result.duration() >= chrono::Duration::zero());

    Ok(())
}
