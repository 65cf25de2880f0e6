// tests/runtime_fake_executor.rs

use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use std::time::Duration;

use etldag::dag::{DependencyGraph, Scheduler, Task, TaskState};
use etldag::engine::{CoreRuntime, RunStatus, Runtime, RuntimeEvent, TaskOutcome};
use etldag::errors::ActionError;
use etldag::events::MemorySink;
use etldag::task::Marker;
use etldag_test_utils::{init_tracing, with_timeout, FakeExecutor};
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn Error>>;

/// `start -> {load_a, load_b} -> check -> end`
fn pipeline_graph() -> Arc<DependencyGraph> {
    let mut g = DependencyGraph::new();
    for id in ["start", "load_a", "load_b", "check", "end"] {
        g.add_task(Task::new(id, Marker)).unwrap();
    }
    g.fan_out("start", &["load_a", "load_b"]);
    g.fan_in(&["load_a", "load_b"], "check");
    g.add_edge("check", "end");
    Arc::new(g)
}

/// Wait until the executor has been handed `n` tasks.
async fn wait_for_dispatch(executed: &Arc<Mutex<Vec<String>>>, n: usize) {
    while executed.lock().unwrap().len() < n {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn all_tasks_run_once_in_dependency_order() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(32);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx, Arc::clone(&executed));
    let sink = MemorySink::new();

    let core = CoreRuntime::new(Scheduler::new(pipeline_graph(), "run-ok"));
    let runtime = Runtime::new(core, rx, executor, Arc::new(sink.clone()));
    let result = with_timeout(runtime.run()).await?;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert!(result.is_success());

    let order = executed.lock().unwrap().clone();
    assert_eq!(order.len(), 5);
    assert_eq!(order.first().map(String::as_str), Some("start"));
    assert_eq!(order.last().map(String::as_str), Some("end"));
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(pos("load_a") < pos("check"));
    assert!(pos("load_b") < pos("check"));

    let end_events = sink.events_for("end");
    assert_eq!(
        end_events.iter().map(|e| e.to).collect::<Vec<_>>(),
        vec![TaskState::Running, TaskState::Succeeded]
    );
    assert!(sink.events().iter().all(|e| e.run_id == "run-ok"));

    Ok(())
}

#[tokio::test]
async fn failed_branch_skips_downstream_but_not_sibling() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(32);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx, Arc::clone(&executed)).failing("load_b", 4);
    let sink = MemorySink::new();

    let core = CoreRuntime::new(Scheduler::new(pipeline_graph(), "run-fail"));
    let result = with_timeout(Runtime::new(core, rx, executor, Arc::new(sink.clone())).run()).await?;

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state_of("load_a"), Some(TaskState::Succeeded));
    assert_eq!(result.state_of("load_b"), Some(TaskState::Failed));
    assert_eq!(result.attempts_of("load_b"), Some(4));
    assert_eq!(result.state_of("check"), Some(TaskState::Skipped));
    assert_eq!(result.state_of("end"), Some(TaskState::Skipped));

    let executed = executed.lock().unwrap().clone();
    assert!(!executed.contains(&"check".to_string()));
    assert!(!executed.contains(&"end".to_string()));

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].task, "load_b");
    assert!(result.reason().unwrap().contains("load_b"));

    let skipped = sink.events_for("check");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].from, TaskState::Pending);
    assert_eq!(skipped[0].to, TaskState::Skipped);

    Ok(())
}

#[tokio::test]
async fn retry_events_are_published_without_leaving_running() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(32);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed))
        .holding("load_a");
    let sink = MemorySink::new();

    let core = CoreRuntime::new(Scheduler::new(pipeline_graph(), "run-retry"));
    let handle = tokio::spawn(Runtime::new(core, rx, executor, Arc::new(sink.clone())).run());
    with_timeout(wait_for_dispatch(&executed, 3)).await;

    tx.send(RuntimeEvent::AttemptFailed {
        task: "load_a".into(),
        attempt: 1,
        error: ActionError::failed("connection reset"),
        retry_in: Duration::from_millis(10),
    })
    .await?;
    tx.send(RuntimeEvent::TaskCompleted {
        task: "load_a".into(),
        outcome: TaskOutcome::Succeeded { attempts: 2 },
    })
    .await?;

    let result = with_timeout(handle).await??;

    assert!(result.is_success());
    assert_eq!(result.attempts_of("load_a"), Some(2));

    let retries: Vec<_> = sink.events_for("load_a").into_iter().filter(|e| e.is_retry()).collect();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].from, TaskState::Running);
    assert_eq!(retries[0].to, TaskState::Running);
    assert_eq!(retries[0].retry_in_ms, Some(10));
    assert_eq!(retries[0].error.as_deref(), Some("connection reset"));

    Ok(())
}

#[tokio::test]
async fn cancel_skips_pending_and_broadcasts_once() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel(32);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed))
        .holding("load_a")
        .holding("load_b");
    let cancelled = executor.cancelled_flag();

    let core = CoreRuntime::new(Scheduler::new(pipeline_graph(), "run-cancel"));
    let handle = tokio::spawn(Runtime::new(core, rx, executor, Arc::new(MemorySink::new())).run());
    with_timeout(wait_for_dispatch(&executed, 3)).await;

    tx.send(RuntimeEvent::CancelRequested).await?;
    tx.send(RuntimeEvent::CancelRequested).await?;
    for task in ["load_a", "load_b"] {
        tx.send(RuntimeEvent::TaskCompleted {
            task: task.into(),
            outcome: TaskOutcome::Succeeded { attempts: 1 },
        })
        .await?;
    }

    let result = with_timeout(handle).await??;

    assert!(cancelled.load(Ordering::SeqCst));
    assert!(result.cancelled);
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.reason().as_deref(), Some("cancelled"));
    assert_eq!(result.state_of("load_a"), Some(TaskState::Succeeded));
    assert_eq!(result.state_of("check"), Some(TaskState::Skipped));
    assert_eq!(result.state_of("end"), Some(TaskState::Skipped));
    assert_eq!(executed.lock().unwrap().len(), 3);

    Ok(())
}
