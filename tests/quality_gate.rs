// tests/quality_gate.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use etldag::dag::{RetryPolicy, TaskState};
use etldag::engine::Engine;
use etldag::exec::ShellStatementExecutor;
use etldag::gate::{CheckOutcome, CheckStatus, Checkable, Expectation, QualityCheck};
use etldag::pipeline::{check_id, PipelineBuilder};
use etldag::task::DimensionLoad;
use etldag_test_utils::{init_tracing, test_context, with_timeout, FakeWarehouse};

type TestResult = Result<(), Box<dyn Error>>;

fn users_pipeline(check_retry: RetryPolicy) -> PipelineBuilder {
    PipelineBuilder::new()
        .dimension(
            "Load_user_dim_table",
            DimensionLoad::new("redshift", "dimUser", "SELECT DISTINCT userid FROM staging_events", true),
        )
        .check_retry(check_retry)
        .row_count_checks("redshift", &["dimUser"])
}

#[tokio::test]
async fn checkable_reports_pass_and_fail() -> TestResult {
    let warehouse = FakeWarehouse::new()
        .rows_for("FROM dimUser WHERE", 3)
        .rows_for("FROM dimUser", 0);
    let ctx = test_context(Arc::new(warehouse));

    let empty = QualityCheck::row_count("Load_user_dim_table", "redshift", "dimUser");
    match empty.check(&ctx).await? {
        CheckOutcome::Fail(reason) => assert!(reason.contains("dimUser"), "{reason}"),
        CheckOutcome::Pass => panic!("empty table passed"),
    }

    let nulls = QualityCheck::custom(
        "Load_user_dim_table",
        "redshift",
        "dimUser",
        "SELECT COUNT(*) FROM dimUser WHERE userid IS NULL",
        Expectation::Equals(3),
    );
    assert_eq!(nulls.check(&ctx).await?, CheckOutcome::Pass);

    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn zero_check_errors_when_warehouse_prints_no_count() -> TestResult {
    let warehouse = ShellStatementExecutor::default()
        .with_connection("redshift", "cat >/dev/null; echo 'ERROR: relation does not exist'");
    let ctx = test_context(Arc::new(warehouse));

    let no_null_users = QualityCheck::custom(
        "Load_user_dim_table",
        "redshift",
        "dimUser",
        "SELECT COUNT(*) FROM dimUser WHERE userid IS NULL",
        Expectation::Zero,
    );
    let err = match no_null_users.check(&ctx).await {
        Err(err) => err,
        Ok(outcome) => panic!("unreadable output gave {outcome:?}"),
    };
    assert!(err.to_string().contains("no count in output"), "{err}");

    Ok(())
}

#[tokio::test]
async fn check_sql_is_rendered_with_run_parameters() -> TestResult {
    let warehouse = FakeWarehouse::new();
    let ctx = test_context(Arc::new(warehouse.clone()));

    let check = QualityCheck::custom(
        "Load_time_dim_table",
        "redshift",
        "dimTime",
        "SELECT COUNT(*) FROM dimTime WHERE start_time >= '{{ ds }}'",
        Expectation::NonZero,
    );
    assert_eq!(check.check(&ctx).await?, CheckOutcome::Pass);
    assert_eq!(
        warehouse.statements()[0].1,
        "SELECT COUNT(*) FROM dimTime WHERE start_time >= '2018-11-03'"
    );

    Ok(())
}

#[tokio::test]
async fn connectivity_failure_on_check_is_retried() -> TestResult {
    init_tracing();

    let graph = Arc::new(
        users_pipeline(RetryPolicy::transient_only(2, Duration::from_millis(1))).build()?,
    );
    let warehouse = FakeWarehouse::new().fail_times("SELECT COUNT(*) FROM dimUser", 1);

    let result = with_timeout(
        Engine::new(2).run(graph, test_context(Arc::new(warehouse.clone()))),
    )
    .await?;

    assert!(result.is_success(), "{result}");
    assert_eq!(result.attempts_of(&check_id("dimUser")), Some(2));
    assert_eq!(warehouse.count_matching("SELECT COUNT(*) FROM dimUser"), 2);
    assert!(result.gate.passed());

    Ok(())
}

#[tokio::test]
async fn failed_assertion_ignores_the_retry_budget() -> TestResult {
    init_tracing();

    let graph = Arc::new(
        users_pipeline(RetryPolicy::transient_only(5, Duration::from_millis(1))).build()?,
    );
    let warehouse = FakeWarehouse::new().rows_for("SELECT COUNT(*) FROM dimUser", 0);

    let result = with_timeout(
        Engine::new(2).run(graph, test_context(Arc::new(warehouse.clone()))),
    )
    .await?;

    assert_eq!(result.state_of(&check_id("dimUser")), Some(TaskState::Failed));
    assert_eq!(warehouse.count_matching("SELECT COUNT(*) FROM dimUser"), 1);

    let report = result.gate.get("dimUser").unwrap();
    assert_eq!(report.status, CheckStatus::Failed);
    assert!(report.reason.as_deref().unwrap().contains("got 0"));

    Ok(())
}

#[tokio::test]
async fn unreachable_warehouse_marks_check_errored() -> TestResult {
    init_tracing();

    let graph = Arc::new(users_pipeline(RetryPolicy::none()).build()?);
    let warehouse = FakeWarehouse::new().fail_matching("SELECT COUNT(*)");

    let result = with_timeout(
        Engine::new(2).run(graph, test_context(Arc::new(warehouse))),
    )
    .await?;

    let report = result.gate.get("dimUser").unwrap();
    assert_eq!(report.status, CheckStatus::Errored);
    assert!(!result.gate.passed());
    assert_eq!(result.gate.failed_tables(), vec!["dimUser"]);

    Ok(())
}

#[tokio::test]
async fn checks_are_skipped_when_their_load_fails() -> TestResult {
    init_tracing();

    let graph = Arc::new(users_pipeline(RetryPolicy::none()).build()?);
    let warehouse = FakeWarehouse::new().fail_matching("INSERT INTO dimUser");

    let result = with_timeout(
        Engine::new(2).run(graph, test_context(Arc::new(warehouse.clone()))),
    )
    .await?;

    assert_eq!(result.gate.get("dimUser").map(|c| c.status), Some(CheckStatus::Skipped));
    assert_eq!(warehouse.count_matching("SELECT COUNT(*)"), 0);
    assert!(result.reason().unwrap().contains("Load_user_dim_table"));

    Ok(())
}
