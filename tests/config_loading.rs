// tests/config_loading.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use etldag::config::{load_and_validate, parse_str, ConfigFile};
use etldag::dag::{EdgeKind, RetryCondition};
use etldag::errors::EtlError;
use etldag::gate::Expectation;
use etldag::pipeline::{check_id, from_config};
use etldag::task::TaskKind;
use etldag::types::BackoffStrategy;
use etldag_test_utils::ConfigFileBuilder;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

const SPARKIFY_TOML: &str = r#"
[pipeline]
name = "sparkify_etl"
schedule = "0 * * * *"
max_workers = 3

[defaults]
retries = 3
retry_delay = "5m"

[connection.redshift]
cmd = "psql -At"

[stage.Stage_events]
table = "staging_events"
s3_bucket = "udacity-dend"
s3_key = "log-data/{{ year }}/{{ month }}/"
format = "JSON 's3://udacity-dend/log_json_path.json'"
region = "us-west-2"

[stage.Stage_songs]
table = "staging_songs"
s3_bucket = "udacity-dend"
s3_key = "song-data/A/A/A/"
retries = 1

[fact]
id = "Load_songplays_fact_table"
table = "factSongPlay"
query = "SELECT playid FROM staging_events"

[dimension.Load_user_dim_table]
table = "dimUser"
query = "SELECT DISTINCT userid FROM staging_events"
truncate = true

[dimension.Load_time_dim_table]
table = "dimTime"
query = "SELECT start_time FROM factSongPlay"

[quality]
tables = ["staging_events", "factSongPlay", "dimUser"]
transient_retries = 2
retry_delay = "10s"

[[quality.check]]
table = "dimUser"
sql = "SELECT COUNT(*) FROM dimUser WHERE userid IS NULL"
expect = "zero"
"#;

#[test]
fn full_config_loads_from_disk() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Pipeline.toml");
    fs::write(&path, SPARKIFY_TOML)?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.pipeline.name, "sparkify_etl");
    assert_eq!(cfg.pipeline.max_workers, 3);
    assert_eq!(cfg.load_retry().retries_allowed, 3);
    assert_eq!(cfg.load_retry().retry_delay, Duration::from_secs(300));
    assert_eq!(cfg.load_retry().backoff, BackoffStrategy::Fixed);
    assert_eq!(cfg.check_retry().retries_allowed, 2);
    assert_eq!(cfg.check_retry().retry_on, RetryCondition::ExecutionErrorsOnly);
    assert_eq!(cfg.schedule().map(|s| s.expression()), Some("0 * * * *"));
    assert_eq!(cfg.loader_for_table("dimUser"), Some("Load_user_dim_table"));
    assert_eq!(cfg.quality.check[0].expect, Expectation::Zero);

    Ok(())
}

#[test]
fn config_graph_has_the_layered_shape() -> TestResult {
    let cfg = ConfigFile::try_from(parse_str(SPARKIFY_TOML)?)?;
    let graph = from_config(&cfg)?;

    // 2 markers, 5 loaders, 3 row-count checks, 1 custom check.
    assert_eq!(graph.len(), 11);

    let order = graph.topological_order()?;
    assert_eq!(order.first().map(String::as_str), Some("Begin_execution"));
    assert_eq!(order.last().map(String::as_str), Some("Stop_execution"));

    let mut fact_upstreams: Vec<&str> = graph
        .dependencies_of("Load_songplays_fact_table")
        .iter()
        .map(|d| d.task.as_str())
        .collect();
    fact_upstreams.sort();
    assert_eq!(fact_upstreams, vec!["Stage_events", "Stage_songs"]);

    let check = check_id("staging_events");
    let deps: Vec<&str> = graph.dependencies_of(&check).iter().map(|d| d.task.as_str()).collect();
    assert!(deps.contains(&"Stage_events"));
    assert!(deps.contains(&"Load_user_dim_table"));
    assert!(deps.contains(&"Load_time_dim_table"));
    assert!(graph.edges().iter().all(|e| e.kind == EdgeKind::Required));

    let custom = format!("{}_1", check_id("dimUser"));
    assert_eq!(graph.task(&custom).map(|t| t.kind()), Some(TaskKind::QualityCheck));
    assert_eq!(
        graph.dependencies_of("Stop_execution").len(),
        4,
        "end waits on every check"
    );

    let songs = graph.task("Stage_songs").unwrap();
    assert_eq!(songs.retry.retries_allowed, 1);
    assert_eq!(songs.retry.retry_delay, Duration::from_secs(300));
    let events = graph.task("Stage_events").unwrap();
    assert_eq!(events.retry.retries_allowed, 3);
    let check = graph.task(&check_id("dimUser")).unwrap();
    assert_eq!(check.retry.retry_on, RetryCondition::ExecutionErrorsOnly);

    Ok(())
}

#[test]
fn defaults_fill_in_missing_sections() -> TestResult {
    let cfg = ConfigFile::try_from(parse_str(
        r#"
        [connection.redshift]
        cmd = "cat"

        [dimension.Load_user_dim_table]
        table = "dimUser"
        query = "SELECT 1"
        "#,
    )?)?;

    assert_eq!(cfg.pipeline.max_workers, 4);
    assert_eq!(cfg.pipeline.start_task, "Begin_execution");
    assert_eq!(cfg.load_retry().retries_allowed, 3);
    assert_eq!(cfg.check_retry().retries_allowed, 0);
    assert!(cfg.schedule().is_none());

    let graph = from_config(&cfg)?;
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.dependencies_of("Stop_execution")[0].task, "Load_user_dim_table");

    Ok(())
}

#[test]
fn exponential_backoff_config() -> TestResult {
    let mut raw = ConfigFileBuilder::new()
        .with_stage("Stage_events", "staging_events", "log-data/")
        .raw();
    raw.defaults.backoff = BackoffStrategy::Exponential;
    raw.defaults.max_retry_delay = Some("1h".to_string());

    let cfg = ConfigFile::try_from(raw)?;
    assert_eq!(cfg.load_retry().backoff, BackoffStrategy::Exponential);
    assert_eq!(cfg.load_retry().max_delay, Some(Duration::from_secs(3600)));

    Ok(())
}

fn expect_config_error(raw: etldag::config::RawConfigFile, needle: &str) {
    match ConfigFile::try_from(raw) {
        Err(EtlError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
        }
        Err(other) => panic!("expected config error, got {other}"),
        Ok(_) => panic!("expected config error mentioning '{needle}'"),
    }
}

#[test]
fn config_without_loaders_is_rejected() {
    expect_config_error(ConfigFileBuilder::new().raw(), "at least one");
}

#[test]
fn zero_workers_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_fact("Load_fact", "factSongPlay")
        .with_max_workers(0)
        .raw();
    expect_config_error(raw, "max_workers");
}

#[test]
fn duplicate_tables_are_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_dimension("Load_a", "dimUser", true)
        .with_dimension("Load_b", "dimUser", false)
        .raw();
    expect_config_error(raw, "dimUser");
}

#[test]
fn loader_id_clashing_with_marker_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_dimension("Begin_execution", "dimUser", true)
        .raw();
    expect_config_error(raw, "Begin_execution");
}

#[test]
fn unknown_connection_is_rejected() {
    let mut raw = ConfigFileBuilder::new()
        .with_stage("Stage_events", "staging_events", "log-data/")
        .raw();
    raw.stage
        .get_mut("Stage_events")
        .unwrap()
        .connection = Some("postgres".to_string());
    expect_config_error(raw, "postgres");
}

#[test]
fn quality_table_without_loader_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_fact("Load_fact", "factSongPlay")
        .with_quality_tables(&["dimUser"])
        .raw();
    expect_config_error(raw, "dimUser");
}

#[test]
fn bad_duration_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_fact("Load_fact", "factSongPlay")
        .with_retries(3, "soon")
        .raw();
    expect_config_error(raw, "retry_delay");
}

#[test]
fn bad_schedule_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_fact("Load_fact", "factSongPlay")
        .with_schedule("every hour")
        .raw();
    assert!(matches!(ConfigFile::try_from(raw), Err(EtlError::Schedule(_))));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    assert!(matches!(parse_str("[pipeline"), Err(EtlError::TomlError(_))));
}

#[test]
fn builder_config_runs_end_to_end_shape() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .with_stage("Stage_events", "staging_events", "log-data/")
        .with_fact("Load_fact", "factSongPlay")
        .with_dimension("Load_user_dim_table", "dimUser", true)
        .with_quality_tables(&["factSongPlay", "dimUser"])
        .with_check("dimUser", "SELECT COUNT(*) FROM dimUser", Expectation::Equals(10))
        .build();

    let graph = from_config(&cfg)?;
    let kinds: Vec<TaskKind> = graph.tasks().map(|t| t.kind()).collect();
    assert_eq!(kinds.iter().filter(|k| **k == TaskKind::QualityCheck).count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == TaskKind::Marker).count(), 2);

    Ok(())
}
