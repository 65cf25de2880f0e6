// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::RetryPolicy;
use crate::gate::Expectation;
use crate::trigger::Schedule;
use crate::types::BackoffStrategy;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [pipeline]
/// name = "sparkify_etl"
/// schedule = "0 * * * *"
///
/// [connection.redshift]
/// cmd = "psql \"$REDSHIFT_URL\" -At"
///
/// [stage.Stage_events]
/// table = "staging_events"
/// s3_bucket = "udacity-dend"
/// s3_key = "log-data/{{ year }}/{{ month }}/"
///
/// [fact]
/// table = "factSongPlay"
/// query = "SELECT ..."
///
/// [dimension.Load_user_dim_table]
/// table = "dimUser"
/// query = "SELECT ..."
/// truncate = true
///
/// [quality]
/// tables = ["staging_events", "factSongPlay", "dimUser"]
/// ```
///
/// Everything except the loaders has defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    /// Warehouse connections from `[connection.<id>]`.
    #[serde(default)]
    pub connection: BTreeMap<String, ConnectionConfig>,

    /// Staging loaders from `[stage.<task id>]`.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,

    #[serde(default)]
    pub fact: Option<FactConfig>,

    /// Dimension loaders from `[dimension.<task id>]`.
    #[serde(default)]
    pub dimension: BTreeMap<String, DimensionConfig>,

    #[serde(default)]
    pub quality: QualitySection,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, so the
/// durations and the schedule have already been parsed.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub defaults: DefaultsSection,
    pub connection: BTreeMap<String, ConnectionConfig>,
    pub stage: BTreeMap<String, StageConfig>,
    pub fact: Option<FactConfig>,
    pub dimension: BTreeMap<String, DimensionConfig>,
    pub quality: QualitySection,
    load_retry: RetryPolicy,
    check_retry: RetryPolicy,
    schedule: Option<Schedule>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        load_retry: RetryPolicy,
        check_retry: RetryPolicy,
        schedule: Option<Schedule>,
    ) -> Self {
        Self {
            pipeline: raw.pipeline,
            defaults: raw.defaults,
            connection: raw.connection,
            stage: raw.stage,
            fact: raw.fact,
            dimension: raw.dimension,
            quality: raw.quality,
            load_retry,
            check_retry,
            schedule,
        }
    }

    /// Retry policy for loader tasks, from `[defaults]`.
    pub fn load_retry(&self) -> &RetryPolicy {
        &self.load_retry
    }

    /// Retry policy for quality checks, from `[quality]`.
    pub fn check_retry(&self) -> &RetryPolicy {
        &self.check_retry
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// Connection id a loader uses when it does not name one.
    pub fn connection_for<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit.unwrap_or(&self.defaults.connection)
    }

    /// `(connection id, command)` pairs for the shell executor.
    pub fn connection_commands(&self) -> BTreeMap<String, String> {
        self.connection
            .iter()
            .map(|(id, c)| (id.clone(), c.cmd.clone()))
            .collect()
    }

    /// Loader task producing `table`, if any.
    pub fn loader_for_table(&self, table: &str) -> Option<&str> {
        self.loader_tables()
            .into_iter()
            .find(|(_, t)| *t == table)
            .map(|(id, _)| id)
    }

    /// `(task id, table)` of every loader, stages first.
    pub fn loader_tables(&self) -> Vec<(&str, &str)> {
        raw_loader_tables(&self.stage, self.fact.as_ref(), &self.dimension)
    }
}

pub(crate) fn raw_loader_tables<'a>(
    stage: &'a BTreeMap<String, StageConfig>,
    fact: Option<&'a FactConfig>,
    dimension: &'a BTreeMap<String, DimensionConfig>,
) -> Vec<(&'a str, &'a str)> {
    let mut out: Vec<(&str, &str)> = stage
        .iter()
        .map(|(id, s)| (id.as_str(), s.table.as_str()))
        .collect();
    if let Some(f) = fact {
        out.push((f.id.as_str(), f.table.as_str()));
    }
    out.extend(
        dimension
            .iter()
            .map(|(id, d)| (id.as_str(), d.table.as_str())),
    );
    out
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Cron expression; without one the pipeline only runs manually.
    #[serde(default)]
    pub schedule: Option<String>,

    /// Size of the worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default = "default_start_task")]
    pub start_task: String,

    #[serde(default = "default_end_task")]
    pub end_task: String,
}

fn default_pipeline_name() -> String {
    "etl".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_start_task() -> String {
    "Begin_execution".to_string()
}

fn default_end_task() -> String {
    "Stop_execution".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            schedule: None,
            max_workers: default_max_workers(),
            start_task: default_start_task(),
            end_task: default_end_task(),
        }
    }
}

/// `[defaults]` section: connection and retry behaviour for loaders.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_connection")]
    pub connection: String,

    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Cap for exponential backoff.
    #[serde(default)]
    pub max_retry_delay: Option<String>,
}

fn default_connection() -> String {
    "redshift".to_string()
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            backoff: BackoffStrategy::default(),
            max_retry_delay: None,
        }
    }
}

/// `[connection.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Shell command that reads a statement on stdin.
    pub cmd: String,
}

/// `[stage.<task id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub table: String,
    pub s3_bucket: String,
    /// Key prefix; may contain `{{ ds }}`-style placeholders.
    pub s3_key: String,
    #[serde(default = "default_stage_format")]
    pub format: String,
    #[serde(default)]
    pub iam_role: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub replace_existing: bool,
    #[serde(default)]
    pub connection: Option<String>,
    /// Overrides `[defaults].retries`.
    #[serde(default)]
    pub retries: Option<u32>,
}

fn default_stage_format() -> String {
    "JSON 'auto'".to_string()
}

/// `[fact]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FactConfig {
    #[serde(default = "default_fact_id")]
    pub id: String,
    pub table: String,
    pub query: String,
    /// Switches from append to delete-then-insert on this key.
    #[serde(default)]
    pub upsert_key: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
}

fn default_fact_id() -> String {
    "Load_fact_table".to_string()
}

/// `[dimension.<task id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DimensionConfig {
    pub table: String,
    pub query: String,
    #[serde(default)]
    pub truncate: bool,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub retries: Option<u32>,
}

/// `[quality]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct QualitySection {
    /// Tables that get a non-zero row-count check.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Retries for connectivity failures only; assertion failures are never
    /// retried.
    #[serde(default)]
    pub transient_retries: u32,

    #[serde(default = "default_check_retry_delay")]
    pub retry_delay: String,

    /// Custom checks from `[[quality.check]]`.
    #[serde(default)]
    pub check: Vec<CheckConfig>,
}

fn default_check_retry_delay() -> String {
    "30s".to_string()
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            transient_retries: 0,
            retry_delay: default_check_retry_delay(),
            check: Vec::new(),
        }
    }
}

/// `[[quality.check]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    pub table: String,
    pub sql: String,
    #[serde(default)]
    pub expect: Expectation,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub connection: Option<String>,
}
