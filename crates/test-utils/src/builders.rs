#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use etldag::config::{
    CheckConfig, ConfigFile, ConnectionConfig, DefaultsSection, DimensionConfig, FactConfig,
    PipelineSection, QualitySection, RawConfigFile, StageConfig,
};
use etldag::dag::RetryPolicy;
use etldag::gate::Expectation;
use etldag::pipeline::PipelineBuilder;
use etldag::task::{DimensionLoad, FactLoad, SourceLocation, StageLoad};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with a `redshift` connection backed by `cat`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut connection = BTreeMap::new();
        connection.insert(
            "redshift".to_string(),
            ConnectionConfig {
                cmd: "cat".to_string(),
            },
        );

        Self {
            config: RawConfigFile {
                pipeline: PipelineSection::default(),
                defaults: DefaultsSection::default(),
                connection,
                stage: BTreeMap::new(),
                fact: None,
                dimension: BTreeMap::new(),
                quality: QualitySection::default(),
            },
        }
    }

    pub fn with_schedule(mut self, expr: &str) -> Self {
        self.config.pipeline.schedule = Some(expr.to_string());
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.pipeline.max_workers = n;
        self
    }

    pub fn with_retries(mut self, retries: u32, delay: &str) -> Self {
        self.config.defaults.retries = retries;
        self.config.defaults.retry_delay = delay.to_string();
        self
    }

    pub fn with_stage(mut self, id: &str, table: &str, key: &str) -> Self {
        self.config.stage.insert(
            id.to_string(),
            StageConfig {
                table: table.to_string(),
                s3_bucket: "udacity-dend".to_string(),
                s3_key: key.to_string(),
                format: "JSON 'auto'".to_string(),
                iam_role: None,
                region: None,
                replace_existing: false,
                connection: None,
                retries: None,
            },
        );
        self
    }

    pub fn with_fact(mut self, id: &str, table: &str) -> Self {
        self.config.fact = Some(FactConfig {
            id: id.to_string(),
            table: table.to_string(),
            query: format!("SELECT * FROM staging_events /* {table} */"),
            upsert_key: None,
            connection: None,
            retries: None,
        });
        self
    }

    pub fn with_dimension(mut self, id: &str, table: &str, truncate: bool) -> Self {
        self.config.dimension.insert(
            id.to_string(),
            DimensionConfig {
                table: table.to_string(),
                query: format!("SELECT DISTINCT * FROM staging_events /* {table} */"),
                truncate,
                connection: None,
                retries: None,
            },
        );
        self
    }

    pub fn with_quality_tables(mut self, tables: &[&str]) -> Self {
        self.config.quality.tables = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_check(mut self, table: &str, sql: &str, expect: Expectation) -> Self {
        self.config.quality.check.push(CheckConfig {
            table: table.to_string(),
            sql: sql.to_string(),
            expect,
            description: None,
            connection: None,
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Tables checked by the reference pipeline.
pub const SPARKIFY_CHECK_TABLES: [&str; 7] = [
    "staging_events",
    "staging_songs",
    "factSongPlay",
    "dimUser",
    "dimSong",
    "dimArtist",
    "dimTime",
];

/// The reference Sparkify pipeline (16 tasks) on connection `redshift`:
///
/// ```text
/// Begin_execution -> {Stage_events, Stage_songs} -> Load_songplays_fact_table
///   -> {Load_user_dim_table, Load_song_dim_table, Load_artist_dim_table, Load_time_dim_table}
///   -> Data_quality_check_<table> x7 -> Stop_execution
/// ```
///
/// Loads get `retries` retries, 1ms apart; checks get none.
pub fn sparkify_pipeline(retries: u32) -> PipelineBuilder {
    let conn = "redshift";
    let dims = [
        ("Load_user_dim_table", "dimUser"),
        ("Load_song_dim_table", "dimSong"),
        ("Load_artist_dim_table", "dimArtist"),
        ("Load_time_dim_table", "dimTime"),
    ];

    let mut builder = PipelineBuilder::new()
        .load_retry(RetryPolicy::fixed(retries, Duration::from_millis(1)))
        .stage(
            "Stage_events",
            StageLoad::new(
                conn,
                "staging_events",
                SourceLocation::new("udacity-dend", "log-data/{{ year }}/{{ month }}/"),
            ),
        )
        .stage(
            "Stage_songs",
            StageLoad::new(
                conn,
                "staging_songs",
                SourceLocation::new("udacity-dend", "song-data/A/A/A/"),
            ),
        )
        .fact(
            "Load_songplays_fact_table",
            FactLoad::new(conn, "factSongPlay", "SELECT playid FROM staging_events"),
        );

    for (id, table) in dims {
        builder = builder.dimension(
            id,
            DimensionLoad::new(conn, table, format!("SELECT DISTINCT * FROM staging /* {table} */"), true),
        );
    }

    builder.row_count_checks(conn, &SPARKIFY_CHECK_TABLES)
}
