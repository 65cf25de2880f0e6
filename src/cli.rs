// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};

/// Command-line arguments for `etldag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "etldag",
    version,
    about = "Run a staged warehouse ETL pipeline as a dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Pipeline.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Pipeline.toml")]
    pub config: PathBuf,

    /// Run the pipeline once and exit, even if it has a schedule.
    #[arg(long)]
    pub once: bool,

    /// Logical date of a manual run (`YYYY-MM-DD` or RFC 3339).
    ///
    /// Implies `--once`. Defaults to today (UTC).
    #[arg(long, value_name = "DATE", value_parser = parse_logical_date)]
    pub date: Option<DateTime<Utc>>,

    /// Extra run parameter, available to templates as `{{ params.KEY }}`.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,

    /// Append task events as JSON lines to this file.
    #[arg(long, value_name = "PATH")]
    pub events: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ETLDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Whether to run a single manual run instead of following the schedule.
    pub fn single_run(&self) -> bool {
        self.once || self.date.is_some()
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

pub fn parse_logical_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| format!("invalid date '{s}'"));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid date '{s}': {e} (expected YYYY-MM-DD or RFC 3339)"))
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{s}'"))?;
    if key.trim().is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_dates() {
        assert_eq!(
            parse_logical_date("2018-11-03").unwrap(),
            Utc.with_ymd_and_hms(2018, 11, 3, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_logical_date("2018-11-03T07:00:00+01:00").unwrap(),
            Utc.with_ymd_and_hms(2018, 11, 3, 6, 0, 0).unwrap()
        );
        assert!(parse_logical_date("yesterday").is_err());
    }

    #[test]
    fn parses_params() {
        let args = CliArgs::try_parse_from([
            "etldag",
            "--param",
            "bucket=udacity-dend",
            "--param",
            "region=us-west-2",
            "--date",
            "2018-11-03",
        ])
        .unwrap();

        assert!(args.single_run());
        assert_eq!(args.params[0], ("bucket".into(), "udacity-dend".into()));
        assert!(CliArgs::try_parse_from(["etldag", "--param", "nokey"]).is_err());
    }
}
