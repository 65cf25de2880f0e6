// src/config/validate.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::duration::parse_duration;
use crate::config::model::{raw_loader_tables, ConfigFile, RawConfigFile};
use crate::dag::RetryPolicy;
use crate::errors::{EtlError, Result};
use crate::trigger::Schedule;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EtlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let load_retry = load_retry_policy(&raw)?;
        let check_retry = check_retry_policy(&raw)?;
        let schedule = raw
            .pipeline
            .schedule
            .as_deref()
            .map(Schedule::parse)
            .transpose()?;

        Ok(ConfigFile::new_unchecked(raw, load_retry, check_retry, schedule))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_loaders(cfg)?;
    validate_pipeline_section(cfg)?;
    validate_task_ids(cfg)?;
    validate_connections(cfg)?;
    validate_quality_targets(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> EtlError {
    EtlError::ConfigError(msg.into())
}

fn ensure_has_loaders(cfg: &RawConfigFile) -> Result<()> {
    if cfg.stage.is_empty() && cfg.fact.is_none() && cfg.dimension.is_empty() {
        return Err(config_error(
            "config must contain at least one [stage.<id>], [fact] or [dimension.<id>] section",
        ));
    }
    Ok(())
}

fn validate_pipeline_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.max_workers == 0 {
        return Err(config_error("[pipeline].max_workers must be >= 1 (got 0)"));
    }
    if cfg.pipeline.start_task == cfg.pipeline.end_task {
        return Err(config_error(format!(
            "[pipeline].start_task and end_task must differ (both '{}')",
            cfg.pipeline.start_task
        )));
    }
    Ok(())
}

/// Task ids and loader tables must both be unique.
fn validate_task_ids(cfg: &RawConfigFile) -> Result<()> {
    let mut ids = BTreeSet::new();
    ids.insert(cfg.pipeline.start_task.as_str());
    ids.insert(cfg.pipeline.end_task.as_str());

    let mut tables: BTreeMap<&str, &str> = BTreeMap::new();
    for (id, table) in raw_loader_tables(&cfg.stage, cfg.fact.as_ref(), &cfg.dimension) {
        if !ids.insert(id) {
            return Err(config_error(format!("task id '{id}' is used more than once")));
        }
        if let Some(other) = tables.insert(table, id) {
            return Err(config_error(format!(
                "table '{table}' is loaded by both '{other}' and '{id}'"
            )));
        }
    }
    Ok(())
}

fn validate_connections(cfg: &RawConfigFile) -> Result<()> {
    let mut referenced: Vec<(&str, &str)> = Vec::new();
    let default = cfg.defaults.connection.as_str();

    for (id, stage) in &cfg.stage {
        referenced.push((id.as_str(), stage.connection.as_deref().unwrap_or(default)));
    }
    if let Some(fact) = &cfg.fact {
        referenced.push((fact.id.as_str(), fact.connection.as_deref().unwrap_or(default)));
    }
    for (id, dim) in &cfg.dimension {
        referenced.push((id.as_str(), dim.connection.as_deref().unwrap_or(default)));
    }
    for check in &cfg.quality.check {
        referenced.push((check.table.as_str(), check.connection.as_deref().unwrap_or(default)));
    }
    if !cfg.quality.tables.is_empty() {
        referenced.push(("[quality]", default));
    }

    for (user, conn) in referenced {
        if !cfg.connection.contains_key(conn) {
            return Err(config_error(format!(
                "'{user}' uses connection '{conn}', which has no [connection.{conn}] section"
            )));
        }
    }
    Ok(())
}

/// Every checked table must be produced by a loader of this pipeline.
fn validate_quality_targets(cfg: &RawConfigFile) -> Result<()> {
    let loaded: BTreeSet<&str> = raw_loader_tables(&cfg.stage, cfg.fact.as_ref(), &cfg.dimension)
        .into_iter()
        .map(|(_, table)| table)
        .collect();

    let checked = cfg
        .quality
        .tables
        .iter()
        .map(String::as_str)
        .chain(cfg.quality.check.iter().map(|c| c.table.as_str()));

    for table in checked {
        if !loaded.contains(table) {
            return Err(config_error(format!(
                "quality check on '{table}', but no loader writes that table"
            )));
        }
    }
    Ok(())
}

fn duration_field(section: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value).map_err(|e| config_error(format!("{section}: {e}")))
}

fn load_retry_policy(cfg: &RawConfigFile) -> Result<RetryPolicy> {
    let defaults = &cfg.defaults;
    let delay = duration_field("[defaults].retry_delay", &defaults.retry_delay)?;
    let max_delay = defaults
        .max_retry_delay
        .as_deref()
        .map(|d| duration_field("[defaults].max_retry_delay", d))
        .transpose()?;

    Ok(RetryPolicy {
        retries_allowed: defaults.retries,
        retry_delay: delay,
        backoff: defaults.backoff,
        max_delay,
        ..RetryPolicy::none()
    })
}

fn check_retry_policy(cfg: &RawConfigFile) -> Result<RetryPolicy> {
    let delay = duration_field("[quality].retry_delay", &cfg.quality.retry_delay)?;
    Ok(RetryPolicy::transient_only(cfg.quality.transient_retries, delay))
}
