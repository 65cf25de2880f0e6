// src/pipeline/mod.rs

//! Declarative graph generation.
//!
//! The engine only knows about tasks and edges. This module turns a list of
//! loaders and `{table, check}` pairs into that graph, either through
//! [`PipelineBuilder`] directly or from a validated [`ConfigFile`].

pub mod builder;

use std::sync::Arc;

use crate::config::ConfigFile;
use crate::dag::{DependencyGraph, RetryPolicy};
use crate::errors::Result;
use crate::gate::QualityCheck;
use crate::task::{DimensionLoad, FactLoad, SourceLocation, StageLoad};

pub use builder::{check_id, PipelineBuilder, CHECK_ID_PREFIX};

/// Build the pipeline graph described by a validated config.
pub fn from_config(cfg: &ConfigFile) -> Result<DependencyGraph> {
    let retry_with = |retries: Option<u32>| -> Option<RetryPolicy> {
        retries.map(|n| RetryPolicy {
            retries_allowed: n,
            ..cfg.load_retry().clone()
        })
    };

    let mut builder = PipelineBuilder::new()
        .markers(&cfg.pipeline.start_task, &cfg.pipeline.end_task)
        .load_retry(cfg.load_retry().clone())
        .check_retry(cfg.check_retry().clone());

    for (id, stage) in &cfg.stage {
        let mut load = StageLoad::new(
            cfg.connection_for(stage.connection.as_deref()),
            &stage.table,
            SourceLocation::new(&stage.s3_bucket, &stage.s3_key),
        )
        .with_format(&stage.format)
        .replace_existing(stage.replace_existing);
        if let Some(role) = &stage.iam_role {
            load = load.with_iam_role(role);
        }
        if let Some(region) = &stage.region {
            load = load.with_region(region);
        }
        builder = builder.stage_action(id, Arc::new(load), retry_with(stage.retries));
    }

    if let Some(fact) = &cfg.fact {
        let mut load = FactLoad::new(
            cfg.connection_for(fact.connection.as_deref()),
            &fact.table,
            &fact.query,
        );
        if let Some(key) = &fact.upsert_key {
            load = load.upsert_on(key);
        }
        builder = builder.fact_action(&fact.id, Arc::new(load), retry_with(fact.retries));
    }

    for (id, dim) in &cfg.dimension {
        let load = DimensionLoad::new(
            cfg.connection_for(dim.connection.as_deref()),
            &dim.table,
            &dim.query,
            dim.truncate,
        );
        builder = builder.dimension_action(id, Arc::new(load), retry_with(dim.retries));
    }

    let tables: Vec<&str> = cfg.quality.tables.iter().map(String::as_str).collect();
    builder = builder.row_count_checks(&cfg.defaults.connection, &tables);

    for (n, check) in cfg.quality.check.iter().enumerate() {
        let target = cfg.loader_for_table(&check.table).unwrap_or(&check.table);
        let mut quality = QualityCheck::custom(
            target,
            cfg.connection_for(check.connection.as_deref()),
            &check.table,
            &check.sql,
            check.expect,
        );
        if let Some(description) = &check.description {
            quality = quality.with_description(description);
        }
        let id = format!("{}_{}", check_id(&check.table), n + 1);
        builder = builder.check_with_id(id, quality);
    }

    Ok(builder.build()?)
}
