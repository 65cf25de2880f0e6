// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod gate;
pub mod logging;
pub mod pipeline;
pub mod task;
pub mod trigger;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::DependencyGraph;
use crate::engine::{Engine, RunResult};
use crate::events::{EventSink, FanoutSink, JsonLinesSink, TracingSink};
use crate::exec::{ShellStatementExecutor, StatementExecutor};
use crate::task::RunContext;
use crate::trigger::{Schedule, Trigger};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph generation
/// - the warehouse collaborator and the event sink
/// - a single manual run, or the schedule loop
/// - Ctrl-C handling (cancels the current run)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let graph = Arc::new(pipeline::from_config(&cfg)?);

    if args.dry_run {
        print_dry_run(&cfg, &graph)?;
        return Ok(());
    }

    let engine = Engine::new(cfg.pipeline.max_workers).with_sink(event_sink(&args)?);
    let warehouse: Arc<dyn StatementExecutor> =
        Arc::new(ShellStatementExecutor::new(cfg.connection_commands()));
    let params: BTreeMap<String, String> = args.params.iter().cloned().collect();

    match cfg.schedule() {
        Some(schedule) if !args.single_run() => {
            run_schedule(&engine, &graph, schedule, warehouse, params).await
        }
        schedule => {
            let logical_date = args.date.unwrap_or_else(start_of_today);
            let trigger = Trigger::manual(logical_date);
            let ctx = trigger.context(schedule, warehouse, params);

            let (result, _) = run_until_ctrl_c(&engine, &graph, ctx).await?;
            print!("{result}");
            if !result.is_success() {
                bail!(
                    "run {} failed: {}",
                    result.run_id,
                    result.reason().unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

/// Run the graph every time the schedule fires, until Ctrl-C.
///
/// Missed fire times are not backfilled: after a run, the loop waits for
/// the next fire time after "now".
async fn run_schedule(
    engine: &Engine,
    graph: &Arc<DependencyGraph>,
    schedule: &Schedule,
    warehouse: Arc<dyn StatementExecutor>,
    params: BTreeMap<String, String>,
) -> Result<()> {
    info!(%schedule, "following schedule");

    loop {
        let now = Utc::now();
        let Some(fire_time) = schedule.next_after(now) else {
            info!(%schedule, "schedule has no further fire times");
            return Ok(());
        };
        let wait = (fire_time - now).to_std().unwrap_or_default();
        info!(next = %fire_time, "waiting for next fire time");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received while idle; exiting");
                return Ok(());
            }
        }

        let trigger = Trigger::scheduled(fire_time);
        let ctx = trigger.context(Some(schedule), Arc::clone(&warehouse), params.clone());
        let (result, interrupted) = run_until_ctrl_c(engine, graph, ctx).await?;

        if result.is_success() {
            info!(run_id = %result.run_id, duration = %result.duration(), "run succeeded");
        } else {
            error!(
                run_id = %result.run_id,
                reason = %result.reason().unwrap_or_default(),
                "run failed"
            );
        }

        if interrupted {
            print!("{result}");
            return Ok(());
        }
    }
}

/// Execute one run; Ctrl-C cancels it and waits for in-flight tasks.
///
/// Returns the result and whether the run was interrupted.
async fn run_until_ctrl_c(
    engine: &Engine,
    graph: &Arc<DependencyGraph>,
    ctx: RunContext,
) -> Result<(RunResult, bool)> {
    let (prepared, cancel) = engine.prepare(Arc::clone(graph), ctx)?;
    let run = prepared.execute();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return Ok((result?, false)),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C; run continues");
                return Ok((run.await?, false));
            }
        }
    }

    info!("Ctrl-C received; cancelling run");
    cancel.cancel().await;
    Ok((run.await?, true))
}

fn event_sink(args: &CliArgs) -> Result<Arc<dyn EventSink>> {
    let Some(path) = &args.events else {
        return Ok(Arc::new(TracingSink));
    };

    let file = JsonLinesSink::create(path)
        .with_context(|| format!("opening event file {}", path.display()))?;
    Ok(Arc::new(FanoutSink::new(vec![
        Arc::new(TracingSink),
        Arc::new(file),
    ])))
}

fn start_of_today() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

/// Simple dry-run output: print tasks in dependency order with their
/// upstreams and retry policies.
fn print_dry_run(cfg: &ConfigFile, graph: &DependencyGraph) -> Result<()> {
    println!("etldag dry-run: pipeline '{}'", cfg.pipeline.name);
    match cfg.schedule() {
        Some(schedule) => println!("  schedule = {schedule}"),
        None => println!("  schedule = (manual only)"),
    }
    println!("  max_workers = {}", cfg.pipeline.max_workers);
    println!();

    let order = graph.topological_order()?;
    println!("tasks ({}):", order.len());
    for id in &order {
        let Some(task) = graph.task(id) else {
            continue;
        };
        println!("  - {id} [{}]", task.kind());
        if let Some(table) = task.action.table() {
            println!("      table: {table}");
        }
        let upstream: Vec<String> = graph
            .dependencies_of(id)
            .iter()
            .map(|d| d.task.clone())
            .collect();
        if !upstream.is_empty() {
            println!("      after: {upstream:?}");
        }
        if task.retry.retries_allowed > 0 {
            println!(
                "      retries: {} every {:?} ({:?})",
                task.retry.retries_allowed, task.retry.retry_delay, task.retry.backoff
            );
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
