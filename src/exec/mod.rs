// src/exec/mod.rs

//! Task execution layer.
//!
//! This module actually runs task actions and reports back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the bounded
//!   `WorkerPoolBackend` that the engine uses in production, and which tests
//!   can replace with a fake implementation.
//! - [`task_runner`] runs one task to its final outcome, applying the retry
//!   policy between attempts.
//! - [`statement`] defines the warehouse collaborator the loaders talk to,
//!   plus a shell-command implementation of it.

pub mod backend;
pub mod statement;
pub mod task_runner;

pub use backend::{ExecutorBackend, WorkerPoolBackend};
pub use statement::{parse_rows_affected, ShellStatementExecutor, StatementExecutor};
