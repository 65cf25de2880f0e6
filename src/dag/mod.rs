// src/dag/mod.rs

//! Task graph representation and per-run scheduling.
//!
//! - [`graph`] holds the dependency graph and its validation.
//! - [`retry`] defines the per-task retry policy.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready and which must be skipped.
//! - [`task_info`] provides task definitions and per-run records.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies per-run state transitions.

pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{Dependency, DependencyGraph, Edge, EdgeKind};
pub use retry::{RetryCondition, RetryPolicy};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use state_manager::Readiness;
pub use task_info::{ScheduledTask, SkipCause, StateTransition, Task, TaskRecord, TaskState};
