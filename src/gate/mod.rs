// src/gate/mod.rs

//! Post-load data-quality gate.
//!
//! - [`check`] defines the [`Checkable`] capability and the row-count based
//!   [`QualityCheck`] task.
//! - [`report`] aggregates check outcomes into a [`GateReport`] for the run
//!   result.

pub mod check;
pub mod report;

pub use check::{CheckOutcome, Checkable, Expectation, QualityCheck};
pub use report::{CheckReport, CheckStatus, GateReport};
