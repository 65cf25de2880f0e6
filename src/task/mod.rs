// src/task/mod.rs

//! Units of work the engine dispatches.
//!
//! Every task action implements [`Loadable`]; the engine only ever calls
//! `execute`. The concrete variants are:
//! - [`Marker`]: no-op start/end markers.
//! - [`StageLoad`]: copy raw records from object storage into a landing table.
//! - [`FactLoad`]: insert derived rows into the fact table.
//! - [`DimensionLoad`]: append to, or truncate and reload, a dimension table.
//! - [`QualityCheck`](crate::gate::QualityCheck): post-load assertion.

pub mod context;
pub mod dimension;
pub mod fact;
pub mod marker;
pub mod stage;

use std::fmt;

use async_trait::async_trait;

use crate::errors::ActionError;

pub use context::{RunContext, TimeWindow};
pub use dimension::DimensionLoad;
pub use fact::{FactLoad, FactLoadMode};
pub use marker::Marker;
pub use stage::{SourceLocation, StageLoad};

/// Tag describing which variant a task action is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Marker,
    Stage,
    FactLoad,
    DimensionLoad,
    QualityCheck,
    /// Any other action supplied by the caller.
    Custom,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Marker => "marker",
            TaskKind::Stage => "stage",
            TaskKind::FactLoad => "fact_load",
            TaskKind::DimensionLoad => "dimension_load",
            TaskKind::QualityCheck => "quality_check",
            TaskKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Capability shared by every task action.
///
/// One call to `execute` is one attempt; retries are the engine's business.
#[async_trait]
pub trait Loadable: Send + Sync + fmt::Debug {
    fn kind(&self) -> TaskKind {
        TaskKind::Custom
    }

    /// Table this action writes or checks, if any.
    fn table(&self) -> Option<&str> {
        None
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError>;
}
