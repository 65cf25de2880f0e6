// src/task/marker.rs

use async_trait::async_trait;
use tracing::debug;

use crate::errors::ActionError;
use crate::task::{Loadable, RunContext, TaskKind};

/// No-op task marking the start or end of a pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Marker;

#[async_trait]
impl Loadable for Marker {
    fn kind(&self) -> TaskKind {
        TaskKind::Marker
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError> {
        debug!(run_id = %ctx.run_id(), "marker reached");
        Ok(())
    }
}
