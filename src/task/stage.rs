// src/task/stage.rs

use async_trait::async_trait;
use tracing::info;

use crate::errors::ActionError;
use crate::task::{Loadable, RunContext, TaskKind};

/// Object-storage location of the raw records.
///
/// `key` may contain run placeholders such as `{{ year }}/{{ month }}`; see
/// [`RunContext::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    pub key: String,
}

impl SourceLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn uri(&self, ctx: &RunContext) -> String {
        format!(
            "s3://{}/{}",
            self.bucket.trim_end_matches('/'),
            ctx.render(self.key.trim_start_matches('/'))
        )
    }
}

/// Copies raw records into a landing table.
///
/// Re-running is safe: by default the copy appends again. With
/// `replace_existing`, the delete and the copy are sent as one transaction
/// so a failure never leaves the table half-cleared.
#[derive(Debug, Clone)]
pub struct StageLoad {
    pub connection_id: String,
    pub table: String,
    pub source: SourceLocation,
    /// Copy format clause, e.g. `JSON 'auto'`.
    pub format: String,
    pub iam_role: Option<String>,
    pub region: Option<String>,
    pub replace_existing: bool,
}

impl StageLoad {
    pub fn new(
        connection_id: impl Into<String>,
        table: impl Into<String>,
        source: SourceLocation,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            table: table.into(),
            source,
            format: "JSON 'auto'".to_string(),
            iam_role: None,
            region: None,
            replace_existing: false,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_iam_role(mut self, role: impl Into<String>) -> Self {
        self.iam_role = Some(role.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn replace_existing(mut self, replace: bool) -> Self {
        self.replace_existing = replace;
        self
    }

    /// The statement sent to the warehouse for this run.
    pub fn statement(&self, ctx: &RunContext) -> String {
        let mut copy = format!("COPY {} FROM '{}'", self.table, self.source.uri(ctx));
        if let Some(role) = &self.iam_role {
            copy.push_str(&format!(" IAM_ROLE '{role}'"));
        }
        if let Some(region) = &self.region {
            copy.push_str(&format!(" REGION '{region}'"));
        }
        copy.push_str(&format!(" FORMAT AS {}", self.format));

        if self.replace_existing {
            format!("BEGIN;\nDELETE FROM {};\n{copy};\nCOMMIT;", self.table)
        } else {
            format!("{copy};")
        }
    }
}

#[async_trait]
impl Loadable for StageLoad {
    fn kind(&self) -> TaskKind {
        TaskKind::Stage
    }

    fn table(&self) -> Option<&str> {
        Some(&self.table)
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError> {
        let source = self.source.uri(ctx);
        info!(
            run_id = %ctx.run_id(),
            table = %self.table,
            source = %source,
            "staging raw records"
        );

        let rows = ctx
            .run_statement(&self.connection_id, &self.statement(ctx))
            .await?;

        info!(table = %self.table, rows, "staging copy finished");
        Ok(())
    }
}
