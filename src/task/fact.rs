// src/task/fact.rs

use async_trait::async_trait;
use tracing::info;

use crate::errors::ActionError;
use crate::task::{Loadable, RunContext, TaskKind};

/// How fact rows are written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FactLoadMode {
    /// Plain insert. Re-running the same window duplicates rows.
    #[default]
    Append,
    /// Delete rows whose `key` matches the new batch, then insert, in one
    /// transaction.
    Upsert { key: String },
}

/// Inserts derived rows into the fact table using a fixed query.
#[derive(Debug, Clone)]
pub struct FactLoad {
    pub connection_id: String,
    pub table: String,
    /// `SELECT ...` producing the fact rows. Opaque to the engine.
    pub select_query: String,
    pub mode: FactLoadMode,
}

impl FactLoad {
    pub fn new(
        connection_id: impl Into<String>,
        table: impl Into<String>,
        select_query: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            table: table.into(),
            select_query: select_query.into(),
            mode: FactLoadMode::Append,
        }
    }

    pub fn upsert_on(mut self, key: impl Into<String>) -> Self {
        self.mode = FactLoadMode::Upsert { key: key.into() };
        self
    }

    pub fn statement(&self) -> String {
        let query = self.select_query.trim().trim_end_matches(';');
        match &self.mode {
            FactLoadMode::Append => format!("INSERT INTO {} {};", self.table, query),
            FactLoadMode::Upsert { key } => {
                let staging = format!("{}_upsert_batch", self.table);
                format!(
                    "BEGIN;\n\
                     CREATE TEMP TABLE {staging} AS {query};\n\
                     DELETE FROM {table} USING {staging} WHERE {table}.{key} = {staging}.{key};\n\
                     INSERT INTO {table} SELECT * FROM {staging};\n\
                     DROP TABLE {staging};\n\
                     COMMIT;",
                    table = self.table,
                )
            }
        }
    }
}

#[async_trait]
impl Loadable for FactLoad {
    fn kind(&self) -> TaskKind {
        TaskKind::FactLoad
    }

    fn table(&self) -> Option<&str> {
        Some(&self.table)
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError> {
        info!(
            run_id = %ctx.run_id(),
            table = %self.table,
            mode = ?self.mode,
            "loading fact table"
        );

        let rows = ctx
            .run_statement(&self.connection_id, &self.statement())
            .await?;

        info!(table = %self.table, rows, "fact load finished");
        Ok(())
    }
}
