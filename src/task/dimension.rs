// src/task/dimension.rs

use async_trait::async_trait;
use tracing::info;

use crate::errors::ActionError;
use crate::task::{Loadable, RunContext, TaskKind};

/// Loads a dimension table, either appending or replacing its contents.
#[derive(Debug, Clone)]
pub struct DimensionLoad {
    pub connection_id: String,
    pub table: String,
    pub select_query: String,
    /// Clear the table before inserting. The clear and the insert go out as
    /// one transaction, so a failure leaves the old contents in place.
    pub truncate_before_load: bool,
}

impl DimensionLoad {
    pub fn new(
        connection_id: impl Into<String>,
        table: impl Into<String>,
        select_query: impl Into<String>,
        truncate_before_load: bool,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            table: table.into(),
            select_query: select_query.into(),
            truncate_before_load,
        }
    }

    pub fn statement(&self) -> String {
        let query = self.select_query.trim().trim_end_matches(';');
        let insert = format!("INSERT INTO {} {}", self.table, query);

        // DELETE rather than TRUNCATE: TRUNCATE commits implicitly on
        // Redshift and would break the transaction.
        if self.truncate_before_load {
            format!("BEGIN;\nDELETE FROM {};\n{insert};\nCOMMIT;", self.table)
        } else {
            format!("{insert};")
        }
    }
}

#[async_trait]
impl Loadable for DimensionLoad {
    fn kind(&self) -> TaskKind {
        TaskKind::DimensionLoad
    }

    fn table(&self) -> Option<&str> {
        Some(&self.table)
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError> {
        info!(
            run_id = %ctx.run_id(),
            table = %self.table,
            truncate = self.truncate_before_load,
            "loading dimension table"
        );

        let rows = ctx
            .run_statement(&self.connection_id, &self.statement())
            .await?;

        info!(table = %self.table, rows, "dimension load finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_mode_wraps_delete_and_insert_in_one_transaction() {
        let load = DimensionLoad::new("redshift", "dimUser", "SELECT userid FROM staging_events", true);
        assert_eq!(
            load.statement(),
            "BEGIN;\nDELETE FROM dimUser;\nINSERT INTO dimUser SELECT userid FROM staging_events;\nCOMMIT;"
        );
    }

    #[test]
    fn append_mode_is_a_plain_insert() {
        let load = DimensionLoad::new("redshift", "dimUser", "SELECT 1", false);
        assert_eq!(load.statement(), "INSERT INTO dimUser SELECT 1;");
    }
}
