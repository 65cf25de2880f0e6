// src/gate/check.rs

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::engine::TaskId;
use crate::errors::ActionError;
use crate::task::{Loadable, RunContext, TaskKind};

/// Result of one assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
}

/// Assertion over loaded data.
///
/// `Err` means the check could not be evaluated (e.g. the warehouse was
/// unreachable); `Ok(Fail)` means it was evaluated and did not hold.
#[async_trait]
pub trait Checkable: Send + Sync + fmt::Debug {
    async fn check(&self, ctx: &RunContext) -> Result<CheckOutcome, ActionError>;
}

/// Expected value of the probe statement of a [`QualityCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    #[default]
    NonZero,
    Zero,
    Equals(u64),
}

impl Expectation {
    pub fn holds(self, value: u64) -> bool {
        match self {
            Expectation::NonZero => value > 0,
            Expectation::Zero => value == 0,
            Expectation::Equals(n) => value == n,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::NonZero => f.write_str("a non-zero count"),
            Expectation::Zero => f.write_str("zero"),
            Expectation::Equals(n) => write!(f, "exactly {n}"),
        }
    }
}

/// Quality check over one table, run as a task of the gate group.
///
/// `target` names the load task that produces `table`; the check only
/// references it and never owns or mutates its output.
#[derive(Debug, Clone)]
pub struct QualityCheck {
    pub target: TaskId,
    pub connection_id: String,
    pub table: String,
    /// Probe statement returning a single count.
    pub sql: String,
    pub expect: Expectation,
    pub description: String,
}

impl QualityCheck {
    /// `SELECT COUNT(*) FROM <table>` must be non-zero.
    pub fn row_count(
        target: impl Into<TaskId>,
        connection_id: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        let table = table.into();
        Self {
            target: target.into(),
            connection_id: connection_id.into(),
            sql: format!("SELECT COUNT(*) FROM {table}"),
            expect: Expectation::NonZero,
            description: format!("{table} has rows"),
            table,
        }
    }

    pub fn custom(
        target: impl Into<TaskId>,
        connection_id: impl Into<String>,
        table: impl Into<String>,
        sql: impl Into<String>,
        expect: Expectation,
    ) -> Self {
        let table = table.into();
        Self {
            target: target.into(),
            connection_id: connection_id.into(),
            description: format!("{table} check"),
            table,
            sql: sql.into(),
            expect,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Checkable for QualityCheck {
    async fn check(&self, ctx: &RunContext) -> Result<CheckOutcome, ActionError> {
        let sql = ctx.render(&self.sql);
        let value = ctx.query_count(&self.connection_id, &sql).await?;

        if self.expect.holds(value) {
            Ok(CheckOutcome::Pass)
        } else {
            Ok(CheckOutcome::Fail(format!(
                "{}: expected {}, got {value}",
                self.description, self.expect
            )))
        }
    }
}

#[async_trait]
impl Loadable for QualityCheck {
    fn kind(&self) -> TaskKind {
        TaskKind::QualityCheck
    }

    fn table(&self) -> Option<&str> {
        Some(&self.table)
    }

    async fn execute(&self, ctx: &RunContext) -> Result<(), ActionError> {
        match self.check(ctx).await? {
            CheckOutcome::Pass => {
                info!(table = %self.table, check = %self.description, "quality check passed");
                Ok(())
            }
            CheckOutcome::Fail(reason) => {
                warn!(table = %self.table, %reason, "quality check failed");
                Err(ActionError::QualityCheckFailure {
                    table: self.table.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expectations() {
        assert!(Expectation::NonZero.holds(3));
        assert!(!Expectation::NonZero.holds(0));
        assert!(Expectation::Zero.holds(0));
        assert!(Expectation::Equals(7).holds(7));
        assert!(!Expectation::Equals(7).holds(8));
    }

    #[test]
    fn expectation_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            expect: Expectation,
        }

        let w: Wrap = toml::from_str(r#"expect = "zero""#).unwrap();
        assert_eq!(w.expect, Expectation::Zero);

        let w: Wrap = toml::from_str("expect = { equals = 4 }").unwrap();
        assert_eq!(w.expect, Expectation::Equals(4));
    }

    #[test]
    fn row_count_probe() {
        let check = QualityCheck::row_count("Load_user_dim_table", "redshift", "dimUser");
        assert_eq!(check.sql, "SELECT COUNT(*) FROM dimUser");
        assert_eq!(check.expect, Expectation::NonZero);
    }
}
