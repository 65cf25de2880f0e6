// src/gate/report.rs

use serde::Serialize;

use crate::dag::{SkipCause, TaskRecord, TaskState};
use crate::engine::TaskId;
use crate::errors::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    /// Assertion could not be evaluated (warehouse error).
    Errored,
    Skipped,
    /// Never reached a terminal state.
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub task_id: TaskId,
    pub table: String,
    pub status: CheckStatus,
    pub reason: Option<String>,
}

/// Outcome of every quality check in one run.
///
/// The gate passes only when every check passed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GateReport {
    pub checks: Vec<CheckReport>,
}

impl GateReport {
    pub(crate) fn record(&mut self, task_id: &TaskId, table: &str, record: &TaskRecord) {
        let (status, reason) = match record.state {
            TaskState::Succeeded => (CheckStatus::Passed, None),
            TaskState::Failed => match &record.last_error {
                Some(ActionError::QualityCheckFailure { reason, .. }) => {
                    (CheckStatus::Failed, Some(reason.clone()))
                }
                Some(other) => (CheckStatus::Errored, Some(other.to_string())),
                None => (CheckStatus::Errored, None),
            },
            TaskState::Skipped => (
                CheckStatus::Skipped,
                record.skip_cause.as_ref().map(SkipCause::to_string),
            ),
            TaskState::Pending | TaskState::Running => (CheckStatus::NotRun, None),
        };

        self.checks.push(CheckReport {
            task_id: task_id.clone(),
            table: table.to_string(),
            status,
            reason,
        });
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status == CheckStatus::Passed)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckReport> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Failed | CheckStatus::Errored))
    }

    /// Tables whose check failed or errored.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.failed_checks().map(|c| c.table.as_str()).collect()
    }

    pub fn get(&self, table: &str) -> Option<&CheckReport> {
        self.checks.iter().find(|c| c.table == table)
    }
}
