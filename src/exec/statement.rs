// src/exec/statement.rs

//! The warehouse collaborator.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::errors::ExecutionError;

/// Runs an opaque statement against an external system.
///
/// Returns the number of rows affected, or for count probes the count itself.
#[async_trait]
pub trait StatementExecutor: Send + Sync + fmt::Debug {
    async fn run_statement(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError>;

    /// Runs a count probe. Unlike `run_statement`, the result must be the
    /// count reported by the external system.
    async fn query_count(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        self.run_statement(connection_id, statement).await
    }
}

/// Executes statements by piping them into a per-connection shell command
/// (for example `psql "$REDSHIFT_URL" -At`).
///
/// The connection id is exported to the child as `ETLDAG_CONNECTION`.
#[derive(Debug, Clone, Default)]
pub struct ShellStatementExecutor {
    connections: BTreeMap<String, String>,
}

impl ShellStatementExecutor {
    pub fn new(connections: BTreeMap<String, String>) -> Self {
        Self { connections }
    }

    pub fn with_connection(mut self, id: impl Into<String>, cmd: impl Into<String>) -> Self {
        self.connections.insert(id.into(), cmd.into());
        self
    }

    fn command_for(&self, connection_id: &str) -> Result<Command, ExecutionError> {
        let cmd = self.connections.get(connection_id).ok_or_else(|| {
            ExecutionError::new(connection_id, "connection is not configured")
        })?;

        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(cmd);
            c
        };

        command
            .env("ETLDAG_CONNECTION", connection_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(command)
    }

    /// Pipe `statement` into the connection command and return its stdout.
    async fn run_raw(&self, connection_id: &str, statement: &str) -> Result<String, ExecutionError> {
        let err = |msg: String| ExecutionError::new(connection_id, msg);

        let mut child = self
            .command_for(connection_id)?
            .spawn()
            .map_err(|e| err(format!("spawning connection command: {e}")))?;

        debug!(connection = connection_id, bytes = statement.len(), "sending statement");
        trace!(connection = connection_id, %statement);

        if let Some(mut stdin) = child.stdin.take() {
            let payload = format!("{statement}\n");
            match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => {}
                // The command exited without reading; its exit status decides.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(err(format!("writing statement: {e}"))),
            }
            // Closing stdin lets the command see EOF.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| err(format!("waiting for connection command: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(err(format!("exit status {code}: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl StatementExecutor for ShellStatementExecutor {
    /// DDL and `TRUNCATE` print no row count; those report 0 rows.
    async fn run_statement(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        let stdout = self.run_raw(connection_id, statement).await?;
        let rows = parse_rows_affected(&stdout);
        if rows.is_none() {
            debug!(connection = connection_id, "no row count in output; reporting 0");
        }
        Ok(rows.unwrap_or(0))
    }

    async fn query_count(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        let stdout = self.run_raw(connection_id, statement).await?;
        parse_rows_affected(&stdout).ok_or_else(|| {
            ExecutionError::new(
                connection_id,
                format!("no count in output: {:?}", stdout.trim()),
            )
        })
    }
}

/// Last integer token of the command output.
///
/// Handles both command tags (`INSERT 0 5` gives 5) and bare scalar output
/// (`42`).
pub fn parse_rows_affected(output: &str) -> Option<u64> {
    output
        .split_whitespace()
        .rev()
        .find_map(|tok| tok.parse::<u64>().ok())
}
