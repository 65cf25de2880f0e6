use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use etldag::errors::ExecutionError;
use etldag::exec::StatementExecutor;

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    rows: u64,
    /// `None`: fail every time. `Some(n)`: fail the next `n` matches.
    failures_left: Option<u32>,
    fails: bool,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    statements: Vec<(String, String)>,
}

/// In-memory `StatementExecutor` that records every statement and answers
/// from substring rules. Unmatched statements succeed with one row.
#[derive(Debug, Clone, Default)]
pub struct FakeWarehouse {
    state: Arc<Mutex<State>>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing `pattern` return `rows`.
    pub fn rows_for(self, pattern: &str, rows: u64) -> Self {
        self.push_rule(Rule {
            pattern: pattern.to_string(),
            rows,
            failures_left: None,
            fails: false,
        })
    }

    /// Statements containing `pattern` always fail.
    pub fn fail_matching(self, pattern: &str) -> Self {
        self.push_rule(Rule {
            pattern: pattern.to_string(),
            rows: 0,
            failures_left: None,
            fails: true,
        })
    }

    /// The first `times` statements containing `pattern` fail; later ones
    /// fall through to the remaining rules.
    pub fn fail_times(self, pattern: &str, times: u32) -> Self {
        self.push_rule(Rule {
            pattern: pattern.to_string(),
            rows: 0,
            failures_left: Some(times),
            fails: true,
        })
    }

    fn push_rule(self, rule: Rule) -> Self {
        self.state.lock().unwrap().rules.push(rule);
        self
    }

    /// Every `(connection, statement)` received, in order.
    pub fn statements(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.statements()
            .iter()
            .filter(|(_, s)| s.contains(pattern))
            .count()
    }
}

#[async_trait]
impl StatementExecutor for FakeWarehouse {
    async fn run_statement(
        &self,
        connection_id: &str,
        statement: &str,
    ) -> Result<u64, ExecutionError> {
        let mut state = self.state.lock().unwrap();
        state
            .statements
            .push((connection_id.to_string(), statement.to_string()));

        for rule in state.rules.iter_mut() {
            if !statement.contains(&rule.pattern) {
                continue;
            }
            if !rule.fails {
                return Ok(rule.rows);
            }
            match &mut rule.failures_left {
                None => {
                    return Err(ExecutionError::new(connection_id, format!("'{}' rejected", rule.pattern)));
                }
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return Err(ExecutionError::new(connection_id, "connection reset"));
                }
            }
        }

        Ok(1)
    }
}
