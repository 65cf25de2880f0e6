// src/dag/retry.rs

//! Per-task retry policy.

use std::time::Duration;

use crate::errors::ActionError;
use crate::types::BackoffStrategy;

/// Which failures a [`RetryPolicy`] is willing to retry.
///
/// Assertion failures (`ActionError::QualityCheckFailure`) are never retried,
/// whatever the condition says.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryCondition {
    /// Retry any non-assertion failure.
    #[default]
    Always,
    /// Retry only failures reported by the external system
    /// (`ActionError::Execution`), e.g. dropped connections.
    ExecutionErrorsOnly,
}

/// Retry policy attached to every task.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; a task runs at most
    /// `retries_allowed + 1` times.
    pub retries_allowed: u32,
    /// Base delay before a retry.
    pub retry_delay: Duration,
    pub backoff: BackoffStrategy,
    /// Upper bound applied to exponential backoff.
    pub max_delay: Option<Duration>,
    pub retry_on: RetryCondition,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            retries_allowed: 0,
            retry_delay: Duration::ZERO,
            backoff: BackoffStrategy::Fixed,
            max_delay: None,
            retry_on: RetryCondition::Always,
        }
    }

    pub fn fixed(retries_allowed: u32, retry_delay: Duration) -> Self {
        Self {
            retries_allowed,
            retry_delay,
            ..Self::none()
        }
    }

    pub fn exponential(retries_allowed: u32, retry_delay: Duration, max_delay: Duration) -> Self {
        Self {
            retries_allowed,
            retry_delay,
            backoff: BackoffStrategy::Exponential,
            max_delay: Some(max_delay),
            retry_on: RetryCondition::Always,
        }
    }

    /// Policy for quality checks: a small budget that only covers
    /// connectivity failures, never failed assertions.
    pub fn transient_only(retries_allowed: u32, retry_delay: Duration) -> Self {
        Self::fixed(retries_allowed, retry_delay).with_condition(RetryCondition::ExecutionErrorsOnly)
    }

    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.retry_on = condition;
        self
    }

    /// Total number of attempts the policy permits.
    pub fn max_attempts(&self) -> u32 {
        self.retries_allowed.saturating_add(1)
    }

    /// Whether another attempt should follow a failure, given how many
    /// retries have already been made for this task.
    pub fn should_retry(&self, retries_made: u32, err: &ActionError) -> bool {
        if err.is_assertion() {
            return false;
        }
        if self.retry_on == RetryCondition::ExecutionErrorsOnly
            && !matches!(err, ActionError::Execution(_))
        {
            return false;
        }
        retries_made < self.retries_allowed
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.retry_delay,
            BackoffStrategy::Exponential => {
                let exp = retry.saturating_sub(1).min(31);
                let delay = self.retry_delay.saturating_mul(1u32 << exp);
                match self.max_delay {
                    Some(cap) => delay.min(cap),
                    None => delay,
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
