// src/types.rs

use serde::Deserialize;

/// How the delay between retry attempts grows.
///
/// - `Fixed`: every retry waits `retry_delay` (default).
/// - `Exponential`: retry `n` waits `retry_delay * 2^(n-1)`, capped by the
///   policy's `max_delay` when one is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Fixed
    }
}
