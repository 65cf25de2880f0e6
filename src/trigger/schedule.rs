// src/trigger/schedule.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;

use crate::errors::{EtlError, Result};

/// Cron schedule, evaluated in UTC.
///
/// Accepts standard 5-field expressions (`minute hour day month weekday`,
/// numeric weekdays `0`/`7` = Sunday through `6` = Saturday), the shortcuts
/// `@yearly`, `@monthly`, `@weekly`, `@daily` and `@hourly`, and 6- or
/// 7-field expressions with seconds (and year) in the `cron` crate's own
/// syntax, where numeric weekdays run `1` = Sunday through `7` = Saturday.
#[derive(Debug, Clone)]
pub struct Schedule {
    expression: String,
    inner: Box<CronSchedule>,
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let cron_expr = if trimmed.starts_with('@') {
            expand_shortcut(trimmed)?.to_string()
        } else {
            trimmed.to_string()
        };

        let fields = cron_expr.split_whitespace().count();
        let cron_expr = match fields {
            5 => {
                let mut parts: Vec<&str> = cron_expr.split_whitespace().collect();
                let weekday = standard_weekdays(parts[4])
                    .map_err(|e| EtlError::Schedule(format!("'{expression}': {e}")))?;
                parts[4] = &weekday;
                format!("0 {}", parts.join(" "))
            }
            6 | 7 => cron_expr,
            n => {
                return Err(EtlError::Schedule(format!(
                    "'{expression}': expected 5, 6 or 7 fields, got {n}"
                )));
            }
        };

        let inner = CronSchedule::from_str(&cron_expr)
            .map_err(|e| EtlError::Schedule(format!("'{expression}': {e}")))?;

        Ok(Self {
            expression: trimmed.to_string(),
            inner: Box::new(inner),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.inner.after(&after).next()
    }

    /// Period of the schedule around `at`, measured between the next two
    /// fire times.
    pub fn interval_at(&self, at: DateTime<Utc>) -> Option<Duration> {
        let mut upcoming = self.inner.after(&at);
        let first = upcoming.next()?;
        let second = upcoming.next()?;
        Some(second - first)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Rewrite numeric weekdays of a standard cron field (`0`/`7` = Sunday)
/// as names, which the `cron` crate reads unambiguously.
fn standard_weekdays(field: &str) -> std::result::Result<String, String> {
    let name = |token: &str| -> std::result::Result<String, String> {
        match token.parse::<usize>() {
            Ok(n) if n <= 7 => Ok(WEEKDAYS[n % 7].to_string()),
            Ok(n) => Err(format!("weekday {n} out of range 0-7")),
            Err(_) => Ok(token.to_string()),
        }
    };

    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };

        let translated = match range.split_once('-') {
            // `5-7` ends on Sunday; split it so the range does not wrap.
            Some((from, "7")) if step.is_none() && from != "0" => {
                format!("{}-SAT,SUN", name(from)?)
            }
            Some((from, "7")) if from == "0" => "SUN-SAT".to_string(),
            Some((_, "7")) => {
                return Err(format!("weekday range '{item}' ending on 7 cannot take a step"));
            }
            Some((from, to)) => format!("{}-{}", name(from)?, name(to)?),
            None => name(range)?,
        };

        items.push(match step {
            Some(step) => format!("{translated}/{step}"),
            None => translated,
        });
    }

    Ok(items.join(","))
}

fn expand_shortcut(expression: &str) -> Result<&'static str> {
    match expression.to_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * SUN"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(EtlError::Schedule(format!("unknown shortcut: {expression}"))),
    }
}
