// src/trigger/mod.rs

//! What starts a run.
//!
//! A run is started either manually (for a given logical date) or by a cron
//! [`Schedule`] firing. Either way the trigger fixes the run id and the data
//! window, which become part of the [`RunContext`].

pub mod schedule;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::engine::RunId;
use crate::exec::StatementExecutor;
use crate::task::{RunContext, TimeWindow};

pub use schedule::Schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Run for the window starting at `logical_date`.
    Manual { logical_date: DateTime<Utc> },
    /// The schedule fired at `fire_time`; the run covers the interval that
    /// just ended.
    Scheduled { fire_time: DateTime<Utc> },
}

impl Trigger {
    pub fn manual(logical_date: DateTime<Utc>) -> Self {
        Trigger::Manual { logical_date }
    }

    pub fn scheduled(fire_time: DateTime<Utc>) -> Self {
        Trigger::Scheduled { fire_time }
    }

    pub fn run_id(&self) -> RunId {
        match self {
            Trigger::Manual { logical_date } => {
                format!("manual__{}", logical_date.format("%Y-%m-%dT%H:%M:%S"))
            }
            Trigger::Scheduled { fire_time } => {
                format!("scheduled__{}", fire_time.format("%Y-%m-%dT%H:%M:%S"))
            }
        }
    }

    /// Data window of the run.
    ///
    /// The window length is the schedule's interval, or one day without a
    /// schedule.
    pub fn window(&self, schedule: Option<&Schedule>) -> TimeWindow {
        match *self {
            Trigger::Manual { logical_date } => {
                let interval = schedule
                    .and_then(|s| s.interval_at(logical_date))
                    .unwrap_or_else(|| Duration::days(1));
                TimeWindow::new(logical_date, logical_date + interval)
            }
            Trigger::Scheduled { fire_time } => {
                let interval = schedule
                    .and_then(|s| s.interval_at(fire_time))
                    .unwrap_or_else(|| Duration::days(1));
                TimeWindow::new(fire_time - interval, fire_time)
            }
        }
    }

    /// Build the context for the run this trigger starts.
    pub fn context(
        &self,
        schedule: Option<&Schedule>,
        warehouse: Arc<dyn StatementExecutor>,
        params: BTreeMap<String, String>,
    ) -> RunContext {
        RunContext::new(self.run_id(), self.window(schedule), warehouse).with_params(params)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.run_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scheduled_window_covers_the_interval_that_just_ended() {
        let schedule = Schedule::parse("0 * * * *").unwrap();
        let fire = Utc.with_ymd_and_hms(2024, 11, 13, 5, 0, 0).unwrap();
        let trigger = Trigger::scheduled(fire);

        let window = trigger.window(Some(&schedule));
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 11, 13, 4, 0, 0).unwrap());
        assert_eq!(window.end, fire);
        assert_eq!(trigger.run_id(), "scheduled__2024-11-13T05:00:00");
    }

    #[test]
    fn manual_window_defaults_to_one_day() {
        let date = Utc.with_ymd_and_hms(2018, 11, 3, 0, 0, 0).unwrap();
        let window = Trigger::manual(date).window(None);
        assert_eq!(window.ds(), "2018-11-03");
        assert_eq!(window.end - window.start, Duration::days(1));
    }
}
