//! Cron minute-field evaluator for the local runner.
//!
//! Only the minute field may be constrained; hour, day-of-month, month and
//! day-of-week must be `*`. Minutes are matched on the wall clock of the
//! pattern's timezone (UTC unless set), so `15 * * * *` in Asia/Kolkata
//! fires at :15 local, i.e. :45 UTC.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("cron pattern '{0}' must have 5 fields")]
    FieldCount(String),
    #[error("invalid minute field '{0}'")]
    InvalidMinute(String),
    #[error("minute {0} out of range 0-59")]
    OutOfRange(u32),
    #[error("step must be between 1 and 59, got {0}")]
    InvalidStep(u32),
    #[error("cron field '{field}' = '{value}' is not supported (only '*')")]
    Unsupported { field: &'static str, value: String },
}

const FIELD_NAMES: [&str; 5] = ["minute", "hour", "day-of-month", "month", "day-of-week"];

/// A parsed `m * * * *` pattern bound to a timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronPattern {
    source: String,
    minutes: [bool; 60],
    tz: Tz,
}

impl CronPattern {
    pub fn parse(pattern: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = pattern.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(pattern.to_string()));
        }

        for (name, value) in FIELD_NAMES.iter().zip(&fields).skip(1) {
            if *value != "*" {
                return Err(ScheduleError::Unsupported {
                    field: *name,
                    value: value.to_string(),
                });
            }
        }

        let mut minutes = [false; 60];
        for part in fields[0].split(',') {
            parse_minute_part(part, &mut minutes)?;
        }

        Ok(Self {
            source: fields.join(" "),
            minutes,
            tz: Tz::UTC,
        })
    }

    /// Evaluate minutes on the wall clock of `tz`.
    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.tz = tz;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn matches(&self, minute: u32) -> bool {
        self.minutes.get(minute as usize).copied().unwrap_or(false)
    }

    /// First matching minute boundary strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let floor = after
            - Duration::seconds(after.second() as i64)
            - Duration::nanoseconds(after.nanosecond() as i64);

        // Offsets are whole minutes, so UTC minute boundaries are local ones
        // too, and a non-empty minute set matches within the next hour.
        (1..=60)
            .map(|m| floor + Duration::minutes(m))
            .find(|t| self.matches(t.with_timezone(&self.tz).minute()))
            .unwrap_or(floor + Duration::minutes(60))
    }

    /// The next `count` matching slots after `after`, soonest first.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = after;
        for _ in 0..count {
            cursor = self.next_after(cursor);
            out.push(cursor);
        }
        out
    }
}

impl FromStr for CronPattern {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `*`, `*/n`, `n`, `a-b` or `a-b/n`.
fn parse_minute_part(part: &str, minutes: &mut [bool; 60]) -> Result<(), ScheduleError> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| ScheduleError::InvalidMinute(part.to_string()))?;
            if !(1..=59).contains(&step) {
                return Err(ScheduleError::InvalidStep(step));
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" {
        (0, 59)
    } else if let Some((a, b)) = range.split_once('-') {
        let lo = parse_minute(a, part)?;
        let hi = parse_minute(b, part)?;
        if lo > hi {
            return Err(ScheduleError::InvalidMinute(part.to_string()));
        }
        (lo, hi)
    } else {
        let m = parse_minute(range, part)?;
        // `5/15` means "from 5, every 15" like most cron dialects.
        if part.contains('/') { (m, 59) } else { (m, m) }
    };

    for m in (lo..=hi).step_by(step as usize) {
        minutes[m as usize] = true;
    }
    Ok(())
}

fn parse_minute(s: &str, part: &str) -> Result<u32, ScheduleError> {
    let m: u32 = s
        .parse()
        .map_err(|_| ScheduleError::InvalidMinute(part.to_string()))?;
    if m > 59 {
        return Err(ScheduleError::OutOfRange(m));
    }
    Ok(m)
}
