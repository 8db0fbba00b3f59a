//! Turns a requested start mode and time into a dispatch instant.
//!
//! A timed start may lag up to ten minutes behind `now` (it then starts
//! immediately) and may sit at most seven days ahead.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub fn grace_behind() -> TimeDelta {
    TimeDelta::minutes(10)
}

pub fn max_ahead() -> TimeDelta {
    TimeDelta::days(7)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    Immediate,
    At(i64),
}

impl StartAt {
    /// brewd's encoding: absolute epoch seconds, `0` for "start now".
    pub fn epoch_seconds(self) -> i64 {
        match self {
            StartAt::Immediate => 0,
            StartAt::At(seconds) => seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid start time: {0}")]
    InvalidInput(String),
    #[error("Start datetime is too early")]
    TooEarly,
    #[error("You should not plan so much ahead")]
    TooFarAhead,
    #[error("Unknown start mode: {0}")]
    UnknownMode(String),
}

impl From<ScheduleError> for ApiError {
    fn from(value: ScheduleError) -> Self {
        let code = match value {
            ScheduleError::InvalidInput(_) => ErrorCode::InvalidInput,
            ScheduleError::TooEarly => ErrorCode::TooEarly,
            ScheduleError::TooFarAhead => ErrorCode::TooFarAhead,
            ScheduleError::UnknownMode(_) => ErrorCode::UnknownMode,
        };
        ApiError::new(code, value.to_string())
    }
}

pub fn resolve_schedule(
    start_mode: &str,
    start_at: Option<&str>,
    now: DateTime<Utc>,
) -> Result<StartAt, ScheduleError> {
    match start_mode {
        "now" => Ok(StartAt::Immediate),
        "timed" => {
            let raw = start_at
                .ok_or_else(|| ScheduleError::InvalidInput("start time is missing".into()))?;
            resolve_timed(parse_start_at(raw)?, now)
        }
        other => Err(ScheduleError::UnknownMode(other.to_string())),
    }
}

fn resolve_timed(start: DateTime<Utc>, now: DateTime<Utc>) -> Result<StartAt, ScheduleError> {
    if start < now - grace_behind() {
        return Err(ScheduleError::TooEarly);
    }
    if start > now + max_ahead() {
        return Err(ScheduleError::TooFarAhead);
    }
    if start < now {
        return Ok(StartAt::Immediate);
    }
    Ok(StartAt::At(start.timestamp()))
}

/// Accepts RFC 3339, a naive date-time taken as UTC, or bare epoch seconds.
pub fn parse_start_at(raw: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScheduleError::InvalidInput("start time is empty".into()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed.and_utc());
        }
    }

    if raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(parsed) = raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        {
            return Ok(parsed);
        }
    }

    Err(ScheduleError::InvalidInput(format!("cannot parse '{raw}'")))
}
