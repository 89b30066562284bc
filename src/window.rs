//! Time window resolution
//!
//! Turns either a relative duration (`7d`, `24h`, `1d2h`, `90m`) or an explicit
//! RFC 3339 start/end pair into an absolute UTC [`TimeWindow`].

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::types::TimeWindow;

#[allow(clippy::expect_used)] // literal pattern
static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)([0-9]+)([dhm])").expect("duration segment regex"));

/// Caller-supplied time range, before resolution
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeRange {
    /// Relative duration ending now; takes precedence over `start`/`end`
    pub since: Option<String>,
    /// Explicit start (RFC 3339)
    pub start: Option<String>,
    /// Explicit end (RFC 3339)
    pub end: Option<String>,
}

impl TimeRange {
    /// Range relative to now
    pub fn since(duration: impl Into<String>) -> Self {
        Self {
            since: Some(duration.into()),
            ..Default::default()
        }
    }

    /// Explicit range
    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            since: None,
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// Resolve against the current wall clock
    pub fn resolve(&self) -> Result<TimeWindow> {
        self.resolve_at(Utc::now())
    }

    /// Resolve with `now` as the end of relative windows
    pub fn resolve_at(&self, now: DateTime<Utc>) -> Result<TimeWindow> {
        if let Some(since) = &self.since {
            return window_since(since, now);
        }
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => window_between(start, end),
            _ => Err(Error::MissingTimeRange),
        }
    }
}

/// Sum the `<n><d|h|m>` segments of a relative duration.
///
/// Characters outside a segment are skipped. Fails if the total is zero or
/// does not fit in a [`chrono::Duration`].
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || Error::InvalidDuration(input.to_string());

    let mut minutes: i64 = 0;
    for caps in SEGMENT.captures_iter(input) {
        let n: i64 = caps[1].parse().map_err(|_| invalid())?;
        let per_unit = match caps[2].to_ascii_lowercase().as_str() {
            "d" => 24 * 60,
            "h" => 60,
            _ => 1,
        };
        minutes = n
            .checked_mul(per_unit)
            .and_then(|m| minutes.checked_add(m))
            .ok_or_else(invalid)?;
    }

    if minutes == 0 {
        return Err(invalid());
    }
    Duration::try_minutes(minutes).ok_or_else(invalid)
}

/// Window of length `since` ending at `now`
pub fn window_since(since: &str, now: DateTime<Utc>) -> Result<TimeWindow> {
    let span = parse_duration(since)?;
    let start = now
        .checked_sub_signed(span)
        .ok_or_else(|| Error::InvalidDuration(since.to_string()))?;
    Ok(TimeWindow { start, end: now })
}

/// Window between two explicit RFC 3339 timestamps
pub fn window_between(start: &str, end: &str) -> Result<TimeWindow> {
    let start_at = parse_timestamp(start)?;
    let end_at = parse_timestamp(end)?;
    if start_at >= end_at {
        return Err(Error::InvalidTimeRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(TimeWindow {
        start: start_at,
        end: end_at,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
