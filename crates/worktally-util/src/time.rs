//! Time utilities for worktallyd
//!
//! All session and evaluation math happens in UTC. A calendar day runs from
//! `00:00:00.000000` to `23:59:59.999999`; the microsecond is the finest
//! resolution the store keeps.
//!
//! Only years `0000` to `9999` are accepted from callers. Outside that range
//! chrono prints a signed, wider year that neither sorts nor parses back.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `WORKTALLY_MOCK_TIME` environment variable can be set
//! to shift the clock used by session timers and the evaluation scheduler.
//! The mock clock keeps advancing at real-time speed from the given instant.
//!
//! Format: `YYYY-MM-DD HH:MM:SS`, interpreted as UTC (e.g., `2025-12-15 23:58:30`)

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone,
    Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::WorktallyError;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "WORKTALLY_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Calendar years that have a fixed-width text form
pub const SUPPORTED_YEARS: RangeInclusive<i32> = 0..=9999;

static MOCK_TIME_OFFSET: OnceLock<Option<Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Utc::now()
fn get_mock_time_offset() -> Option<Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, MOCK_TIME_FORMAT) {
                    Ok(naive_dt) => {
                        let offset = Utc.from_utc_datetime(&naive_dt) - Utc::now();
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = MOCK_TIME_FORMAT,
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current UTC time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();
    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Today's UTC calendar date according to [`now`].
pub fn today() -> NaiveDate {
    now().date_naive()
}

/// First instant of `date` in UTC.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Last representable instant of `date` in UTC (`23:59:59.999999`).
/// Defined for every date chrono can represent, [`NaiveDate::MAX`] included.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date)
        .checked_add_signed(Duration::days(1) - Duration::microseconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Inclusive `[start, end]` window covering `date`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    (start_of_day(date), end_of_day(date))
}

/// Truncate to microsecond precision, the resolution timestamps are stored at.
pub fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond();
    dt.with_nanosecond(nanos - nanos % 1_000).unwrap_or(dt)
}

/// Whole seconds between two instants, rounded down and clamped at zero.
pub fn whole_seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let micros = (end - start).num_microseconds().unwrap_or(i64::MAX);
    micros.max(0) / 1_000_000
}

/// Reject a caller-supplied date outside [`SUPPORTED_YEARS`].
pub fn check_date(field: &str, date: NaiveDate) -> Result<NaiveDate, WorktallyError> {
    if SUPPORTED_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(WorktallyError::validation(format!(
            "{} {} is outside years {:04} to {:04}",
            field,
            date,
            SUPPORTED_YEARS.start(),
            SUPPORTED_YEARS.end()
        )))
    }
}

/// Reject a caller-supplied timestamp outside [`SUPPORTED_YEARS`].
pub fn check_timestamp(field: &str, dt: DateTime<Utc>) -> Result<DateTime<Utc>, WorktallyError> {
    check_date(field, dt.date_naive()).map(|_| dt)
}

/// Canonical text form: RFC 3339 with microseconds and a `Z` suffix.
///
/// Fixed width within [`SUPPORTED_YEARS`], so lexicographic order matches
/// chronological order there.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse any RFC 3339 timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Wall-clock time of day (UTC) used for the daily trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }

    /// This wall-clock time on `date`, in UTC.
    pub fn on(self, date: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(self.to_naive_time()))
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WallClock {
    type Err = String;

    /// Parses `HH:MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;
        let hour: u8 = h.trim().parse().map_err(|_| format!("invalid hour in '{}'", s))?;
        let minute: u8 = m.trim().parse().map_err(|_| format!("invalid minute in '{}'", s))?;
        Self::new(hour, minute).ok_or_else(|| format!("time out of range: '{}'", s))
    }
}

impl Serialize for WallClock {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WallClock {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Helper to format a second count in human-readable form
pub fn format_duration(total_secs: i64) -> String {
    let sign = if total_secs < 0 { "-" } else { "" };
    let total_secs = total_secs.unsigned_abs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}{}h {}m {}s", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{}m {}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}
