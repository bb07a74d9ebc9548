//! Weekly compilation windows.
//!
//! A window is stored as the half-open range `[start, start + 7 days)`.
//! Anything that filters submissions uses the closed range
//! `[start, query_end]`, where `query_end` is the last representable instant
//! of the window's final calendar day.
//!
//! On the wire, `window_end` is written as the bare date of the final
//! calendar day. Receivers widen a bare date or a midnight timestamp to the
//! last instant of that calendar day.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of a compilation window in days.
pub const WINDOW_DAYS: i64 = 7;

/// Storage precision of the ledger and submission timestamps.
fn precision() -> Duration {
    Duration::microseconds(1)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid window timestamp '{0}'")]
    Parse(String),

    #[error("window end {end} is not after start {start}")]
    Empty { start: String, end: String },

    #[error("unknown week anchor '{0}'")]
    UnknownAnchor(String),
}

/// Weekday a compilation week starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekAnchor(pub Weekday);

impl Default for WeekAnchor {
    fn default() -> Self {
        Self(Weekday::Mon)
    }
}

impl FromStr for WeekAnchor {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Weekday>()
            .map(Self)
            .map_err(|_| WindowError::UnknownAnchor(s.to_string()))
    }
}

/// Time period covered by one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationWindow {
    start: DateTime<Utc>,
    /// Exclusive
    end: DateTime<Utc>,
}

impl CompilationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The 7-day window starting at midnight UTC of `date`.
    pub fn starting_on(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(WINDOW_DAYS),
        }
    }

    /// The window containing `instant`, beginning on the most recent `anchor` weekday.
    pub fn containing(instant: DateTime<Utc>, anchor: WeekAnchor) -> Self {
        let date = instant.date_naive();
        let days_back = (date.weekday().num_days_from_monday() + 7
            - anchor.0.num_days_from_monday())
            % 7;
        Self::starting_on(date - Duration::days(i64::from(days_back)))
    }

    /// Build a window from the wire representation of its bounds.
    pub fn from_payload(start: &str, end: &str) -> Result<Self, WindowError> {
        let start_at = parse_instant(start)?;
        let last_instant = parse_inclusive_end(end)?;
        if last_instant <= start_at {
            return Err(WindowError::Empty {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start: start_at,
            end: last_instant + precision(),
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Inclusive upper bound for closed-interval queries.
    pub fn query_end(&self) -> DateTime<Utc> {
        self.end - precision()
    }

    /// Final calendar day covered by the window.
    pub fn last_day(&self) -> NaiveDate {
        self.query_end().date_naive()
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant <= self.query_end()
    }

    /// Human-readable intro label, e.g. `Week of September 01, 2025`.
    pub fn week_label(&self) -> String {
        format!("Week of {}", self.start.format("%B %d, %Y"))
    }

    /// `YYYYMMDD` of the window start.
    pub fn start_stamp(&self) -> String {
        self.start.format("%Y%m%d").to_string()
    }

    pub fn payload_start(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn payload_end(&self) -> String {
        self.last_day().format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for CompilationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

enum Parsed {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

fn parse(value: &str) -> Result<Parsed, WindowError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Parsed::Instant(dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Parsed::Instant(naive.and_utc()));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Parsed::Date)
        .map_err(|_| WindowError::Parse(value.to_string()))
}

/// Parse a start bound. Bare dates mean midnight UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, WindowError> {
    Ok(match parse(value)? {
        Parsed::Date(date) => date.and_time(NaiveTime::MIN).and_utc(),
        Parsed::Instant(instant) => instant,
    })
}

/// Parse an end bound, widening bare dates and midnights to end of day.
pub fn parse_inclusive_end(value: &str) -> Result<DateTime<Utc>, WindowError> {
    let date = match parse(value)? {
        Parsed::Date(date) => date,
        Parsed::Instant(instant) if instant.time() == NaiveTime::MIN => instant.date_naive(),
        Parsed::Instant(instant) => return Ok(instant),
    };
    let next_midnight = (date + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
    Ok(next_midnight - precision())
}
