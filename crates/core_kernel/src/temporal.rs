//! Calendar periods for settlement aggregation
//!
//! Counselor earnings are aggregated per calendar month. Which month an
//! instant falls into depends on the operating timezone of the marketplace,
//! so period resolution always goes through a [`Timezone`].

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timezone used to resolve calendar boundaries
///
/// Wraps chrono_tz::Tz with custom serialization support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(pub Tz);

impl Serialize for Timezone {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.name())
    }
}

impl<'de> Deserialize<'de> for Timezone {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for Timezone {
    type Err = TemporalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tz::from_str(s)
            .map(Timezone)
            .map_err(|_| TemporalError::InvalidTimezone(s.to_string()))
    }
}

impl Timezone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    /// Returns the calendar date of a UTC instant in this timezone
    pub fn local_date(&self, utc: DateTime<Utc>) -> NaiveDate {
        utc.with_timezone(&self.0).date_naive()
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(chrono_tz::UTC)
    }
}

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod { start: String, end: String },

    #[error("Period must cover exactly one calendar month: {0}")]
    NotAMonth(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Date out of range: {0}")]
    OutOfRange(String),
}

/// One calendar month, `start` and `end` inclusive
///
/// This is the key of the monthly counselor settlement aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettlementPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl SettlementPeriod {
    /// Returns the month with the given year and month number (1-12)
    pub fn month(year: i32, month: u32) -> Result<Self, TemporalError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| TemporalError::OutOfRange(format!("{}-{:02}", year, month)))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| TemporalError::OutOfRange(start.to_string()))?;
        Ok(Self { start, end })
    }

    /// Returns the month containing the given calendar date
    pub fn containing(date: NaiveDate) -> Result<Self, TemporalError> {
        Self::month(date.year(), date.month())
    }

    /// Returns the month containing a UTC instant, as seen in `tz`
    pub fn for_instant(instant: DateTime<Utc>, tz: Timezone) -> Result<Self, TemporalError> {
        Self::containing(tz.local_date(instant))
    }

    /// Rebuilds a period from stored bounds, checking they form one month
    pub fn from_bounds(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let period = Self::containing(start)?;
        if period.start != start || period.end != end {
            return Err(TemporalError::NotAMonth(format!("{}..={}", start, end)));
        }
        Ok(period)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Returns the following month
    pub fn next(&self) -> Result<Self, TemporalError> {
        let next_day = self
            .end
            .succ_opt()
            .ok_or_else(|| TemporalError::OutOfRange(self.end.to_string()))?;
        Self::containing(next_day)
    }
}

impl fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format("%Y-%m"))
    }
}
