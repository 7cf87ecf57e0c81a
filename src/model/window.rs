//! Lookback window and sampling interval
//!
//! Both use the provider's compact string form ("2d", "1h") in config files
//! and on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a lookback or interval string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWindowError {
    #[error("invalid lookback '{0}': expected <n>d, <n>mo, <n>y, ytd or max")]
    Lookback(String),
    #[error("unsupported interval '{0}'")]
    Interval(String),
}

/// How far back to request bars, relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lookback {
    Days(u32),
    Months(u32),
    Years(u32),
    YearToDate,
    Max,
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::Days(2)
    }
}

impl FromStr for Lookback {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_lowercase();
        let err = || ParseWindowError::Lookback(s.to_string());

        match raw.as_str() {
            "ytd" => return Ok(Lookback::YearToDate),
            "max" => return Ok(Lookback::Max),
            _ => {}
        }

        let parse_count = |digits: &str| -> Result<u32, ParseWindowError> {
            match digits.parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(err()),
            }
        };

        // "mo" must be checked before the single-letter suffixes
        if let Some(n) = raw.strip_suffix("mo") {
            Ok(Lookback::Months(parse_count(n)?))
        } else if let Some(n) = raw.strip_suffix('d') {
            Ok(Lookback::Days(parse_count(n)?))
        } else if let Some(n) = raw.strip_suffix('y') {
            Ok(Lookback::Years(parse_count(n)?))
        } else {
            Err(err())
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Days(n) => write!(f, "{}d", n),
            Lookback::Months(n) => write!(f, "{}mo", n),
            Lookback::Years(n) => write!(f, "{}y", n),
            Lookback::YearToDate => f.write_str("ytd"),
            Lookback::Max => f.write_str("max"),
        }
    }
}

impl TryFrom<String> for Lookback {
    type Error = ParseWindowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Lookback> for String {
    fn from(l: Lookback) -> Self {
        l.to_string()
    }
}

/// Bar sampling interval supported by the chart API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    #[default]
    OneHour,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl Interval {
    const ALL: [Interval; 13] = [
        Interval::OneMinute,
        Interval::TwoMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::SixtyMinutes,
        Interval::NinetyMinutes,
        Interval::OneHour,
        Interval::OneDay,
        Interval::FiveDays,
        Interval::OneWeek,
        Interval::OneMonth,
        Interval::ThreeMonths,
    ];

    /// Provider query-string form
    pub const fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::SixtyMinutes => "60m",
            Interval::NinetyMinutes => "90m",
            Interval::OneHour => "1h",
            Interval::OneDay => "1d",
            Interval::FiveDays => "5d",
            Interval::OneWeek => "1wk",
            Interval::OneMonth => "1mo",
            Interval::ThreeMonths => "3mo",
        }
    }

    /// True for sub-daily bars, which carry a full date-time rather than a
    /// session date
    pub const fn is_intraday(&self) -> bool {
        matches!(
            self,
            Interval::OneMinute
                | Interval::TwoMinutes
                | Interval::FiveMinutes
                | Interval::FifteenMinutes
                | Interval::ThirtyMinutes
                | Interval::SixtyMinutes
                | Interval::NinetyMinutes
                | Interval::OneHour
        )
    }

    /// Shortest span one bar can cover, in seconds
    ///
    /// Months count as 28 days and quarters as 89.
    pub const fn min_period_secs(&self) -> i64 {
        const MINUTE: i64 = 60;
        const DAY: i64 = 86_400;
        match self {
            Interval::OneMinute => MINUTE,
            Interval::TwoMinutes => 2 * MINUTE,
            Interval::FiveMinutes => 5 * MINUTE,
            Interval::FifteenMinutes => 15 * MINUTE,
            Interval::ThirtyMinutes => 30 * MINUTE,
            Interval::SixtyMinutes | Interval::OneHour => 60 * MINUTE,
            Interval::NinetyMinutes => 90 * MINUTE,
            Interval::OneDay => DAY,
            Interval::FiveDays => 5 * DAY,
            Interval::OneWeek => 7 * DAY,
            Interval::OneMonth => 28 * DAY,
            Interval::ThreeMonths => 89 * DAY,
        }
    }
}

impl FromStr for Interval {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().to_lowercase();
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == raw)
            .ok_or_else(|| ParseWindowError::Interval(s.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Interval {
    type Error = ParseWindowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Interval> for String {
    fn from(i: Interval) -> Self {
        i.as_str().to_string()
    }
}
