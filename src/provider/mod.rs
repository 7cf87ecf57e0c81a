//! Price data provider module
//!
//! Fetches raw bar series for one instrument at a time. A fetch never raises:
//! it resolves to data, an explicit empty marker, or a per-instrument failure.

mod retry;
mod yahoo;

pub use retry::{RetryPolicy, RetryingProvider};
pub use yahoo::{YahooConfig, YahooProvider, YAHOO_CHART_URL};

use crate::model::{Interval, Lookback, Symbol};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use thiserror::Error;

/// One provider row, before validation
///
/// A row carries either an intraday `datetime` or a session `date`,
/// depending on the requested interval. Numeric fields are exactly what the
/// provider sent, including NaN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub datetime: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Exchange time zone used to date sessions and anchor date-only rows
///
/// A named zone keeps session keys stable across DST changes. A fixed
/// offset is the fallback when the provider does not name its zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExchangeZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Default for ExchangeZone {
    fn default() -> Self {
        ExchangeZone::Fixed(Utc.fix())
    }
}

impl ExchangeZone {
    /// Calendar date of `instant` on the exchange
    pub fn session_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            ExchangeZone::Named(tz) => instant.with_timezone(tz).date_naive(),
            ExchangeZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// First instant of `date` on the exchange, in UTC
    pub fn start_of_day(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        match self {
            ExchangeZone::Named(tz) => tz
                .from_local_datetime(&midnight)
                .earliest()
                // Zones that skip midnight on DST change start the day an hour later
                .or_else(|| tz.from_local_datetime(&(midnight + TimeDelta::hours(1))).earliest())
                .map(|dt| dt.with_timezone(&Utc)),
            ExchangeZone::Fixed(offset) => offset
                .from_local_datetime(&midnight)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Provider response for one instrument
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub symbol: Symbol,
    /// Exchange zone used to anchor date-only rows
    pub zone: ExchangeZone,
    pub rows: Vec<RawRow>,
}

impl RawSeries {
    /// Create a series whose date-only rows are anchored at UTC
    pub fn new(symbol: Symbol, rows: Vec<RawRow>) -> Self {
        Self {
            symbol,
            zone: ExchangeZone::default(),
            rows,
        }
    }

    /// Set the exchange zone
    pub fn with_zone(mut self, zone: ExchangeZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-instrument fetch failure
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether repeating the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::RateLimited { .. } => {
                true
            }
            FetchError::Http { status, .. } => *status >= 500,
            FetchError::SymbolNotFound { .. }
            | FetchError::Provider { .. }
            | FetchError::Malformed(_) => false,
        }
    }
}

/// Result of one fetch
///
/// `Empty` (no bars in the window, e.g. a market holiday) is deliberately
/// separate from `Failed`.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Series(RawSeries),
    Empty,
    Failed(FetchError),
}

impl FetchOutcome {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Series(_) => "series",
            FetchOutcome::Empty => "empty",
            FetchOutcome::Failed(_) => "failed",
        }
    }
}

/// Trait for price data providers
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Fetch bars for `symbol` covering `lookback` at `interval`
    ///
    /// Issues a single outbound request and does not retry.
    async fn fetch(&self, symbol: &Symbol, lookback: Lookback, interval: Interval)
        -> FetchOutcome;
}
