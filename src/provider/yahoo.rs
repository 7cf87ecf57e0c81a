//! Yahoo Finance chart provider
//!
//! Fetches OHLCV bars from Yahoo's v8 chart API for a relative range
//! ("2d") at a given interval ("1h"). Intraday intervals yield date-time
//! rows; daily and coarser intervals yield session-date rows in the exchange
//! time zone named by the response metadata.
//!
//! While a market is open Yahoo may append the in-progress bar as its own
//! row stamped at the last trade. That row is folded into the bar it belongs
//! to, so every stored key sits on the interval grid.

use super::{ExchangeZone, FetchError, FetchOutcome, PriceProvider, RawRow, RawSeries};
use crate::model::{Interval, Lookback, Symbol};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Yahoo chart API base URL
pub const YAHOO_CHART_URL: &str = "https://query2.finance.yahoo.com";

/// Longest error body kept in `FetchError::Http`
const MAX_ERROR_BODY: usize = 200;

/// Configuration for the Yahoo client
#[derive(Debug, Clone)]
pub struct YahooConfig {
    /// Base URL, overridable for tests
    pub base_url: String,
    /// Deadline for the whole request, connect through body
    pub timeout: Duration,
    /// User-Agent header; Yahoo rejects some default client agents
    pub user_agent: String,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            base_url: YAHOO_CHART_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (compatible; stock-ingest)".to_string(),
        }
    }
}

/// Client for Yahoo's chart API
pub struct YahooProvider {
    config: YahooConfig,
    client: Client,
}

impl YahooProvider {
    /// Create a provider with custom configuration
    pub fn with_config(config: YahooConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { config, client })
    }

    /// Chart endpoint for one symbol
    fn chart_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.config.base_url.trim_end_matches('/'),
            symbol
        )
    }

    /// Issue the request and decode the body
    async fn request(
        &self,
        symbol: &Symbol,
        lookback: Lookback,
        interval: Interval,
    ) -> Result<Option<RawSeries>, FetchError> {
        let url = self.chart_url(symbol);

        tracing::debug!(url = %url, %lookback, %interval, "Requesting chart");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("range", lookback.to_string()),
                ("interval", interval.as_str().to_string()),
                ("includePrePost", "false".to_string()),
                ("events", "div,splits".to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(FetchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let chart: ChartResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Malformed(e.to_string())
            } else {
                self.classify(e)
            }
        })?;

        parse_chart(symbol, interval, chart)
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.config.timeout)
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        lookback: Lookback,
        interval: Interval,
    ) -> FetchOutcome {
        match self.request(symbol, lookback, interval).await {
            Ok(Some(series)) => FetchOutcome::Series(series),
            Ok(None) => FetchOutcome::Empty,
            Err(e) => FetchOutcome::Failed(e),
        }
    }
}

/// Chart API response envelope
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    /// Current exchange offset from UTC in seconds, DST included
    #[serde(default)]
    gmtoffset: i32,
    exchange_timezone_name: Option<String>,
}

impl ChartMeta {
    /// The named zone when it is known, otherwise the reported offset
    fn zone(&self) -> ExchangeZone {
        if let Some(tz) = self
            .exchange_timezone_name
            .as_deref()
            .and_then(|name| name.parse::<Tz>().ok())
        {
            return ExchangeZone::Named(tz);
        }
        match FixedOffset::east_opt(self.gmtoffset) {
            Some(offset) => ExchangeZone::Fixed(offset),
            None => ExchangeZone::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Convert a decoded chart response into a raw series
///
/// Returns `Ok(None)` when the window holds no bars. Rows where every numeric
/// field is null are dropped here, matching what the provider's own client
/// libraries do; rows with only some fields missing are kept.
fn parse_chart(
    symbol: &Symbol,
    interval: Interval,
    chart: ChartResponse,
) -> Result<Option<RawSeries>, FetchError> {
    if let Some(err) = chart.chart.error {
        if err.code == "Not Found" {
            return Err(FetchError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        return Err(FetchError::Provider {
            code: err.code,
            description: err.description,
        });
    }

    let mut results = chart
        .chart
        .result
        .ok_or_else(|| FetchError::Malformed("chart has neither result nor error".into()))?;

    if results.is_empty() {
        return Ok(None);
    }
    let data = results.swap_remove(0);

    let timestamps = match data.timestamp {
        Some(ts) if !ts.is_empty() => ts,
        _ => return Ok(None),
    };

    let zone = data.meta.zone();
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars: Vec<Bar> = timestamps
        .iter()
        .enumerate()
        .map(|(i, &ts)| Bar {
            ts,
            open: value_at(&quote.open, i),
            high: value_at(&quote.high, i),
            low: value_at(&quote.low, i),
            close: value_at(&quote.close, i),
            volume: value_at(&quote.volume, i),
        })
        .filter(|bar| !bar.is_all_missing())
        .collect();

    fold_live_bar(&mut bars, interval);

    let rows: Vec<RawRow> = bars
        .into_iter()
        .map(|bar| {
            let instant = DateTime::<Utc>::from_timestamp(bar.ts, 0);
            let (datetime, date) = if interval.is_intraday() {
                (instant, None)
            } else {
                (None, instant.map(|dt| zone.session_date(dt)))
            };
            RawRow {
                datetime,
                date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }
        })
        .collect();

    if rows.is_empty() {
        return Ok(None);
    }

    Ok(Some(RawSeries::new(symbol.clone(), rows).with_zone(zone)))
}

/// One decoded bar, keyed by its epoch timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    ts: i64,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl Bar {
    fn is_all_missing(&self) -> bool {
        self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }

    /// Extend this bar with a later partial bar of the same interval
    fn absorb(&mut self, later: &Bar) {
        self.open = self.open.or(later.open);
        self.high = combine(self.high, later.high, f64::max);
        self.low = combine(self.low, later.low, f64::min);
        self.close = later.close.or(self.close);
        self.volume = combine(self.volume, later.volume, |a, b| a + b);
    }
}

/// Fold a trailing in-progress bar into the bar whose interval contains it
fn fold_live_bar(bars: &mut Vec<Bar>, interval: Interval) {
    let (bar_ts, live_ts) = match bars.as_slice() {
        [.., previous, last] => (previous.ts, last.ts),
        _ => return,
    };

    let gap = live_ts - bar_ts;
    if gap < 0 || gap >= interval.min_period_secs() {
        return;
    }

    tracing::debug!(bar_ts, live_ts, "Folding in-progress bar into its interval");
    if let Some(live) = bars.pop() {
        if let Some(bar) = bars.last_mut() {
            bar.absorb(&live);
        }
    }
}

fn combine(a: Option<f64>, b: Option<f64>, f: impl Fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(f(a, b)),
        (a, b) => a.or(b),
    }
}

fn value_at(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
