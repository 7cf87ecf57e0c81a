//! Price point and batch types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (e.g., "AAPL")
///
/// Opaque to the pipeline: it is forwarded to the provider as-is and stored
/// verbatim. Surrounding whitespace is trimmed on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol from any string-like value
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_string())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the identifier is empty after trimming
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// A single normalized OHLCV bar, the unit persisted to the store
///
/// `(symbol, timestamp)` is the unique key. Every numeric field is nullable
/// so that a bar with a missing value is stored rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<i64>,
}

impl PricePoint {
    /// The upsert key
    pub fn key(&self) -> (&Symbol, DateTime<Utc>) {
        (&self.symbol, self.timestamp)
    }
}

/// All points collected in one run, plus per-instrument bookkeeping
///
/// Point order carries no meaning.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    points: Vec<PricePoint>,
    fetched: Vec<Symbol>,
    empty: Vec<Symbol>,
    failed: Vec<Symbol>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the normalized rows of one instrument
    ///
    /// An instrument whose rows were all dropped during normalization counts
    /// as empty, not fetched.
    pub fn record_rows(&mut self, symbol: Symbol, rows: Vec<PricePoint>) {
        if rows.is_empty() {
            self.empty.push(symbol);
        } else {
            self.points.extend(rows);
            self.fetched.push(symbol);
        }
    }

    /// Note an instrument for which the provider had no data
    pub fn record_empty(&mut self, symbol: Symbol) {
        self.empty.push(symbol);
    }

    /// Note an instrument whose fetch failed
    pub fn record_failure(&mut self, symbol: Symbol) {
        self.failed.push(symbol);
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Instruments that contributed at least one row
    pub fn fetched(&self) -> &[Symbol] {
        &self.fetched
    }

    /// Instruments that returned no usable rows
    pub fn empty_symbols(&self) -> &[Symbol] {
        &self.empty
    }

    /// Instruments whose fetch failed
    pub fn failed(&self) -> &[Symbol] {
        &self.failed
    }
}
