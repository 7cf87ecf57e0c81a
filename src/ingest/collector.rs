//! Batch collector
//!
//! Fetches and normalizes every configured instrument with bounded
//! concurrency and merges the results into a single [`Batch`]. One
//! instrument's failure never affects another's rows.

use super::normalizer::normalize_with_stats;
use crate::model::{Batch, Interval, Lookback, PricePoint, Symbol};
use crate::provider::{FetchOutcome, PriceProvider};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// A collection task ended abnormally
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("collection task for {symbol} aborted: {reason}")]
    TaskAborted { symbol: Symbol, reason: String },
}

/// Collector settings
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    pub lookback: Lookback,
    pub interval: Interval,
    /// Maximum in-flight fetches
    pub concurrency: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            lookback: Lookback::default(),
            interval: Interval::default(),
            concurrency: 4,
        }
    }
}

enum InstrumentResult {
    Rows(Vec<PricePoint>),
    Empty,
    Failed,
}

/// Collects one batch per run from a price provider
pub struct BatchCollector {
    provider: Arc<dyn PriceProvider>,
    config: CollectorConfig,
}

impl BatchCollector {
    pub fn new(provider: Arc<dyn PriceProvider>, config: CollectorConfig) -> Self {
        Self { provider, config }
    }

    /// Collect all `symbols` into one batch
    ///
    /// Empty and failed instruments are logged and skipped. The returned
    /// batch lists instruments in input order. Only an aborted task (a
    /// panic inside a provider) is an error.
    pub async fn collect(&self, symbols: &[Symbol]) -> Result<Batch, CollectError> {
        let concurrency = self.config.concurrency.max(1);
        let CollectorConfig {
            lookback, interval, ..
        } = self.config;

        tracing::info!(
            provider = self.provider.name(),
            symbols = symbols.len(),
            lookback = %lookback,
            interval = %interval,
            concurrency,
            "Collecting batch"
        );

        let mut results: Vec<_> = stream::iter(symbols.iter().cloned().enumerate())
            .map(|(index, symbol)| {
                let provider = Arc::clone(&self.provider);
                let task_symbol = symbol.clone();
                let handle = tokio::spawn(async move {
                    collect_one(provider, task_symbol, lookback, interval).await
                });
                async move { (index, symbol, handle.await) }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|(index, _, _)| *index);

        let mut batch = Batch::new();
        for (_, symbol, joined) in results {
            match joined {
                Ok(InstrumentResult::Rows(points)) => batch.record_rows(symbol, points),
                Ok(InstrumentResult::Empty) => batch.record_empty(symbol),
                Ok(InstrumentResult::Failed) => batch.record_failure(symbol),
                Err(e) => {
                    return Err(CollectError::TaskAborted {
                        symbol,
                        reason: e.to_string(),
                    })
                }
            }
        }

        if batch.is_empty() {
            tracing::warn!(
                empty = batch.empty_symbols().len(),
                failed = batch.failed().len(),
                "No data fetched for any symbol"
            );
        } else {
            tracing::info!(
                rows = batch.len(),
                fetched = batch.fetched().len(),
                empty = batch.empty_symbols().len(),
                failed = batch.failed().len(),
                "Batch collected"
            );
        }

        Ok(batch)
    }
}

async fn collect_one(
    provider: Arc<dyn PriceProvider>,
    symbol: Symbol,
    lookback: Lookback,
    interval: Interval,
) -> InstrumentResult {
    let started = Instant::now();
    let outcome = provider.fetch(&symbol, lookback, interval).await;
    telemetry::record_latency(LatencyMetric::Fetch, started.elapsed());
    telemetry::record_fetch(outcome.label());

    match outcome {
        FetchOutcome::Series(series) => {
            let (points, dropped) = normalize_with_stats(&series, &symbol);
            if dropped > 0 {
                tracing::warn!(symbol = %symbol, dropped, "Dropped rows without a timestamp");
                telemetry::increment(CounterMetric::RowsDropped, dropped as u64);
            }
            tracing::info!(symbol = %symbol, rows = points.len(), "Fetched series");
            InstrumentResult::Rows(points)
        }
        FetchOutcome::Empty => {
            tracing::warn!(symbol = %symbol, "No data returned, skipping");
            InstrumentResult::Empty
        }
        FetchOutcome::Failed(error) => {
            tracing::error!(
                symbol = %symbol,
                error = %error,
                transient = error.is_transient(),
                "Fetch failed, skipping"
            );
            InstrumentResult::Failed
        }
    }
}
