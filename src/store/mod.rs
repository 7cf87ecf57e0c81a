//! Persistence module
//!
//! Idempotent upsert of price points keyed by `(symbol, timestamp)`.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{PgPriceStore, DEFAULT_CHUNK_SIZE};

use crate::model::{Batch, PricePoint, Symbol};
use crate::telemetry::{self, CounterMetric, LatencyMetric};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Persistence failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    Connect(String),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("transaction failed: {0}")]
    Transaction(#[source] sqlx::Error),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Trait for price stores
///
/// `upsert` inserts absent keys and overwrites the numeric fields of present
/// ones. It is all-or-nothing: on error no row from `points` is visible.
/// Callers pass at most one point per key.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Store name for logs
    fn name(&self) -> &str;

    /// Upsert `points`, returning the number of rows inserted or updated
    async fn upsert(&self, points: &[PricePoint]) -> Result<u64, StoreError>;
}

/// Writes collected batches to a store
pub struct UpsertWriter {
    store: Arc<dyn PriceStore>,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Write one batch
    ///
    /// An empty batch is a no-op and never touches the store. Does not retry.
    pub async fn write(&self, batch: &Batch) -> Result<u64, StoreError> {
        if batch.is_empty() {
            tracing::info!(store = self.store.name(), "No data to write");
            return Ok(0);
        }

        let points = collapse_duplicates(batch.points());
        if points.len() < batch.len() {
            tracing::debug!(
                collapsed = batch.len() - points.len(),
                "Collapsed duplicate keys in batch"
            );
        }

        let started = Instant::now();
        let result = self.store.upsert(&points).await;
        telemetry::record_latency(LatencyMetric::Write, started.elapsed());

        match result {
            Ok(written) => {
                telemetry::increment(CounterMetric::RowsWritten, written);
                tracing::info!(
                    store = self.store.name(),
                    rows = written,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Batch written"
                );
                Ok(written)
            }
            Err(e) => {
                tracing::error!(
                    store = self.store.name(),
                    rows = points.len(),
                    error = %e,
                    "Batch write failed"
                );
                Err(e)
            }
        }
    }
}

/// Keep only the last point for each key, preserving relative order
fn collapse_duplicates(points: &[PricePoint]) -> Vec<PricePoint> {
    let mut seen: HashSet<(&Symbol, DateTime<Utc>)> = HashSet::with_capacity(points.len());
    let mut kept = Vec::with_capacity(points.len());
    for point in points.iter().rev() {
        if seen.insert(point.key()) {
            kept.push(point.clone());
        }
    }
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(symbol: &str, hour: u32, close: f64) -> PricePoint {
        PricePoint {
            symbol: Symbol::new(symbol),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, hour, 30, 0).unwrap(),
            open: Some(close - 1.0),
            high: Some(close + 1.0),
            low: Some(close - 2.0),
            close: Some(close),
            volume: Some(1000),
        }
    }

    fn batch(points: Vec<PricePoint>) -> Batch {
        let mut batch = Batch::new();
        batch.record_rows(Symbol::new("TSLA"), points);
        batch
    }

    #[test]
    fn test_collapse_keeps_last() {
        let points = vec![
            point("TSLA", 14, 100.0),
            point("TSLA", 15, 101.0),
            point("TSLA", 14, 105.0),
            point("AAPL", 14, 200.0),
        ];

        let kept = collapse_duplicates(&points);

        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].timestamp.format("%H").to_string(), "15");
        assert_eq!(kept[1].close, Some(105.0));
        assert_eq!(kept[2].symbol.as_str(), "AAPL");
    }

    #[tokio::test]
    async fn test_empty_batch_never_touches_store() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes("must not be called").await;
        let writer = UpsertWriter::new(store.clone());

        let written = writer.write(&Batch::new()).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let writer = UpsertWriter::new(store.clone());
        let batch = batch(vec![point("TSLA", 14, 100.0), point("TSLA", 15, 101.0)]);

        assert_eq!(writer.write(&batch).await.unwrap(), 2);
        let first = store.snapshot().await;
        assert_eq!(writer.write(&batch).await.unwrap(), 2);

        assert_eq!(store.snapshot().await, first);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_second_write_overwrites_key() {
        let store = Arc::new(InMemoryStore::new());
        let writer = UpsertWriter::new(store.clone());

        writer.write(&batch(vec![point("TSLA", 14, 100.0)])).await.unwrap();
        writer.write(&batch(vec![point("TSLA", 14, 110.0)])).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store
            .get(&Symbol::new("TSLA"), point("TSLA", 14, 0.0).timestamp)
            .await;
        assert_eq!(stored.unwrap().close, Some(110.0));
    }

    #[tokio::test]
    async fn test_in_batch_duplicates_last_wins() {
        let store = Arc::new(InMemoryStore::new());
        let writer = UpsertWriter::new(store.clone());

        let written = writer
            .write(&batch(vec![point("TSLA", 14, 100.0), point("TSLA", 14, 120.0)]))
            .await
            .unwrap();

        assert_eq!(written, 1);
        let stored = store
            .get(&Symbol::new("TSLA"), point("TSLA", 14, 0.0).timestamp)
            .await;
        assert_eq!(stored.unwrap().close, Some(120.0));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_writes("connection refused").await;
        let writer = UpsertWriter::new(store.clone());

        let err = writer
            .write(&batch(vec![point("TSLA", 14, 100.0)]))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.is_empty().await);
        assert_eq!(store.write_calls(), 1);
    }
}
