//! In-memory price store
//!
//! Same upsert contract as the PostgreSQL store. Used by dry runs and tests.

use super::{PriceStore, StoreError};
use crate::model::{PricePoint, Symbol};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Key = (Symbol, DateTime<Utc>);

#[derive(Default)]
struct State {
    rows: BTreeMap<Key, PricePoint>,
    fail_with: Option<String>,
}

/// Price store backed by an ordered map
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    write_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upsert fail with `reason`
    pub async fn fail_writes(&self, reason: impl Into<String>) {
        self.state.write().await.fail_with = Some(reason.into());
    }

    /// Clear an injected failure
    pub async fn accept_writes(&self) {
        self.state.write().await.fail_with = None;
    }

    /// Number of upsert calls received, failed ones included
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// All stored rows in key order
    pub async fn snapshot(&self) -> Vec<PricePoint> {
        self.state.read().await.rows.values().cloned().collect()
    }

    pub async fn get(&self, symbol: &Symbol, timestamp: DateTime<Utc>) -> Option<PricePoint> {
        self.state
            .read()
            .await
            .rows
            .get(&(symbol.clone(), timestamp))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rows.is_empty()
    }
}

#[async_trait]
impl PriceStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, points: &[PricePoint]) -> Result<u64, StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;

        if let Some(reason) = &state.fail_with {
            return Err(StoreError::Rejected(reason.clone()));
        }

        for point in points {
            state
                .rows
                .insert((point.symbol.clone(), point.timestamp), point.clone());
        }

        Ok(points.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(symbol: &str, day: u32, close: Option<f64>) -> PricePoint {
        PricePoint {
            symbol: Symbol::new(symbol),
            timestamp: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_overwrites() {
        let store = InMemoryStore::new();

        store
            .upsert(&[point("MSFT", 2, Some(420.0)), point("MSFT", 3, Some(421.0))])
            .await
            .unwrap();
        store.upsert(&[point("MSFT", 3, Some(425.0))]).await.unwrap();

        assert_eq!(store.len().await, 2);
        let day3 = point("MSFT", 3, None).timestamp;
        let stored = store.get(&Symbol::new("MSFT"), day3).await.unwrap();
        assert_eq!(stored.close, Some(425.0));
    }

    #[tokio::test]
    async fn test_overwrite_with_nulls() {
        let store = InMemoryStore::new();

        store.upsert(&[point("MSFT", 2, Some(420.0))]).await.unwrap();
        store.upsert(&[point("MSFT", 2, None)]).await.unwrap();

        let day2 = point("MSFT", 2, None).timestamp;
        let stored = store.get(&Symbol::new("MSFT"), day2).await.unwrap();
        assert_eq!(stored.close, None);
    }

    #[tokio::test]
    async fn test_snapshot_in_key_order() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                point("TSLA", 3, Some(1.0)),
                point("AAPL", 2, Some(2.0)),
                point("TSLA", 2, Some(3.0)),
            ])
            .await
            .unwrap();

        let keys: Vec<(String, u32)> = store
            .snapshot()
            .await
            .iter()
            .map(|p| (p.symbol.to_string(), p.timestamp.format("%d").to_string().parse().unwrap()))
            .collect();
        assert_eq!(
            keys,
            vec![("AAPL".into(), 2), ("TSLA".into(), 2), ("TSLA".into(), 3)]
        );
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryStore::new();
        store.fail_writes("disk full").await;

        let err = store.upsert(&[point("AMZN", 2, Some(1.0))]).await.unwrap_err();
        assert_eq!(err.to_string(), "write rejected: disk full");
        assert!(store.is_empty().await);

        store.accept_writes().await;
        assert_eq!(store.upsert(&[point("AMZN", 2, Some(1.0))]).await.unwrap(), 1);
        assert_eq!(store.write_calls(), 2);
    }
}
