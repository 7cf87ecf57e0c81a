//! PostgreSQL price store
//!
//! Opens one connection per write and runs every chunk inside a single
//! transaction, so a batch lands whole or not at all.

use super::{PriceStore, StoreError};
use crate::model::PricePoint;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::time::Duration;

/// Rows per INSERT statement
pub const DEFAULT_CHUNK_SIZE: usize = 200;

const COLUMNS: usize = 7;
/// PostgreSQL caps bind parameters per statement at u16::MAX
const MAX_CHUNK_SIZE: usize = u16::MAX as usize / COLUMNS;

/// Price store writing to a pre-provisioned PostgreSQL table
pub struct PgPriceStore {
    options: PgConnectOptions,
    table: String,
    chunk_size: usize,
    connect_timeout: Duration,
}

impl PgPriceStore {
    /// Create a store for `table`, which must be a plain or schema-qualified
    /// SQL identifier
    pub fn new(options: PgConnectOptions, table: impl Into<String>) -> Result<Self, StoreError> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(StoreError::Rejected(format!(
                "invalid table name '{}'",
                table
            )));
        }

        Ok(Self {
            options,
            table,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Server-side limit on each statement, commit included
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        let millis = format!("{}ms", timeout.as_millis().max(1));
        self.options = self.options.options([("statement_timeout", millis)]);
        self
    }

    async fn connect(&self) -> Result<PgConnection, StoreError> {
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(StoreError::Connect(e.to_string())),
            Err(_) => Err(StoreError::Connect(format!(
                "timed out after {:?}",
                self.connect_timeout
            ))),
        }
    }

    async fn upsert_in_transaction(
        &self,
        conn: &mut PgConnection,
        points: &[PricePoint],
    ) -> Result<u64, StoreError> {
        let mut tx = conn.begin().await.map_err(StoreError::Transaction)?;
        let mut affected = 0;

        // On error the transaction is dropped, which rolls it back
        for chunk in points.chunks(self.chunk_size) {
            let result = upsert_query(&self.table, chunk).build().execute(&mut *tx).await?;
            affected += result.rows_affected();
        }

        tx.commit().await.map_err(StoreError::Transaction)?;
        Ok(affected)
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn upsert(&self, points: &[PricePoint]) -> Result<u64, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect().await?;
        let result = self.upsert_in_transaction(&mut conn, points).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close database connection");
        }

        if result.is_ok() {
            tracing::debug!(table = %self.table, rows = points.len(), "Upsert committed");
        }
        result
    }
}

/// Build one `INSERT ... ON CONFLICT DO UPDATE` statement for `chunk`
fn upsert_query<'a>(table: &str, chunk: &'a [PricePoint]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} (symbol, timestamp, open, high, low, close, volume) ",
        table
    ));

    builder.push_values(chunk, |mut b, point| {
        b.push_bind(point.symbol.as_str())
            .push_bind(point.timestamp)
            .push_bind(point.open)
            .push_bind(point.high)
            .push_bind(point.low)
            .push_bind(point.close)
            .push_bind(point.volume);
    });

    builder.push(
        " ON CONFLICT (symbol, timestamp) DO UPDATE SET \
         open = EXCLUDED.open, \
         high = EXCLUDED.high, \
         low = EXCLUDED.low, \
         close = EXCLUDED.close, \
         volume = EXCLUDED.volume",
    );

    builder
}

/// `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`
fn is_valid_table_name(table: &str) -> bool {
    let parts: Vec<&str> = table.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
