//! Pipeline orchestrator
//!
//! One run: collect a batch for every configured symbol, then upsert it.

use crate::ingest::BatchCollector;
use crate::model::Symbol;
use crate::store::{StoreError, UpsertWriter};
use crate::telemetry;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// A run that did not complete
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("collection failed: {0}")]
    Collect(String),

    #[error("write failed: {0}")]
    Write(#[from] StoreError),
}

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// Normalized rows collected, before duplicate keys were collapsed
    pub rows_collected: usize,
    pub rows_written: u64,
    pub fetched: Vec<Symbol>,
    pub empty: Vec<Symbol>,
    pub failed: Vec<Symbol>,
    pub elapsed: Duration,
}

/// Fetch → normalize → upsert for a fixed set of symbols
pub struct Pipeline {
    symbols: Vec<Symbol>,
    collector: BatchCollector,
    writer: UpsertWriter,
}

impl Pipeline {
    pub fn new(symbols: Vec<Symbol>, collector: BatchCollector, writer: UpsertWriter) -> Self {
        Self {
            symbols,
            collector,
            writer,
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Execute one run
    ///
    /// Per-symbol fetch failures are skipped. A run with nothing to write
    /// succeeds with `rows_written == 0`. Does not retry.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);

        let result = self.execute(run_id).instrument(span).await;
        telemetry::record_run(if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        tracing::info!(symbols = self.symbols.len(), "Run started");

        let batch = match self.collector.collect(&self.symbols).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(error = %e, "Run failed during collection");
                return Err(PipelineError::Collect(e.to_string()));
            }
        };

        let rows_written = match self.writer.write(&batch).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, rows = batch.len(), "Run failed during write");
                return Err(PipelineError::Write(e));
            }
        };

        let outcome = RunOutcome {
            run_id,
            rows_collected: batch.len(),
            rows_written,
            fetched: batch.fetched().to_vec(),
            empty: batch.empty_symbols().to_vec(),
            failed: batch.failed().to_vec(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            rows_collected = outcome.rows_collected,
            rows_written = outcome.rows_written,
            fetched = outcome.fetched.len(),
            empty = outcome.empty.len(),
            failed = outcome.failed.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Run complete"
        );

        Ok(outcome)
    }
}
