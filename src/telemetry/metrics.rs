//! Prometheus metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless a
//! recorder is installed (see [`super::init_telemetry`]).

use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Rows dropped by the normalizer for lack of a timestamp
    RowsDropped,
    /// Rows upserted into the store
    RowsWritten,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One instrument fetch, including retries
    Fetch,
    /// One batch upsert
    Write,
}

impl CounterMetric {
    const fn name(self) -> &'static str {
        match self {
            CounterMetric::RowsDropped => "stock_ingest_rows_dropped_total",
            CounterMetric::RowsWritten => "stock_ingest_rows_written_total",
        }
    }
}

impl LatencyMetric {
    const fn name(self) -> &'static str {
        match self {
            LatencyMetric::Fetch => "stock_ingest_fetch_duration_seconds",
            LatencyMetric::Write => "stock_ingest_write_duration_seconds",
        }
    }
}

/// Add `value` to a counter
pub fn increment(metric: CounterMetric, value: u64) {
    ::metrics::counter!(metric.name()).increment(value);
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    ::metrics::histogram!(metric.name()).record(duration.as_secs_f64());
}

/// Count one fetch by outcome label (`series`, `empty`, `failed`)
pub fn record_fetch(outcome: &'static str) {
    ::metrics::counter!("stock_ingest_fetch_total", "outcome" => outcome).increment(1);
}

/// Count one finished run by status (`success`, `failure`)
pub fn record_run(status: &'static str) {
    ::metrics::counter!("stock_ingest_runs_total", "status" => status).increment(1);
}
