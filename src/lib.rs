//! stock-ingest: Idempotent stock price ingestion
//!
//! This library provides the core components for:
//! - Fetching bar series from the Yahoo chart API with bounded retries
//! - Normalizing raw rows into typed price points
//! - Collecting a batch across instruments with failure isolation
//! - Upserting batches into PostgreSQL keyed by (symbol, timestamp)
//! - Hourly scheduling with whole-run retries
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod store;
pub mod telemetry;
