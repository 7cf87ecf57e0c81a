//! Ingestion module
//!
//! Normalizes raw provider series into price points and collects them across
//! all configured instruments into one batch per run.

mod collector;
mod normalizer;

pub use collector::{BatchCollector, CollectError, CollectorConfig};
pub use normalizer::{normalize, normalize_with_stats};
