//! Core data model
//!
//! Instruments, normalized price points, the per-run batch, and the typed
//! lookback window / sampling interval sent to the provider.

mod price;
mod window;

pub use price::{Batch, PricePoint, Symbol};
pub use window::{Interval, Lookback, ParseWindowError};
