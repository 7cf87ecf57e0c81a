//! Bounded retry with exponential backoff around a provider

use super::{FetchError, FetchOutcome, PriceProvider};
use crate::model::{Interval, Lookback, Symbol};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (1-based), doubling each time
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Whether a failure on `attempt` (1-based) should be retried
    pub fn should_retry(&self, attempt: u32, error: &FetchError) -> bool {
        attempt < self.max_attempts.max(1) && error.is_transient()
    }

    fn delay_after(&self, retry: u32, error: &FetchError) -> Duration {
        let backoff = self.delay_for(retry);
        match error {
            FetchError::RateLimited { retry_after_secs } => backoff
                .max(Duration::from_secs(*retry_after_secs))
                .min(self.max_delay),
            _ => backoff,
        }
    }
}

/// Provider wrapper that retries transient failures
///
/// `Empty` and permanent failures are returned immediately.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: PriceProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<P: PriceProvider> PriceProvider for RetryingProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        lookback: Lookback,
        interval: Interval,
    ) -> FetchOutcome {
        let mut attempt = 1;

        loop {
            let outcome = self.inner.fetch(symbol, lookback, interval).await;

            if let FetchOutcome::Failed(error) = &outcome {
                if self.policy.should_retry(attempt, error) {
                    let delay = self.policy.delay_after(attempt, error);
                    tracing::warn!(
                        symbol = %symbol,
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch failure, retrying"
                    );

                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }

            return outcome;
        }
    }
}
