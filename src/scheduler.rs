//! Trigger loop around the pipeline
//!
//! Triggers fire on multiples of the configured period since the Unix epoch.
//! Runs are sequential; a trigger that falls due while a run is still active
//! is skipped rather than replayed.

use crate::config::ScheduleConfig;
use crate::pipeline::{Pipeline, PipelineError, RunOutcome};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;

/// The first period boundary strictly after `now`
pub fn next_trigger_after(now: DateTime<Utc>, every: Duration) -> DateTime<Utc> {
    let every_ms = i64::try_from(every.as_millis()).unwrap_or(i64::MAX).max(1);
    let next_ms = (now.timestamp_millis().div_euclid(every_ms) + 1).saturating_mul(every_ms);

    DateTime::from_timestamp_millis(next_ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Counters for one scheduler lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub triggers: u32,
    /// Individual `run()` calls, retries included
    pub runs: u32,
    /// Triggers whose retries were exhausted
    pub failed_triggers: u32,
}

enum Trigger {
    Done(Result<RunOutcome, PipelineError>),
    Stopped,
}

/// Runs the pipeline on a fixed period with whole-run retries
pub struct Scheduler {
    pipeline: Pipeline,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, config: ScheduleConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn next_trigger_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_trigger_after(now, self.config.every())
    }

    /// Run until Ctrl-C
    pub async fn run(&self) -> SchedulerStats {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await
    }

    /// Run until `shutdown` completes
    ///
    /// `shutdown` is only observed between runs and while sleeping.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = SchedulerStats::default();

        tracing::info!(
            every_secs = self.config.every_secs,
            retries = self.config.retries,
            symbols = self.pipeline.symbols().len(),
            "Scheduler started"
        );

        let mut fire_now = self.config.run_immediately;
        loop {
            if !fire_now {
                let next = self.next_trigger_after(Utc::now());
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tracing::info!(next_trigger = %next, "Waiting for next trigger");

                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = shutdown.as_mut() => break,
                }
            }
            fire_now = false;

            match self.trigger(&mut stats, shutdown.as_mut()).await {
                Trigger::Stopped => break,
                Trigger::Done(Ok(outcome)) => {
                    tracing::info!(
                        run_id = %outcome.run_id,
                        rows_written = outcome.rows_written,
                        "Trigger succeeded"
                    );
                }
                Trigger::Done(Err(e)) => {
                    stats.failed_triggers += 1;
                    tracing::error!(
                        error = %e,
                        attempts = self.config.retries + 1,
                        "Trigger failed after all retries"
                    );
                }
            }
        }

        tracing::info!(
            triggers = stats.triggers,
            runs = stats.runs,
            failed_triggers = stats.failed_triggers,
            "Scheduler stopped"
        );
        stats
    }

    /// One trigger: the run plus up to `retries` fixed-delay retries
    async fn trigger<F>(&self, stats: &mut SchedulerStats, mut shutdown: Pin<&mut F>) -> Trigger
    where
        F: Future<Output = ()>,
    {
        stats.triggers += 1;
        let mut retry = 0;

        loop {
            stats.runs += 1;
            let result = self.pipeline.run().await;

            match result {
                Err(e) if retry < self.config.retries => {
                    retry += 1;
                    tracing::warn!(
                        error = %e,
                        retry,
                        of = self.config.retries,
                        delay_secs = self.config.retry_delay_secs,
                        "Run failed, retrying"
                    );

                    tokio::select! {
                        _ = sleep(self.config.retry_delay()) => {}
                        _ = shutdown.as_mut() => return Trigger::Stopped,
                    }
                }
                result => return Trigger::Done(result),
            }
        }
    }
}
