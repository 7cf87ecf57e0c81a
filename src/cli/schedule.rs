//! Schedule command implementation

use super::build_pipeline;
use crate::config::Config;
use crate::scheduler::Scheduler;
use clap::Args;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Fire one run at startup instead of waiting for the first boundary
    #[arg(long)]
    pub run_immediately: bool,

    /// Write to an in-memory store instead of PostgreSQL
    #[arg(long)]
    pub dry_run: bool,
}

impl ScheduleArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let pipeline = build_pipeline(config, self.dry_run)?;

        let mut schedule = config.scheduler.clone();
        schedule.run_immediately |= self.run_immediately;

        let stats = Scheduler::new(pipeline, schedule).run().await;
        if stats.failed_triggers > 0 {
            tracing::warn!(
                failed = stats.failed_triggers,
                triggers = stats.triggers,
                "Some triggers failed"
            );
        }
        Ok(())
    }
}
