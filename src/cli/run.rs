//! Run command implementation

use super::build_pipeline;
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Write to an in-memory store instead of PostgreSQL
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let pipeline = build_pipeline(config, self.dry_run)?;
        let outcome = pipeline.run().await?;

        println!(
            "run {}: {} rows written ({} fetched, {} empty, {} failed) in {:.1}s",
            outcome.run_id,
            outcome.rows_written,
            outcome.fetched.len(),
            outcome.empty.len(),
            outcome.failed.len(),
            outcome.elapsed.as_secs_f64()
        );
        Ok(())
    }
}
