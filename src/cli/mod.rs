//! CLI interface for stock-ingest
//!
//! Provides subcommands for:
//! - `run`: One ingestion run
//! - `schedule`: Periodic runs until Ctrl-C
//! - `config`: Show the effective configuration

mod run;
mod schedule;

pub use run::RunArgs;
pub use schedule::ScheduleArgs;

use crate::config::Config;
use crate::ingest::{BatchCollector, CollectorConfig};
use crate::pipeline::Pipeline;
use crate::provider::{PriceProvider, RetryingProvider, YahooProvider};
use crate::store::{InMemoryStore, PgPriceStore, PriceStore, UpsertWriter};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "stock-ingest")]
#[command(about = "Idempotent stock price ingestion into PostgreSQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and upsert once
    Run(RunArgs),
    /// Run on a fixed period until interrupted
    Schedule(ScheduleArgs),
    /// Show configuration (secrets redacted)
    Config,
}

impl Commands {
    /// Whether database credentials must be configured
    pub fn requires_database(&self) -> bool {
        match self {
            Commands::Run(args) => !args.dry_run,
            Commands::Schedule(args) => !args.dry_run,
            Commands::Config => false,
        }
    }
}

/// Wire provider, collector and store from configuration
///
/// A dry run writes to an in-memory store instead of PostgreSQL.
pub fn build_pipeline(config: &Config, dry_run: bool) -> anyhow::Result<Pipeline> {
    let yahoo = YahooProvider::with_config(config.provider.yahoo())?;
    let provider: Arc<dyn PriceProvider> = Arc::new(RetryingProvider::new(
        yahoo,
        config.provider.retry.policy(),
    ));

    let collector = BatchCollector::new(
        provider,
        CollectorConfig {
            lookback: config.provider.lookback,
            interval: config.provider.interval,
            concurrency: config.provider.concurrency,
        },
    );

    let store: Arc<dyn PriceStore> = if dry_run {
        tracing::warn!("Dry run: rows are kept in memory and discarded");
        Arc::new(InMemoryStore::new())
    } else {
        let db = &config.database;
        Arc::new(
            PgPriceStore::new(db.connect_options()?, db.table.as_str())?
                .with_chunk_size(db.chunk_size)
                .with_connect_timeout(db.connect_timeout())
                .with_statement_timeout(db.connect_timeout()),
        )
    };

    Ok(Pipeline::new(
        config.symbols.clone(),
        collector,
        UpsertWriter::new(store),
    ))
}
