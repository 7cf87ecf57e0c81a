use clap::Parser;
use std::path::Path;
use stock_ingest::cli::{Cli, Commands};
use stock_ingest::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration; environment variables override the file
    let mut config = if Path::new(&cli.config).exists() {
        Config::load(&cli.config)?
    } else {
        eprintln!("Warning: {} not found, using defaults and environment", cli.config);
        Config::default()
    };
    config.apply_process_env()?;
    config.validate(cli.command.requires_database())?;

    // Initialize telemetry
    stock_ingest::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(dry_run = args.dry_run, "Starting ingestion run");
            args.execute(&config).await?;
        }
        Commands::Schedule(args) => {
            tracing::info!(dry_run = args.dry_run, "Starting scheduler");
            args.execute(&config).await?;
        }
        Commands::Config => {
            println!("# Effective configuration ({})", cli.config);
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
