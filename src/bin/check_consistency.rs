//! Consistency check
//!
//! Replays the status and upgrade-composition logs and compares them with the
//! materialized tables. Exits with status 1 when any row has drifted.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eip_insights::config::AppConfig;
use eip_insights::database::Database;
use eip_insights::AnalyticsService;

#[derive(Parser)]
#[command(name = "check-consistency")]
#[command(about = "Verify that current-state tables match their event logs")]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only print the violation count
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with_writer(std::io::stderr)
        .init();

    let database = Database::new(&config.database_url, config.max_connections).await?;
    let service = AnalyticsService::from_config(&database, config)?;
    let report = service.consistency_report().await?;

    if cli.quiet {
        println!("{}", report.violations.len());
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.is_consistent() {
        info!("All {} rows match their logs", report.checked);
        Ok(())
    } else {
        error!("{} of {} rows drifted from their logs", report.violations.len(), report.checked);
        std::process::exit(1);
    }
}
