//! Faultstash CLI - incremental error-tracker backups into S3
//!
//! Object-storage credentials resolve through the SDK's default chain:
//! environment variables, then the shared credentials file, then an
//! instance role.

use anyhow::Result;
use clap::Parser;
use faultstash::{BackupOrchestrator, HttpTransport, S3Store};
use faultstash_core::{RetryPolicy, RunConfig, DEFAULT_API_ENDPOINT};
use tracing::info;

#[derive(Parser)]
#[command(name = "faultstash")]
#[command(author, version, about = "Back up error-tracker projects, faults and notices to S3")]
struct Cli {
    /// S3 bucket to back up to
    #[arg(short, long, env = "S3_BUCKET")]
    bucket: String,

    /// Directory (key prefix) in the bucket to back up to
    #[arg(short = 'd', long, env = "S3_DIRECTORY", default_value = "")]
    directory: String,

    /// Comma separated list of projects to back up. If not set, all
    /// projects are backed up
    #[arg(short, long, env = "PROJECTS", default_value = "")]
    projects: String,

    /// Error-tracker API key
    #[arg(short = 'k', long, env = "API_KEY")]
    api_key: String,

    /// The time from which to search for new faults, overriding the saved
    /// ledger. Format: <year><month><day><hour><minute><second>,
    /// e.g. 20150430140508
    #[arg(short, long, env = "LAST_RUN")]
    last_run: Option<String>,

    /// Limit the number of notices retrieved per fault. Default is all
    /// notices
    #[arg(short, long, env = "NOTICE_LIMIT")]
    notice_limit: Option<usize>,

    /// Base URL of the projects API
    #[arg(long, env = "API_ENDPOINT", default_value = DEFAULT_API_ENDPOINT)]
    endpoint: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = RunConfig::new(cli.bucket, cli.api_key)?
        .with_prefix(cli.directory)
        .with_include_list(&cli.projects)
        .with_endpoint(cli.endpoint);
    if let Some(last_run) = &cli.last_run {
        config = config.with_last_run(last_run)?;
    }
    if let Some(limit) = cli.notice_limit {
        config = config.with_notice_limit(limit);
    }

    let transport = HttpTransport::new()?;
    let store = S3Store::from_env(RetryPolicy::default()).await;

    let mut orchestrator = BackupOrchestrator::new(config, transport, store);
    let uploaded = orchestrator.run().await?;

    if !uploaded.is_empty() {
        info!("list of uploaded files:");
        for location in &uploaded {
            info!("{location}");
        }
    }
    Ok(())
}
