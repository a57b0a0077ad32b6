//! mirror-feeds - periodic data feeds for a smart mirror
//!
//! Keeps OAuth credentials alive without user interaction and refreshes
//! each feed on a fixed schedule.

mod api;
mod auth;
mod config;
mod dashboard;
mod feeds;
mod models;
mod updater;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dashboard::{Dashboard, FeedKind};

#[derive(Parser)]
#[command(name = "mirror-feeds")]
#[command(about = "Periodic data feeds with unattended OAuth token refresh", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep tokens in memory only
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all configured feeds until Ctrl-C
    Run,

    /// Show saved token state per service
    Status,

    /// Force an access token refresh
    Refresh {
        /// Service id (defaults to the first configured service)
        service: Option<String>,
    },

    /// Fetch one feed once and print the result
    Fetch {
        #[arg(value_enum)]
        feed: FeedKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let dashboard = Dashboard::load(cli.config.as_deref(), cli.ephemeral)?;

    match cli.command {
        Commands::Run => {
            dashboard.run().await?;
        }
        Commands::Status => {
            dashboard.status()?;
        }
        Commands::Refresh { service } => {
            tracing::info!("Refreshing access token...");
            dashboard.refresh(service.as_deref()).await?;
        }
        Commands::Fetch { feed } => {
            dashboard.fetch(feed).await?;
        }
    }

    Ok(())
}
