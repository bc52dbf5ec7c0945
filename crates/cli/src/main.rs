//! fwctl - feedwatch CLI
//!
//! Queries the feedwatch daemon for feed metrics, baselines, alert
//! states and ingestion failures.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{feed, feeds};

/// feedwatch CLI
#[derive(Parser, Debug)]
#[command(name = "fwctl")]
#[command(author, version, about = "CLI for the feedwatch feed monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via FWCTL_API_URL env var)
    #[arg(long, env = "FWCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format [default: table]
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identifies one monitored feed
#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Vendor name
    #[arg(long)]
    pub vendor: String,

    /// Monitored folder path
    #[arg(long)]
    pub folder: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List monitored feeds with their alert level
    Feeds,

    /// Show the latest interval metrics for a feed
    Metrics(FeedArgs),

    /// Show a feed's baseline for one metric
    Baseline {
        #[command(flatten)]
        feed: FeedArgs,

        /// Metric kind (arrival_window, size_range, arrival_rate, folder_growth)
        #[arg(long, short)]
        metric: String,
    },

    /// Show the alert state of every metric for a feed
    Alerts(FeedArgs),

    /// List feeds whose last evaluation failed
    Failures,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let file_config = config::Config::load()?;
    let api_url = file_config.resolve_api_url(cli.api_url);
    let format = file_config.resolve_format(cli.format)?;

    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Feeds => feeds::list_feeds(&client, format).await?,
        Commands::Failures => feeds::list_failures(&client, format).await?,
        Commands::Metrics(f) => feed::show_metrics(&client, &f.vendor, &f.folder, format).await?,
        Commands::Baseline { feed: f, metric } => {
            feed::show_baseline(&client, &f.vendor, &f.folder, &metric, format).await?
        }
        Commands::Alerts(f) => feed::show_alerts(&client, &f.vendor, &f.folder, format).await?,
    }

    Ok(())
}
