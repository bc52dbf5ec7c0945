//! Fleet-wide listing commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_level, format_timestamp, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct FeedRow {
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Folder")]
    folder: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Ingestion")]
    ingestion: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Folder")]
    folder: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Streak")]
    consecutive: u32,
    #[tabled(rename = "Last Failure")]
    timestamp: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// List monitored feeds with their worst alert level
pub async fn list_feeds(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let feeds = client.feeds().await?;

    match format {
        OutputFormat::Json => print_json(&feeds)?,
        OutputFormat::Table => {
            let rows = feeds
                .into_iter()
                .map(|f| FeedRow {
                    vendor: f.vendor,
                    folder: f.folder,
                    level: color_level(&f.level),
                    ingestion: if f.failing { "failing" } else { "ok" }.to_string(),
                })
                .collect();
            print_table(rows, "No feeds known to the monitor yet");
        }
    }
    Ok(())
}

/// List the latest unresolved ingestion failure per feed
pub async fn list_failures(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let failures = client.failures().await?;

    match format {
        OutputFormat::Json => print_json(&failures)?,
        OutputFormat::Table => {
            let rows = failures
                .into_iter()
                .map(|f| FailureRow {
                    vendor: f.feed_key.vendor,
                    folder: f.feed_key.folder,
                    kind: f.kind,
                    consecutive: f.consecutive,
                    timestamp: format_timestamp(&f.timestamp),
                    message: f.message,
                })
                .collect();
            print_table(rows, "No ingestion failures");
        }
    }
    Ok(())
}
