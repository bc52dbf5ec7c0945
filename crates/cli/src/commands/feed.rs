//! Per-feed inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, BaselineView};
use crate::output::{
    color_level, format_bytes, format_growth, format_timestamp, print_info, print_json,
    print_table, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Breaches")]
    breaches: u32,
    #[tabled(rename = "Severe")]
    severe: u32,
    #[tabled(rename = "Clears")]
    clears: u32,
}

/// Show the feed's most recent interval metrics
pub async fn show_metrics(
    client: &ApiClient,
    vendor: &str,
    folder: &str,
    format: OutputFormat,
) -> Result<()> {
    let Some(metrics) = client.metrics(vendor, folder).await? else {
        print_warning(&format!("No metrics recorded for {}:{}", vendor, folder));
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&metrics)?,
        OutputFormat::Table => {
            println!("{}", "Current Metrics".bold());
            println!("{}", "=".repeat(50));
            println!("Feed:          {}:{}", vendor.cyan(), folder.cyan());
            println!(
                "Interval:      {} - {}",
                format_timestamp(&metrics.interval_start),
                format_timestamp(&metrics.interval_end)
            );
            println!();
            println!("New files:     {}", metrics.file_count);
            if let Some(window) = &metrics.arrival_window {
                println!(
                    "Arrivals:      {} - {}",
                    format_timestamp(&window.earliest),
                    format_timestamp(&window.latest)
                );
            }
            if let (Some(min), Some(max)) = (metrics.size_min, metrics.size_max) {
                println!("File sizes:    {} - {}", format_bytes(min), format_bytes(max));
            }
            println!("Folder size:   {}", format_bytes(metrics.folder_size_bytes));
            match metrics.growth_bytes {
                Some(growth) => println!("Growth:        {}", format_growth(growth)),
                None => println!("Growth:        {}", "n/a".dimmed()),
            }
        }
    }
    Ok(())
}

/// Show the baseline for one metric
pub async fn show_baseline(
    client: &ApiClient,
    vendor: &str,
    folder: &str,
    metric: &str,
    format: OutputFormat,
) -> Result<()> {
    let baseline = client.baseline(vendor, folder, metric).await?;

    match format {
        OutputFormat::Json => print_json(&baseline)?,
        OutputFormat::Table => match baseline {
            BaselineView::Building {
                kind,
                intervals,
                required,
            } => {
                print_info(&format!(
                    "{} baseline still building: {} of {} intervals recorded",
                    kind, intervals, required
                ));
            }
            BaselineView::Ready {
                kind,
                median,
                spread,
                lower_bound,
                upper_bound,
                samples,
            } => {
                println!("{}", format!("{} Baseline", kind).bold());
                println!("{}", "=".repeat(50));
                println!("Median:        {:.4}", median);
                println!("Spread (MAD):  {:.4}", spread);
                println!(
                    "Band:          {} - {}",
                    format!("{:.4}", lower_bound).green(),
                    format!("{:.4}", upper_bound).green()
                );
                println!("Samples:       {}", samples);
            }
        },
    }
    Ok(())
}

/// Show the hysteresis state of every metric
pub async fn show_alerts(
    client: &ApiClient,
    vendor: &str,
    folder: &str,
    format: OutputFormat,
) -> Result<()> {
    let alerts = client.alerts(vendor, folder).await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            println!("Feed: {}:{}", alerts.vendor.cyan(), alerts.folder.cyan());
            let rows = alerts
                .states
                .into_iter()
                .map(|(metric, state)| AlertRow {
                    metric,
                    level: color_level(&state.level),
                    breaches: state.consecutive_breaches,
                    severe: state.consecutive_severe,
                    clears: state.consecutive_clears,
                })
                .collect();
            print_table(rows, "No alert state for this feed");
        }
    }
    Ok(())
}
