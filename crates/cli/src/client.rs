//! API client for the feedwatch daemon's read interface

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Non-success response from the daemon
#[derive(Debug, thiserror::Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// API client for the daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid path")?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Make a GET request; `None` when the daemon answers 404
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = self.url(path, query)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ApiError { status, message }.into());
        }

        response
            .json()
            .await
            .map(Some)
            .context("Failed to parse response")
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.get_optional(path, query)
            .await?
            .with_context(|| format!("Not found: {}", path))
    }

    pub async fn feeds(&self) -> Result<Vec<FeedSummary>> {
        self.get("api/v1/feeds", &[]).await
    }

    pub async fn metrics(&self, vendor: &str, folder: &str) -> Result<Option<FeedMetrics>> {
        self.get_optional(
            "api/v1/feed/metrics",
            &[("vendor", vendor), ("folder", folder)],
        )
        .await
    }

    pub async fn baseline(&self, vendor: &str, folder: &str, metric: &str) -> Result<BaselineView> {
        self.get(
            "api/v1/feed/baseline",
            &[("vendor", vendor), ("folder", folder), ("metric", metric)],
        )
        .await
    }

    pub async fn alerts(&self, vendor: &str, folder: &str) -> Result<AlertStates> {
        self.get(
            "api/v1/feed/alerts",
            &[("vendor", vendor), ("folder", folder)],
        )
        .await
    }

    pub async fn failures(&self) -> Result<Vec<IngestionFailure>> {
        self.get("api/v1/failures", &[]).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSummary {
    pub vendor: String,
    pub folder: String,
    pub level: String,
    pub failing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrivalWindow {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMetrics {
    pub interval_start: DateTime<Utc>,
    pub interval_end: DateTime<Utc>,
    pub arrival_window: Option<ArrivalWindow>,
    pub file_count: u64,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
    pub size_sum: u64,
    pub folder_size_bytes: u64,
    pub growth_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BaselineView {
    #[serde(rename = "baseline_building")]
    Building {
        kind: String,
        intervals: usize,
        required: usize,
    },
    Ready {
        kind: String,
        median: f64,
        spread: f64,
        lower_bound: f64,
        upper_bound: f64,
        samples: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStateView {
    pub level: String,
    pub consecutive_breaches: u32,
    pub consecutive_clears: u32,
    #[serde(default)]
    pub consecutive_severe: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStates {
    pub vendor: String,
    pub folder: String,
    pub states: BTreeMap<String, AlertStateView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRef {
    pub vendor: String,
    pub folder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionFailure {
    pub feed_key: FeedRef,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub consecutive: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_feeds_parses_listing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/feeds")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"vendor":"acme","folder":"/in/acme","level":"WARNING","failing":false}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let feeds = client.feeds().await.unwrap();

        mock.assert_async().await;
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].vendor, "acme");
        assert_eq!(feeds[0].level, "WARNING");
    }

    #[tokio::test]
    async fn test_metrics_sends_feed_query_and_maps_404() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/feed/metrics")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("vendor".into(), "acme".into()),
                Matcher::UrlEncoded("folder".into(), "/in/acme".into()),
            ]))
            .with_status(404)
            .with_body(r#"{"error":"No metrics for feed acme:/in/acme"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let metrics = client.metrics("acme", "/in/acme").await.unwrap();

        mock.assert_async().await;
        assert!(metrics.is_none());
    }

    #[tokio::test]
    async fn test_baseline_building_and_ready() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/feed/baseline")
            .match_query(Matcher::UrlEncoded("metric".into(), "size_range".into()))
            .with_status(200)
            .with_body(
                r#"{"status":"baseline_building","kind":"SIZE_RANGE","intervals":12,"required":864}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1/feed/baseline")
            .match_query(Matcher::UrlEncoded("metric".into(), "arrival_rate".into()))
            .with_status(200)
            .with_body(
                r#"{"status":"ready","kind":"ARRIVAL_RATE","median":0.1,"spread":0.02,"lower_bound":0.05,"upper_bound":0.15,"samples":900}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();

        let building = client.baseline("acme", "/in/acme", "size_range").await.unwrap();
        assert!(matches!(building, BaselineView::Building { intervals: 12, .. }));

        let ready = client.baseline("acme", "/in/acme", "arrival_rate").await.unwrap();
        match ready {
            BaselineView::Ready { median, samples, .. } => {
                assert_eq!(median, 0.1);
                assert_eq!(samples, 900);
            }
            other => panic!("expected ready baseline, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_surfaces_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/feed/baseline")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"unknown metric kind 'latency'"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client
            .baseline("acme", "/in/acme", "latency")
            .await
            .unwrap_err();

        let api_err = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api_err.status, StatusCode::BAD_REQUEST);
        assert_eq!(api_err.message, "unknown metric kind 'latency'");
    }

    #[tokio::test]
    async fn test_failures_parses_feed_key() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/failures")
            .with_status(200)
            .with_body(
                r#"[{"feed_key":{"vendor":"globex","folder":"/in/globex"},"kind":"clock_skew","message":"capture went backwards","timestamp":"2024-03-01T08:00:00Z","consecutive":3}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let failures = client.failures().await.unwrap();

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].feed_key.vendor, "globex");
        assert_eq!(failures[0].kind, "clock_skew");
        assert_eq!(failures[0].consecutive, 3);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
