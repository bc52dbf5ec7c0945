//! HTTP API for health checks, Prometheus metrics and the feed read interface

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use feedwatch_lib::{
    health::{ComponentStatus, HealthRegistry},
    AlertLevel, AlertState, FeedKey, MetricKind, MonitorEngine,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MonitorEngine>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(engine: Arc<MonitorEngine>, health_registry: HealthRegistry) -> Self {
        Self {
            engine,
            health_registry,
        }
    }
}

/// Feed selector shared by the per-feed routes
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub vendor: String,
    pub folder: String,
}

impl FeedQuery {
    fn key(&self) -> FeedKey {
        FeedKey::new(&self.vendor, &self.folder)
    }
}

#[derive(Debug, Deserialize)]
pub struct BaselineQuery {
    pub vendor: String,
    pub folder: String,
    pub metric: String,
}

/// One row of the feed listing
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedSummary {
    pub vendor: String,
    pub folder: String,
    /// Most severe level across the feed's metrics
    pub level: AlertLevel,
    pub failing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertStatesResponse {
    pub vendor: String,
    pub folder: String,
    pub states: BTreeMap<MetricKind, AlertState>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors surfaced by the read interface
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 once persisted state is loaded
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("Failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn list_feeds(State(state): State<Arc<AppState>>) -> Json<Vec<FeedSummary>> {
    let feeds = state.engine.feeds().await;
    let summaries = feeds
        .into_iter()
        .map(|feed| {
            let level = state
                .engine
                .alert_states(&feed)
                .values()
                .map(|s| s.level)
                .max()
                .unwrap_or_default();
            let failing = state.engine.ingestion_failure(&feed).is_some();
            FeedSummary {
                vendor: feed.vendor,
                folder: feed.folder,
                level,
                failing,
            }
        })
        .collect();
    Json(summaries)
}

async fn feed_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let feed = query.key();
    state
        .engine
        .current_metrics(&feed)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No metrics for feed {}", feed)))
}

async fn feed_baseline(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BaselineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: MetricKind = query.metric.parse().map_err(ApiError::BadRequest)?;
    let feed = FeedKey::new(&query.vendor, &query.folder);

    match state.engine.baseline(&feed, kind).await {
        Ok(status) => Ok(Json(status)),
        Err(e) => {
            warn!(feed = %feed, metric = %kind, error = %e, "Baseline query failed");
            Err(ApiError::Unavailable(e.to_string()))
        }
    }
}

async fn feed_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Json<AlertStatesResponse> {
    let states = state.engine.alert_states(&query.key());
    Json(AlertStatesResponse {
        vendor: query.vendor,
        folder: query.folder,
        states,
    })
}

async fn failures(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.ingestion_failures())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/feeds", get(list_feeds))
        .route("/api/v1/feed/metrics", get(feed_metrics))
        .route("/api/v1/feed/baseline", get(feed_baseline))
        .route("/api/v1/feed/alerts", get(feed_alerts))
        .route("/api/v1/failures", get(failures))
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
