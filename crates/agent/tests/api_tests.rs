//! Integration tests for the daemon API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use feedwatch_agent::api::{create_router, AppState};
use feedwatch_lib::{
    health::{components, HealthRegistry, DEFAULT_UNHEALTHY_AFTER},
    EngineConfig, FeedKey, FeedSnapshot, InMemoryHistoryStore, ManualClock, MonitorEngine,
};
use std::sync::Arc;
use tower::ServiceExt;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
}

fn acme() -> FeedKey {
    FeedKey::new("acme", "/in/acme")
}

fn globex() -> FeedKey {
    FeedKey::new("globex", "/in/globex")
}

/// Engine with one evaluated feed (`acme`) and one failing feed (`globex`)
async fn setup_test_app() -> (Router, Arc<AppState>) {
    let clock = Arc::new(ManualClock::new(start()));
    let engine = Arc::new(MonitorEngine::new(
        EngineConfig::default(),
        Arc::new(InMemoryHistoryStore::new()),
        clock.clone(),
    ));

    let capture = start();
    let snapshot = FeedSnapshot::new(acme(), capture)
        .with_file("a.csv", 1200, capture - Duration::minutes(2))
        .with_file("b.csv", 800, capture - Duration::minutes(1));
    engine.run_tick(vec![snapshot]).await;

    // second snapshot predates the first: clock skew
    engine
        .run_tick(vec![FeedSnapshot::new(globex(), capture)])
        .await;
    engine
        .run_tick(vec![FeedSnapshot::new(
            globex(),
            capture - Duration::minutes(5),
        )])
        .await;

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState::new(engine, health_registry));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["scheduler"].is_object());
    assert!(health["components"]["history_store"].is_object());
    assert!(health["components"]["snapshot_source"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .report_degraded(components::SNAPSHOT_SOURCE, "1 of 2 feeds could not be captured")
        .await;

    let (status, health) = get(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    for _ in 0..DEFAULT_UNHEALTHY_AFTER {
        state
            .health_registry
            .report_failure(components::HISTORY_STORE, "store unavailable")
            .await;
    }

    let (status, health) = get(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(
        health["components"]["history_store"]["consecutive_failures"],
        DEFAULT_UNHEALTHY_AFTER
    );
}

#[tokio::test]
async fn test_readyz_fails_while_component_unhealthy() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true);

    for _ in 0..DEFAULT_UNHEALTHY_AFTER {
        state
            .health_registry
            .report_failure(components::SCHEDULER, "State not saved: disk full")
            .await;
    }

    let (status, readiness) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].as_str().unwrap().starts_with("scheduler"));

    state.health_registry.report_ok(components::SCHEDULER).await;
    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_readyz_waits_for_state_restore() {
    let (app, state) = setup_test_app().await;

    let (status, readiness) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true);

    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("feedwatch_tick_latency_seconds_bucket"));
    assert!(metrics_text.contains("feedwatch_history_records"));
    assert!(metrics_text.contains("feedwatch_ingestion_failures_total"));
}

#[tokio::test]
async fn test_feeds_lists_known_feeds_sorted() {
    let (app, _state) = setup_test_app().await;

    let (status, feeds) = get(app, "/api/v1/feeds").await;

    assert_eq!(status, StatusCode::OK);
    let feeds = feeds.as_array().unwrap();
    assert_eq!(feeds.len(), 2);
    assert_eq!(feeds[0]["vendor"], "acme");
    assert_eq!(feeds[0]["level"], "OK");
    assert_eq!(feeds[0]["failing"], false);
    assert_eq!(feeds[1]["vendor"], "globex");
    assert_eq!(feeds[1]["failing"], true);
}

#[tokio::test]
async fn test_feed_metrics_returns_current_snapshot() {
    let (app, _state) = setup_test_app().await;

    let (status, metrics) = get(app, "/api/v1/feed/metrics?vendor=acme&folder=/in/acme").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["file_count"], 2);
    assert_eq!(metrics["size_min"], 800);
    assert_eq!(metrics["size_max"], 1200);
    assert_eq!(metrics["folder_size_bytes"], 2000);
}

#[tokio::test]
async fn test_feed_metrics_unknown_feed_is_404() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/api/v1/feed/metrics?vendor=nobody&folder=/in/none").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nobody:/in/none"));
}

#[tokio::test]
async fn test_feed_metrics_requires_feed_selector() {
    let (app, _state) = setup_test_app().await;

    let (status, _) = get(app, "/api/v1/feed/metrics?vendor=acme").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_baseline_reports_building_during_cold_start() {
    let (app, _state) = setup_test_app().await;

    let (status, baseline) = get(
        app,
        "/api/v1/feed/baseline?vendor=acme&folder=/in/acme&metric=size_range",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(baseline["status"], "baseline_building");
    assert_eq!(baseline["kind"], "SIZE_RANGE");
    assert_eq!(baseline["intervals"], 1);
    assert_eq!(baseline["required"], 864);
}

#[tokio::test]
async fn test_baseline_rejects_unknown_metric() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(
        app,
        "/api/v1/feed/baseline?vendor=acme&folder=/in/acme&metric=latency",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("latency"));
}

#[tokio::test]
async fn test_alerts_cover_every_metric() {
    let (app, _state) = setup_test_app().await;

    let (status, alerts) = get(app, "/api/v1/feed/alerts?vendor=nobody&folder=/in/none").await;

    assert_eq!(status, StatusCode::OK);
    let states = alerts["states"].as_object().unwrap();
    assert_eq!(states.len(), 4);
    for metric in ["ARRIVAL_WINDOW", "SIZE_RANGE", "ARRIVAL_RATE", "FOLDER_GROWTH"] {
        assert_eq!(states[metric]["level"], "OK");
        assert_eq!(states[metric]["consecutive_breaches"], 0);
    }
}

#[tokio::test]
async fn test_failures_lists_latest_failure_per_feed() {
    let (app, _state) = setup_test_app().await;

    let (status, failures) = get(app, "/api/v1/failures").await;

    assert_eq!(status, StatusCode::OK);
    let failures = failures.as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["feed_key"]["vendor"], "globex");
    assert_eq!(failures[0]["kind"], "clock_skew");
    assert_eq!(failures[0]["consecutive"], 1);
}
