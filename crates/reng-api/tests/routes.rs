//! Route-level tests driving the assembled router through
//! `tower::ServiceExt::oneshot`, the same way the teacher's `api-server`
//! integration tests exercise handlers without a bound socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use reng_api::{router, AppState};
use reng_gating::GatingEngine;
use reng_integration::{HookRegistry, IntegrationService, QueueSignalSource};
use reng_persistence::Persistence;
use reng_price_monitor::{PriceMonitor, StaticPriceFeed};
use reng_statistics::StatisticsCalculator;
use reng_tracker::Tracker;
use reng_types::gating::Candidate;
use reng_types::{Direction, EngineConfig};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
    let config = EngineConfig::default();
    let gating = Arc::new(GatingEngine::new(config.clone()));
    let feed = StaticPriceFeed::new();
    feed.set("BTC-PERP", dec!(50000));
    let price_monitor = Arc::new(PriceMonitor::new(
        Arc::new(feed),
        Duration::from_secs(config.price_cache_ttl_secs),
        Duration::from_secs(config.price_stale_window_secs),
    ));
    let statistics = Arc::new(StatisticsCalculator::new(
        persistence.clone(),
        Duration::from_secs(config.stats_cache_ttl_secs),
    ));
    let tracker = Arc::new(Tracker::new(
        persistence.clone(),
        price_monitor.clone(),
        statistics.clone(),
        config.clone(),
    ));
    let integration = Arc::new(IntegrationService::new(
        persistence.clone(),
        gating.clone(),
        tracker.clone(),
        statistics.clone(),
        Arc::new(QueueSignalSource::new()),
        HookRegistry::new(),
        config,
        20,
    ));
    let (shutdown, _rx) = watch::channel(false);

    AppState {
        persistence,
        gating,
        tracker,
        statistics,
        price_monitor,
        integration,
        shutdown,
    }
}

fn sample_candidate() -> Candidate {
    Candidate {
        symbol: "BTC-PERP".to_string(),
        direction: Direction::Long,
        strategy_type: "momentum".to_string(),
        leverage: dec!(2),
        entry_price: dec!(50000),
        current_price: dec!(50000),
        take_profit_price: dec!(52000),
        stop_loss_price: dec!(49000),
        confidence: 0.8,
        bypass_cooldown: false,
        mtf_agreement: None,
        mtf_dominant_direction: None,
        experiment_id: None,
        variant: None,
        ab_group: None,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_components() {
    let app = router(test_state().await);
    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["healthy"], json!(true));
    assert_eq!(body["data"]["tracker_paused"], json!(false));
}

#[tokio::test]
async fn create_then_get_recommendation_round_trips() {
    let app = router(test_state().await);

    let create = app
        .clone()
        .oneshot(
            Request::post("/api/recommendations")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&sample_candidate()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::OK);
    let created = body_json(create).await;
    assert_eq!(created["success"], json!(true));
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let fetched = app
        .clone()
        .oneshot(
            Request::get(format!("/api/recommendations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);
    let body = body_json(fetched).await;
    assert_eq!(body["data"]["id"], json!(id));
    assert_eq!(body["data"]["symbol"], json!("BTC-PERP"));
}

#[tokio::test]
async fn get_missing_recommendation_is_404() {
    let app = router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/api/recommendations/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn close_recommendation_without_body_succeeds() {
    let app = router(test_state().await);

    let create = app
        .clone()
        .oneshot(
            Request::post("/api/recommendations")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&sample_candidate()).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let created = body_json(create).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let closed = app
        .oneshot(
            Request::post(format!("/api/recommendations/{id}/close"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(closed.status(), StatusCode::OK);
    let body = body_json(closed).await;
    assert_eq!(body["data"]["status"], json!("Closed"));
}

#[tokio::test]
async fn statistics_overall_on_empty_store() {
    let app = router(test_state().await);
    let response = app
        .oneshot(Request::get("/api/statistics/overall").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_trades"], json!(0));
}

#[tokio::test]
async fn realtime_defaults_window_and_clamps_out_of_range_minutes() {
    let app = router(test_state().await);
    let response = app
        .clone()
        .oneshot(Request::get("/api/statistics/realtime").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["window_minutes"], json!(5));

    let response = app
        .oneshot(
            Request::get("/api/statistics/realtime?minutes=500")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["window_minutes"], json!(60));
}

#[tokio::test]
async fn ev_monitoring_accepts_literal_window_values() {
    let app = router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/api/statistics/ev-monitoring?window=7d")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn maintenance_trim_and_cache_clear_are_no_ops_on_empty_store() {
    let app = router(test_state().await);

    let trim = app
        .clone()
        .oneshot(
            Request::post("/api/maintenance/trim?keep=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(trim.status(), StatusCode::OK);
    let body = body_json(trim).await;
    assert_eq!(body["data"]["deleted"], json!(0));

    let clear = app
        .oneshot(
            Request::post("/api/maintenance/cache/clear")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(clear.status(), StatusCode::OK);
}

#[tokio::test]
async fn tracker_stop_then_start_flips_health() {
    let app = router(test_state().await);

    let stop = app
        .clone()
        .oneshot(
            Request::post("/api/maintenance/tracker/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stopped = body_json(stop).await;
    assert_eq!(stopped["data"]["paused"], json!(true));

    let health = app
        .clone()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health_body = body_json(health).await;
    assert_eq!(health_body["data"]["tracker_paused"], json!(true));

    let start = app
        .oneshot(
            Request::post("/api/maintenance/tracker/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let started = body_json(start).await;
    assert_eq!(started["data"]["paused"], json!(false));
}

#[tokio::test]
async fn chains_listing_empty_store_returns_empty_vec() {
    let app = router(test_state().await);
    let response = app
        .oneshot(Request::get("/api/chains").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn monitoring_snapshots_empty_for_unknown_symbol() {
    let app = router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/api/monitoring/BTC-PERP")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn request_id_header_is_echoed() {
    let app = router(test_state().await);
    let response = app
        .oneshot(
            Request::get("/api/health")
                .header("x-request-id", "test-correlation-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "test-correlation-id"
    );
}
