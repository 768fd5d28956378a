//! Maintenance endpoints (spec §6): history trimming, tracker start/stop,
//! cache clearing, system-health, and the admission loop's metrics
//! snapshot.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/maintenance/trim", post(trim_history))
        .route("/api/maintenance/tracker/stop", post(stop_tracker))
        .route("/api/maintenance/tracker/start", post(start_tracker))
        .route("/api/maintenance/cache/clear", post(clear_caches))
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
}

#[derive(Deserialize)]
struct TrimQuery {
    keep: Option<i64>,
}

#[derive(Serialize)]
struct TrimResponse {
    deleted: u64,
}

async fn trim_history(
    State(state): State<AppState>,
    Query(q): Query<TrimQuery>,
) -> Result<Json<ApiResponse<TrimResponse>>, AppError> {
    let keep = q.keep.unwrap_or(100);
    let deleted = state.persistence.recommendations().trim_history(keep).await?;
    state.statistics.invalidate();
    Ok(ApiResponse::success(TrimResponse { deleted }))
}

#[derive(Serialize)]
struct TrackerStateResponse {
    paused: bool,
}

async fn stop_tracker(State(state): State<AppState>) -> Json<ApiResponse<TrackerStateResponse>> {
    state.tracker.pause();
    ApiResponse::success(TrackerStateResponse { paused: true })
}

async fn start_tracker(State(state): State<AppState>) -> Json<ApiResponse<TrackerStateResponse>> {
    state.tracker.resume();
    ApiResponse::success(TrackerStateResponse { paused: false })
}

async fn clear_caches(State(state): State<AppState>) -> Json<ApiResponse<()>> {
    state.price_monitor.clear();
    state.statistics.invalidate();
    ApiResponse::success(())
}

#[derive(Serialize)]
struct ComponentHealth {
    name: &'static str,
    healthy: bool,
    detail: Option<String>,
}

#[derive(Serialize)]
struct SystemHealth {
    healthy: bool,
    tracker_paused: bool,
    active_recommendations: usize,
    components: Vec<ComponentHealth>,
}

async fn health(State(state): State<AppState>) -> Json<ApiResponse<SystemHealth>> {
    let db_healthy = state.persistence.recommendations().list_active().await.is_ok();
    let active_recommendations = state.tracker.active_set().len().await;

    let components = vec![
        ComponentHealth {
            name: "persistence",
            healthy: db_healthy,
            detail: None,
        },
        ComponentHealth {
            name: "tracker",
            healthy: !state.tracker.is_paused(),
            detail: if state.tracker.is_paused() {
                Some("paused by maintenance operator".to_string())
            } else {
                None
            },
        },
        ComponentHealth {
            name: "gating",
            healthy: true,
            detail: None,
        },
    ];

    ApiResponse::success(SystemHealth {
        healthy: components.iter().all(|c| c.healthy),
        tracker_paused: state.tracker.is_paused(),
        active_recommendations,
        components,
    })
}

async fn metrics(State(state): State<AppState>) -> Json<ApiResponse<serde_json::Value>> {
    ApiResponse::success(state.integration.metrics_snapshot().await)
}
