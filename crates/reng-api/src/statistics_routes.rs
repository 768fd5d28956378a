//! Statistics & monitoring endpoints (spec §6): overall/per-strategy/
//! per-period aggregates, a sub-day real-time window, EV-vs-PnL
//! distribution, and EV calibration monitoring, all backed by
//! `StatisticsCalculator`'s cached read-models.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use reng_statistics::{
    AggregateStats, BinMode, EvDistribution, EvMonitoring, EvWindow, Period, PeriodStats,
    RealtimeStats, StrategyStats,
};
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/statistics/overall", get(overall))
        .route("/api/statistics/period/:period", get(period))
        .route("/api/statistics/strategies", get(strategies))
        .route("/api/statistics/ev-distribution", get(ev_distribution))
        .route("/api/statistics/ev-monitoring", get(ev_monitoring))
        .route("/api/statistics/realtime", get(realtime))
}

async fn overall(State(state): State<AppState>) -> Result<Json<ApiResponse<AggregateStats>>, AppError> {
    Ok(ApiResponse::success(state.statistics.overall().await?))
}

async fn period(
    State(state): State<AppState>,
    Path(period): Path<Period>,
) -> Result<Json<ApiResponse<PeriodStats>>, AppError> {
    Ok(ApiResponse::success(state.statistics.per_period(period).await?))
}

async fn strategies(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<StrategyStats>>>, AppError> {
    Ok(ApiResponse::success(state.statistics.per_strategy().await?))
}

#[derive(Deserialize)]
struct EvDistributionQuery {
    bins: Option<usize>,
    bin_mode: Option<BinMode>,
    variant: Option<String>,
}

async fn ev_distribution(
    State(state): State<AppState>,
    Query(q): Query<EvDistributionQuery>,
) -> Result<Json<ApiResponse<EvDistribution>>, AppError> {
    let bins = q.bins.unwrap_or(10);
    let mode = q.bin_mode.unwrap_or(BinMode::Quantile);
    let distribution = state
        .statistics
        .ev_distribution(bins, mode, q.variant.as_deref())
        .await?;
    Ok(ApiResponse::success(distribution))
}

#[derive(Deserialize)]
struct RealtimeQuery {
    minutes: Option<i64>,
}

async fn realtime(
    State(state): State<AppState>,
    Query(q): Query<RealtimeQuery>,
) -> Result<Json<ApiResponse<RealtimeStats>>, AppError> {
    let minutes = q.minutes.unwrap_or(5);
    Ok(ApiResponse::success(state.statistics.realtime(minutes).await?))
}

#[derive(Deserialize)]
struct EvMonitoringQuery {
    window: Option<EvWindow>,
}

async fn ev_monitoring(
    State(state): State<AppState>,
    Query(q): Query<EvMonitoringQuery>,
) -> Result<Json<ApiResponse<EvMonitoring>>, AppError> {
    let window = q.window.unwrap_or(EvWindow::SevenDay);
    Ok(ApiResponse::success(state.statistics.ev_monitoring(window).await?))
}
