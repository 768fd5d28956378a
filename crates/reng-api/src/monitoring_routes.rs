//! Gated-monitoring listing (spec §6): the snapshots saved on every
//! gating rejection. Scoped to a single symbol per request — there is no
//! cross-symbol index, the same per-symbol scoping the price monitor and
//! slippage store already use.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use reng_persistence::GatingSnapshot;
use serde::Deserialize;

use crate::{ApiResponse, AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/monitoring/:symbol", get(list_snapshots))
}

#[derive(Deserialize)]
struct SnapshotsQuery {
    limit: Option<i64>,
}

async fn list_snapshots(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(q): Query<SnapshotsQuery>,
) -> Result<Json<ApiResponse<Vec<GatingSnapshot>>>, AppError> {
    let limit = q.limit.unwrap_or(100);
    let snapshots = state.persistence.monitoring().list_recent(&symbol, limit).await?;
    Ok(ApiResponse::success(snapshots))
}
