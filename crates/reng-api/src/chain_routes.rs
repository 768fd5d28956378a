//! Decision-chain endpoints (spec §6): listing with filters, single-chain
//! detail, replay against recorded market snapshots, aggregate metrics,
//! and a failures-only view.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use reng_decision_chain::{ChainMetrics, ChainReplay};
use reng_persistence::ChainFilter;
use reng_types::{decision_chain::Decision, DecisionChain};

use crate::{ApiResponse, AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chains", get(list_chains))
        .route("/api/chains/metrics", get(chain_metrics))
        .route("/api/chains/failures", get(list_failures))
        .route("/api/chains/:id", get(get_chain))
        .route("/api/chains/:id/replay", get(replay_chain))
}

async fn list_chains(
    State(state): State<AppState>,
    Query(filter): Query<ChainFilter>,
) -> Result<Json<ApiResponse<Vec<DecisionChain>>>, AppError> {
    let chains = state.chains().query(&filter).await?;
    Ok(ApiResponse::success(chains))
}

async fn list_failures(
    State(state): State<AppState>,
    Query(mut filter): Query<ChainFilter>,
) -> Result<Json<ApiResponse<Vec<DecisionChain>>>, AppError> {
    filter.final_decision = Some(Decision::Rejected);
    let chains = state.chains().query(&filter).await?;
    Ok(ApiResponse::success(chains))
}

async fn chain_metrics(
    State(state): State<AppState>,
    Query(filter): Query<ChainFilter>,
) -> Result<Json<ApiResponse<ChainMetrics>>, AppError> {
    let chains = state.chains().query(&filter).await?;
    Ok(ApiResponse::success(ChainMetrics::compute(&chains)))
}

async fn get_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DecisionChain>>, AppError> {
    let chain = state
        .chains()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("decision chain {id} not found")))?;
    Ok(ApiResponse::success(chain))
}

async fn replay_chain(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ChainReplay>>, AppError> {
    let chain = state
        .chains()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("decision chain {id} not found")))?;
    let snapshots = state.persistence.monitoring().list_recent(&chain.symbol, 500).await?;
    Ok(ApiResponse::success(ChainReplay::build(&chain, &snapshots)))
}
