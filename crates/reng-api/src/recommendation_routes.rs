//! Recommendation lifecycle endpoints (spec §6): create (admission),
//! read, manual close, force-expire, delete, and filtered/active listing
//! with signature-based deduplication.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use reng_integration::AdmissionOutcome;
use reng_types::gating::Candidate;
use reng_types::{Recommendation, RecommendationFilter};
use serde::{Deserialize, Serialize};

use crate::dedup::dedup_by_signature;
use crate::{ApiResponse, AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/recommendations", post(create_recommendation))
        .route("/api/recommendations", get(list_recommendations))
        .route("/api/recommendations/active", get(list_active_recommendations))
        .route("/api/recommendations/:id", get(get_recommendation))
        .route("/api/recommendations/:id", axum::routing::delete(delete_recommendation))
        .route("/api/recommendations/:id/close", post(close_recommendation))
        .route("/api/recommendations/:id/expire", post(expire_recommendation))
}

#[derive(Serialize)]
struct CreateResponse {
    id: String,
    decision_chain_id: String,
}

/// Creates a recommendation via the same admission path the periodic
/// signal loop uses. `x-loop-guard: 1` suppresses the onCreate hook, the
/// way a caller re-submitting its own admitted candidate avoids notifying
/// itself (spec §6).
async fn create_recommendation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(candidate): Json<Candidate>,
) -> Result<Json<ApiResponse<CreateResponse>>, AppError> {
    let fire_hooks = !headers.contains_key("x-loop-guard");
    match state.integration.submit_candidate(&candidate, fire_hooks).await? {
        AdmissionOutcome::Admitted { recommendation, chain_id } => {
            Ok(ApiResponse::success(CreateResponse {
                id: recommendation.id,
                decision_chain_id: chain_id,
            }))
        }
        AdmissionOutcome::Rejected { rejection, .. } => {
            Err(reng_types::EngineError::Gating(rejection).into())
        }
    }
}

async fn get_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Recommendation>>, AppError> {
    let rec = state
        .persistence
        .recommendations()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("recommendation {id} not found")))?;
    Ok(ApiResponse::success(rec))
}

async fn list_recommendations(
    State(state): State<AppState>,
    Query(filter): Query<RecommendationFilter>,
) -> Result<Json<ApiResponse<Vec<Recommendation>>>, AppError> {
    let recs = state.persistence.recommendations().list(&filter).await?;
    Ok(ApiResponse::success(dedup_by_signature(recs)))
}

/// Falls back to persistence when the in-memory active set is empty —
/// e.g. immediately after a restart, before the tracker's startup
/// rehydration has populated it (spec §6).
async fn list_active_recommendations(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Recommendation>>>, AppError> {
    let mut recs = state.tracker.active_set().snapshot().await;
    if recs.is_empty() {
        recs = state.persistence.recommendations().list_active().await?;
    }
    Ok(ApiResponse::success(dedup_by_signature(recs)))
}

#[derive(Deserialize)]
struct CloseRequest {
    reason: Option<String>,
}

async fn close_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse<Recommendation>>, AppError> {
    let reason = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<CloseRequest>(&body)
            .map_err(|e| AppError::bad_request(format!("invalid close request body: {e}")))?
            .reason
    };
    let rec = state.tracker.close_manual(&id, reason).await?;
    state.statistics.invalidate();
    Ok(ApiResponse::success(rec))
}

async fn expire_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Recommendation>>, AppError> {
    let rec = state.tracker.force_expire(&id).await?;
    state.statistics.invalidate();
    Ok(ApiResponse::success(rec))
}

/// Maintenance-only: deletes a recommendation row outright rather than
/// closing it (spec §6 "delete (maintenance-only)").
async fn delete_recommendation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.persistence.recommendations().delete(&id).await?;
    state.statistics.invalidate();
    Ok(ApiResponse::success(()))
}
