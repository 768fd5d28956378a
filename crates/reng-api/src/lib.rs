//! External interface layer (spec §4.8): an `axum` router over shared
//! state, grounded on the teacher's `api-server` route-module-per-domain
//! layout and its `ApiResponse<T>`/`AppError` envelope convention.

mod chain_routes;
mod dedup;
mod maintenance_routes;
mod monitoring_routes;
mod recommendation_routes;
mod request_id;
mod statistics_routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{middleware, Json, Router};
use reng_decision_chain::DecisionChainMonitor;
use reng_gating::GatingEngine;
use reng_integration::IntegrationService;
use reng_persistence::Persistence;
use reng_price_monitor::PriceMonitor;
use reng_statistics::StatisticsCalculator;
use reng_tracker::Tracker;
use reng_types::{gating::GatingCode, EngineError};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Everything a route handler needs, cloned cheaply per request the way
/// the teacher's handlers clone `AppState` out of `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub persistence: Persistence,
    pub gating: Arc<GatingEngine>,
    pub tracker: Arc<Tracker>,
    pub statistics: Arc<StatisticsCalculator>,
    pub price_monitor: Arc<PriceMonitor>,
    pub integration: Arc<IntegrationService>,
    pub shutdown: watch::Sender<bool>,
}

impl AppState {
    /// A fresh facade over the chain store; deliberately not a stored
    /// field, since [`DecisionChainMonitor`] only borrows persistence.
    pub fn chains(&self) -> DecisionChainMonitor<'_> {
        DecisionChainMonitor::new(&self.persistence)
    }
}

/// Uniform success/error envelope (spec §6 "Wire formats").
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
        })
    }
}

/// The engine-wide error, mapped to a status code and the error envelope
/// at the one seam that needs to know about HTTP at all (spec §7.1: same
/// shape as the teacher's `AuthError: IntoResponse`).
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl AppError {
    pub fn with_status(status: StatusCode, err: anyhow::Error) -> Self {
        Self {
            status,
            code: "INTERNAL".to_string(),
            message: err.to_string(),
            detail: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND".to_string(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_REQUEST_BODY".to_string(),
            message: message.into(),
            detail: None,
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::Gating(rejection) => match rejection.code {
                GatingCode::InvalidRequestBody { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::CONFLICT,
            },
            EngineError::RecommendationNotFound(_) | EngineError::ChainNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::AlreadyClosed(_) | EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::UpstreamUnavailable(_) | EngineError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = match &err {
            EngineError::Gating(rejection) => serde_json::to_value(rejection).ok(),
            _ => None,
        };
        Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
            detail,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL".to_string(),
            message: err.to_string(),
            detail: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let mut body = serde_json::json!({
            "success": false,
            "error": self.code,
            "details": self.message,
        });
        if let Some(detail) = self.detail {
            if let (Some(obj), Some(detail_obj)) = (body.as_object_mut(), detail.as_object()) {
                for (k, v) in detail_obj {
                    obj.insert(k.clone(), v.clone());
                }
            }
        }
        (self.status, Json(body)).into_response()
    }
}

/// Assemble the full router (spec §4.8): one module per domain, request
/// tracing and CORS from `tower-http`, and a request-id middleware
/// grounded on the teacher's `request_id.rs`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(recommendation_routes::routes())
        .merge(statistics_routes::routes())
        .merge(chain_routes::routes())
        .merge(monitoring_routes::routes())
        .merge(maintenance_routes::routes())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "reng-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
