use thiserror::Error;

use crate::gating::GatingRejection;

/// The engine-wide error type. One variant per taxonomy family in spec §7;
/// the API layer (reng-api) maps each family to a status code and the
/// uniform response envelope.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("gating rejected: {0}")]
    Gating(#[from] GatingRejection),

    #[error("recommendation not found: {0}")]
    RecommendationNotFound(String),

    #[error("decision chain not found: {0}")]
    ChainNotFound(String),

    #[error("recommendation already closed: {0}")]
    AlreadyClosed(String),

    #[error("conflicting id: {0}")]
    Conflict(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("service is shutting down")]
    ShuttingDown,

    #[error("internal error (correlation_id={correlation_id}): {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

impl EngineError {
    /// Wrap an arbitrary failure as an internal error with a fresh
    /// correlation id, the way operators are expected to trace it back
    /// through logs (spec §7: "always logged with stack context").
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            correlation_id: crate::ids::new_id("err"),
            message: message.into(),
        }
    }

    /// The stable error code exposed in API responses.
    pub fn code(&self) -> &str {
        match self {
            EngineError::Validation(_) => "INVALID_REQUEST_BODY",
            EngineError::Gating(rejection) => rejection.code.code_str(),
            EngineError::RecommendationNotFound(_) => "RECOMMENDATION_NOT_FOUND",
            EngineError::ChainNotFound(_) => "CHAIN_NOT_FOUND",
            EngineError::AlreadyClosed(_) => "ALREADY_CLOSED",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            EngineError::ShuttingDown => "SHUTTING_DOWN",
            EngineError::Internal { .. } => "INTERNAL",
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::internal(err.to_string())
    }
}
