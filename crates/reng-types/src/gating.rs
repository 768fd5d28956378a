use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision_chain::DecisionStage;
use crate::recommendation::Direction;

/// A candidate recommendation proposed to the gating engine, either by the
/// periodic signal collaborator or by a manual API create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub symbol: String,
    pub direction: Direction,
    pub strategy_type: String,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    pub confidence: f64,

    #[serde(default)]
    pub bypass_cooldown: bool,
    pub mtf_agreement: Option<f64>,
    pub mtf_dominant_direction: Option<Direction>,

    pub experiment_id: Option<String>,
    pub variant: Option<String>,
    pub ab_group: Option<String>,
}

/// Which cooldown scope an `HOURLY_CAP` rejection refers to (spec §9 open
/// question: the HOURLY cooldown kind has two scopes and this engine makes
/// the choice explicit rather than inferring it from a missing direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownScope {
    Total,
    PerDirection,
}

/// Fields common to every gating rejection, regardless of which rule fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatingCommon {
    pub stage: DecisionStage,
    pub source: String,
    pub checked_at: DateTime<Utc>,
}

/// A snapshot of the world-state a gating rule needs, gathered by the
/// gating engine from persisted state at decision time (never from stale
/// caches, per spec §4.4 tie-break rule).
#[derive(Debug, Clone, Default)]
pub struct GatingWorldView {
    pub same_direction_last_created_at: Option<DateTime<Utc>>,
    pub opposite_last_created_at: Option<DateTime<Utc>>,
    pub global_last_created_at: Option<DateTime<Utc>>,
    pub hourly_total_count: i64,
    pub hourly_per_direction_count: i64,
    /// `(id, entry_price, created_at)` of active/recent same
    /// `(symbol, direction, strategy_type)` recommendations within the
    /// duplicate-suppression window.
    pub duplicate_candidates: Vec<(String, Decimal, DateTime<Utc>)>,
    pub opposite_active_count: i64,
    pub total_active_count: i64,
    pub direction_active_count: i64,
}

/// One typed rejection code, carrying only the fields that code needs
/// (spec §9 re-architecture note: replace the dynamic detail map with
/// tagged variants).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum GatingCode {
    #[serde(rename = "INVALID_REQUEST_BODY", rename_all = "camelCase")]
    InvalidRequestBody { field: String, message: String },
    #[serde(rename = "COOLDOWN_SAME_DIRECTION", rename_all = "camelCase")]
    CooldownSameDirection {
        remaining_ms: i64,
        next_available_at: DateTime<Utc>,
    },
    #[serde(rename = "COOLDOWN_OPPOSITE", rename_all = "camelCase")]
    CooldownOpposite {
        remaining_ms: i64,
        next_available_at: DateTime<Utc>,
    },
    #[serde(rename = "COOLDOWN_GLOBAL", rename_all = "camelCase")]
    CooldownGlobal {
        remaining_ms: i64,
        next_available_at: DateTime<Utc>,
    },
    #[serde(rename = "HOURLY_CAP", rename_all = "camelCase")]
    HourlyCap {
        scope: CooldownScope,
        cap: i64,
        current_count: i64,
        next_available_at: DateTime<Utc>,
    },
    #[serde(rename = "DUPLICATE_RECOMMENDATION", rename_all = "camelCase")]
    DuplicateRecommendation {
        matched_ids: Vec<String>,
        window_minutes: i64,
        bps_threshold: i64,
    },
    #[serde(rename = "MTF_CONSISTENCY", rename_all = "camelCase")]
    MtfConsistency {
        agreement: f64,
        dominant_direction: Option<Direction>,
    },
    #[serde(rename = "OPPOSITE_CONSTRAINT", rename_all = "camelCase")]
    OppositeConstraint { opposite_active_count: i64 },
    #[serde(rename = "EXPOSURE_CAP", rename_all = "camelCase")]
    ExposureCap {
        total_cap: i64,
        dir_cap: i64,
        current_total: i64,
        current_direction: i64,
        adding: i64,
    },
}

impl GatingCode {
    /// The stable string code used in API responses and gating counters.
    pub fn code_str(&self) -> &'static str {
        match self {
            GatingCode::InvalidRequestBody { .. } => "INVALID_REQUEST_BODY",
            GatingCode::CooldownSameDirection { .. } => "COOLDOWN_SAME_DIRECTION",
            GatingCode::CooldownOpposite { .. } => "COOLDOWN_OPPOSITE",
            GatingCode::CooldownGlobal { .. } => "COOLDOWN_GLOBAL",
            GatingCode::HourlyCap { .. } => "HOURLY_CAP",
            GatingCode::DuplicateRecommendation { .. } => "DUPLICATE_RECOMMENDATION",
            GatingCode::MtfConsistency { .. } => "MTF_CONSISTENCY",
            GatingCode::OppositeConstraint { .. } => "OPPOSITE_CONSTRAINT",
            GatingCode::ExposureCap { .. } => "EXPOSURE_CAP",
        }
    }
}

/// A full gating rejection: the typed code plus the fields common to every
/// rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatingRejection {
    pub common: GatingCommon,
    pub code: GatingCode,
}

impl GatingRejection {
    pub fn new(code: GatingCode, source: impl Into<String>) -> Self {
        Self {
            common: GatingCommon {
                stage: DecisionStage::GatingCheck,
                source: source.into(),
                checked_at: Utc::now(),
            },
            code,
        }
    }
}

impl std::fmt::Display for GatingRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.code_str())
    }
}
