use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single closed-execution slippage observation (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageRecord {
    pub id: String,
    pub symbol: String,
    pub execution_id: String,
    pub slippage_bps: f64,
    pub latency_ms: i64,
    pub recorded_at: DateTime<Utc>,
    /// Set for threshold-adjustment rows; `None` for plain observations.
    pub tag: Option<String>,
}

pub const THRESHOLD_ADJUST_TAG: &str = "THRESHOLD_ADJUST";

/// Rolling per-symbol slippage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageStatistics {
    pub symbol: String,
    pub sample_count: i64,
    pub avg_bps: f64,
    pub median_bps: f64,
    pub p95_bps: f64,
    pub avg_latency_ms: f64,
    /// Histogram buckets, in ascending bps order: `(upper_bound_bps, count)`.
    pub distribution_buckets: Vec<(f64, i64)>,
    pub updated_at: DateTime<Utc>,
}

/// An adaptive per-symbol slippage threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageThreshold {
    pub symbol: String,
    pub threshold_bps: f64,
    pub updated_at: DateTime<Utc>,
}

/// Minimum and maximum bounds a slippage threshold may be clamped to
/// (spec §4.9: "clamped to [1 bp, 10%]").
pub const MIN_THRESHOLD_BPS: f64 = 1.0;
pub const MAX_THRESHOLD_BPS: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Emitted when a slippage threshold is adjusted by a magnitude large
/// enough to be noteworthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageAlert {
    pub id: String,
    pub symbol: String,
    pub severity: AlertSeverity,
    pub previous_threshold_bps: f64,
    pub new_threshold_bps: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Propose a new threshold from rolling p95 plus `k` standard deviations,
/// clamped to the bounds above (spec §4.9).
pub fn propose_threshold(p95_bps: f64, std_dev_bps: f64, k: f64) -> f64 {
    (p95_bps + k * std_dev_bps).clamp(MIN_THRESHOLD_BPS, MAX_THRESHOLD_BPS)
}

/// Classify the severity of a threshold change by its relative magnitude.
pub fn classify_severity(previous_bps: f64, new_bps: f64) -> AlertSeverity {
    if previous_bps <= 0.0 {
        return AlertSeverity::Info;
    }
    let relative_change = ((new_bps - previous_bps) / previous_bps).abs();
    if relative_change >= 1.0 {
        AlertSeverity::Critical
    } else if relative_change >= 0.25 {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Info
    }
}
