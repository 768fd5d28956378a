use serde::{Deserialize, Serialize};

/// The four period buckets statistics can be grouped into (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

/// Aggregate metrics shared by the overall, per-strategy, and per-period
/// views (spec §4.6 "same metrics").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub breakeven_trades: i64,
    pub win_rate: f64,
    pub avg_pnl_percent: f64,
    pub total_pnl_amount: f64,
    pub active_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStats {
    pub strategy_type: String,
    pub stats: AggregateStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodStats {
    pub period: Period,
    pub stats: AggregateStats,
}

/// A sub-day rolling window (spec §6 "real-time stats window `1m..1h`"),
/// distinct from `EvWindow`'s day-granularity calibration windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeStats {
    pub window_minutes: i64,
    pub stats: AggregateStats,
}

/// One bucket of the EV-vs-realised-PnL distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvBin {
    pub bin_index: usize,
    pub ev_lower: f64,
    pub ev_upper: f64,
    pub count: i64,
    pub mean_realised_pnl_percent: f64,
    pub hit_rate: f64,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinMode {
    Quantile,
    Even,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvDistribution {
    pub bin_mode: BinMode,
    pub bins: Vec<EvBin>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvWindow {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDay,
    #[serde(rename = "30d")]
    ThirtyDay,
}

impl EvWindow {
    pub fn duration(self) -> chrono::Duration {
        match self {
            EvWindow::OneDay => chrono::Duration::days(1),
            EvWindow::SevenDay => chrono::Duration::days(7),
            EvWindow::ThirtyDay => chrono::Duration::days(30),
        }
    }
}

/// Rolling-window calibration: how well predicted EV (here, `confidence`
/// bucketed into deciles — the only per-candidate scalar prediction named
/// in §3) tracked realised PnL over the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvCalibrationGroup {
    pub ev_level_bucket: String,
    pub count: i64,
    pub avg_predicted_confidence: f64,
    pub avg_realised_pnl_percent: f64,
    pub calibration_error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvMonitoring {
    pub window: EvWindow,
    pub groups: Vec<EvCalibrationGroup>,
}
