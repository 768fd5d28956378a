//! Win-rate, PnL, and EV-calibration views over persisted recommendations,
//! cached per query-key with a short TTL (spec §4.6).

mod cache;
mod compute;
mod engine;
mod models;

pub use engine::StatisticsCalculator;
pub use models::{
    AggregateStats, BinMode, EvBin, EvCalibrationGroup, EvDistribution, EvMonitoring, EvWindow,
    Period, PeriodStats, RealtimeStats, StrategyStats,
};
