use std::env;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Every process tunable enumerated in spec §6 "Process config", loaded
/// from the environment with typed defaults (grounded on
/// `trading-agent::config::AgentConfig::from_env`) and threaded explicitly
/// into every component constructor rather than read from a global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_url: String,

    pub tick_interval_admission_secs: u64,
    pub tick_interval_tracker_secs: u64,

    pub price_cache_ttl_secs: u64,
    pub price_stale_window_secs: u64,
    pub tracker_grace_period_secs: u64,

    pub max_holding_time_secs: i64,
    pub breakeven_window_secs: i64,
    pub enable_breakeven_exit: bool,

    pub duplicate_window_minutes: i64,
    pub duplicate_bps_threshold: i64,

    pub cooldown_same_direction_ms: i64,
    pub cooldown_opposite_ms: i64,
    pub cooldown_global_ms: i64,
    pub hourly_cap_total: i64,
    pub hourly_cap_per_direction: i64,

    pub opposite_min_confidence: f64,
    pub require_mtf_agreement: bool,
    pub min_mtf_agreement: f64,

    pub exposure_cap_total: i64,
    pub exposure_cap_per_direction: i64,

    pub trim_keep_default: i64,
    pub stats_cache_ttl_secs: u64,

    pub io_deadline_secs: u64,

    pub tick_interval_slippage_secs: u64,
    pub slippage_threshold_debounce_secs: i64,
    pub slippage_threshold_k: f64,
    pub slippage_stats_sample_size: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://recommendations.db".to_string(),
            tick_interval_admission_secs: 15,
            tick_interval_tracker_secs: 5,
            price_cache_ttl_secs: 10,
            price_stale_window_secs: 60,
            tracker_grace_period_secs: 120,
            max_holding_time_secs: 24 * 3600,
            breakeven_window_secs: 3600,
            enable_breakeven_exit: true,
            duplicate_window_minutes: 30,
            duplicate_bps_threshold: 10,
            cooldown_same_direction_ms: 15 * 60 * 1000,
            cooldown_opposite_ms: 5 * 60 * 1000,
            cooldown_global_ms: 60 * 1000,
            hourly_cap_total: 10,
            hourly_cap_per_direction: 6,
            opposite_min_confidence: 0.70,
            require_mtf_agreement: false,
            min_mtf_agreement: 0.6,
            exposure_cap_total: 5,
            exposure_cap_per_direction: 3,
            trim_keep_default: 100,
            stats_cache_ttl_secs: 60,
            io_deadline_secs: 30,
            tick_interval_slippage_secs: 30,
            slippage_threshold_debounce_secs: 300,
            slippage_threshold_k: 1.5,
            slippage_stats_sample_size: 200,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to the
    /// defaults above for anything unset. Unlike `AgentConfig::from_env`
    /// this engine has no required external API keys, so loading never
    /// fails for missing configuration — only for malformed values.
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Self::default();

        let parse_or_default = |key: &str, default: &str| -> Result<String, EngineError> {
            Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
        };

        let parse_num = |key: &str, default: String| -> Result<String, EngineError> {
            parse_or_default(key, &default)
        };

        macro_rules! field {
            ($key:expr, $default:expr) => {
                parse_num($key, $default.to_string())?
                    .parse()
                    .map_err(|e| EngineError::Validation(format!("{}: {}", $key, e)))?
            };
        }

        Ok(Self {
            database_url: parse_or_default("DATABASE_URL", &defaults.database_url)?,
            tick_interval_admission_secs: field!(
                "TICK_INTERVAL_ADMISSION_SECS",
                defaults.tick_interval_admission_secs
            ),
            tick_interval_tracker_secs: field!(
                "TICK_INTERVAL_TRACKER_SECS",
                defaults.tick_interval_tracker_secs
            ),
            price_cache_ttl_secs: field!("PRICE_CACHE_TTL_SECS", defaults.price_cache_ttl_secs),
            price_stale_window_secs: field!(
                "PRICE_STALE_WINDOW_SECS",
                defaults.price_stale_window_secs
            ),
            tracker_grace_period_secs: field!(
                "TRACKER_GRACE_PERIOD_SECS",
                defaults.tracker_grace_period_secs
            ),
            max_holding_time_secs: field!("MAX_HOLDING_TIME_SECS", defaults.max_holding_time_secs),
            breakeven_window_secs: field!(
                "BREAKEVEN_WINDOW_SECS",
                defaults.breakeven_window_secs
            ),
            enable_breakeven_exit: field!(
                "ENABLE_BREAKEVEN_EXIT",
                defaults.enable_breakeven_exit
            ),
            duplicate_window_minutes: field!(
                "DUPLICATE_WINDOW_MINUTES",
                defaults.duplicate_window_minutes
            ),
            duplicate_bps_threshold: field!(
                "DUPLICATE_BPS_THRESHOLD",
                defaults.duplicate_bps_threshold
            ),
            cooldown_same_direction_ms: field!(
                "COOLDOWN_SAME_DIRECTION_MS",
                defaults.cooldown_same_direction_ms
            ),
            cooldown_opposite_ms: field!("COOLDOWN_OPPOSITE_MS", defaults.cooldown_opposite_ms),
            cooldown_global_ms: field!("COOLDOWN_GLOBAL_MS", defaults.cooldown_global_ms),
            hourly_cap_total: field!("HOURLY_CAP_TOTAL", defaults.hourly_cap_total),
            hourly_cap_per_direction: field!(
                "HOURLY_CAP_PER_DIRECTION",
                defaults.hourly_cap_per_direction
            ),
            opposite_min_confidence: field!(
                "OPPOSITE_MIN_CONFIDENCE",
                defaults.opposite_min_confidence
            ),
            require_mtf_agreement: field!(
                "REQUIRE_MTF_AGREEMENT",
                defaults.require_mtf_agreement
            ),
            min_mtf_agreement: field!("MIN_MTF_AGREEMENT", defaults.min_mtf_agreement),
            exposure_cap_total: field!("EXPOSURE_CAP_TOTAL", defaults.exposure_cap_total),
            exposure_cap_per_direction: field!(
                "EXPOSURE_CAP_PER_DIRECTION",
                defaults.exposure_cap_per_direction
            ),
            trim_keep_default: field!("TRIM_KEEP_DEFAULT", defaults.trim_keep_default),
            stats_cache_ttl_secs: field!("STATS_CACHE_TTL_SECS", defaults.stats_cache_ttl_secs),
            io_deadline_secs: field!("IO_DEADLINE_SECS", defaults.io_deadline_secs),
            tick_interval_slippage_secs: field!(
                "TICK_INTERVAL_SLIPPAGE_SECS",
                defaults.tick_interval_slippage_secs
            ),
            slippage_threshold_debounce_secs: field!(
                "SLIPPAGE_THRESHOLD_DEBOUNCE_SECS",
                defaults.slippage_threshold_debounce_secs
            ),
            slippage_threshold_k: field!("SLIPPAGE_THRESHOLD_K", defaults.slippage_threshold_k),
            slippage_stats_sample_size: field!(
                "SLIPPAGE_STATS_SAMPLE_SIZE",
                defaults.slippage_stats_sample_size
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tick_interval_admission_secs, 15);
        assert_eq!(cfg.tick_interval_tracker_secs, 5);
        assert_eq!(cfg.price_cache_ttl_secs, 10);
        assert_eq!(cfg.price_stale_window_secs, 60);
        assert_eq!(cfg.max_holding_time_secs, 24 * 3600);
        assert_eq!(cfg.duplicate_window_minutes, 30);
        assert_eq!(cfg.duplicate_bps_threshold, 10);
        assert_eq!(cfg.trim_keep_default, 100);
        assert_eq!(cfg.stats_cache_ttl_secs, 60);
        assert!((cfg.opposite_min_confidence - 0.70).abs() < 1e-9);
        assert!((cfg.min_mtf_agreement - 0.6).abs() < 1e-9);
    }
}
