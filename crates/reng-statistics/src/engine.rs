use std::time::Duration;

use chrono::Utc;
use reng_persistence::Persistence;
use reng_types::{recommendation::RecommendationFilter, EngineError};

use crate::cache::TtlCache;
use crate::compute;
use crate::models::{
    AggregateStats, BinMode, EvDistribution, EvMonitoring, EvWindow, Period, PeriodStats,
    RealtimeStats, StrategyStats,
};

/// Real-time stats are cached far shorter than the general query TTL so a
/// 1-minute window doesn't serve minute-old data for most of its own span.
const REALTIME_CACHE_TTL: Duration = Duration::from_secs(5);

/// Derives win-rate, PnL, and EV-vs-realised distributions from persisted
/// recommendations, caching results per query-key with a short TTL (spec
/// §4.6). Caches are strictly in-process and dropped wholesale on
/// `invalidate` — called by admission, closure, deletion, and trim.
pub struct StatisticsCalculator {
    persistence: Persistence,
    overall_cache: TtlCache<AggregateStats>,
    strategy_cache: TtlCache<Vec<StrategyStats>>,
    period_cache: TtlCache<PeriodStats>,
    ev_distribution_cache: TtlCache<EvDistribution>,
    ev_monitoring_cache: TtlCache<EvMonitoring>,
    realtime_cache: TtlCache<RealtimeStats>,
}

impl StatisticsCalculator {
    pub fn new(persistence: Persistence, ttl: Duration) -> Self {
        Self {
            persistence,
            overall_cache: TtlCache::new(ttl),
            strategy_cache: TtlCache::new(ttl),
            period_cache: TtlCache::new(ttl),
            ev_distribution_cache: TtlCache::new(ttl),
            ev_monitoring_cache: TtlCache::new(ttl),
            realtime_cache: TtlCache::new(REALTIME_CACHE_TTL),
        }
    }

    /// Drop every cached result. Called on admission, closure, deletion,
    /// trim (spec §4.6 "invalidated on every ...").
    pub fn invalidate(&self) {
        self.overall_cache.invalidate_all();
        self.strategy_cache.invalidate_all();
        self.period_cache.invalidate_all();
        self.ev_distribution_cache.invalidate_all();
        self.ev_monitoring_cache.invalidate_all();
        self.realtime_cache.invalidate_all();
    }

    async fn all_recommendations(&self) -> Result<Vec<reng_types::Recommendation>, EngineError> {
        self.persistence
            .recommendations()
            .list(&RecommendationFilter { include_active: true, ..Default::default() })
            .await
    }

    pub async fn overall(&self) -> Result<AggregateStats, EngineError> {
        if let Some(cached) = self.overall_cache.get("overall") {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let stats = compute::overall(&recs);
        self.overall_cache.put("overall", stats.clone());
        Ok(stats)
    }

    pub async fn per_strategy(&self) -> Result<Vec<StrategyStats>, EngineError> {
        if let Some(cached) = self.strategy_cache.get("per_strategy") {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let stats = compute::per_strategy(&recs);
        self.strategy_cache.put("per_strategy", stats.clone());
        Ok(stats)
    }

    pub async fn per_period(&self, period: Period) -> Result<PeriodStats, EngineError> {
        let key = format!("period:{period:?}");
        if let Some(cached) = self.period_cache.get(&key) {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let stats = compute::per_period(&recs, period, Utc::now());
        self.period_cache.put(key, stats.clone());
        Ok(stats)
    }

    pub async fn ev_distribution(
        &self,
        bins: usize,
        mode: BinMode,
        variant: Option<&str>,
    ) -> Result<EvDistribution, EngineError> {
        let key = format!("ev_dist:{bins}:{mode:?}:{variant:?}");
        if let Some(cached) = self.ev_distribution_cache.get(&key) {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let dist = compute::ev_distribution(&recs, bins, mode, variant);
        self.ev_distribution_cache.put(key, dist.clone());
        Ok(dist)
    }

    /// Real-time stats over a sub-day window (spec §6 "real-time stats
    /// window `1m..1h`"), clamped to that range so a stray query parameter
    /// can't force a full-table scan disguised as a 1-minute window.
    pub async fn realtime(&self, window_minutes: i64) -> Result<RealtimeStats, EngineError> {
        let window_minutes = window_minutes.clamp(1, 60);
        let key = format!("realtime:{window_minutes}");
        if let Some(cached) = self.realtime_cache.get(&key) {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let stats = compute::realtime(&recs, window_minutes, Utc::now());
        self.realtime_cache.put(key, stats.clone());
        Ok(stats)
    }

    pub async fn ev_monitoring(&self, window: EvWindow) -> Result<EvMonitoring, EngineError> {
        let key = format!("ev_mon:{window:?}");
        if let Some(cached) = self.ev_monitoring_cache.get(&key) {
            return Ok(cached);
        }
        let recs = self.all_recommendations().await?;
        let monitoring = compute::ev_monitoring(&recs, window, Utc::now());
        self.ev_monitoring_cache.put(key, monitoring.clone());
        Ok(monitoring)
    }
}
