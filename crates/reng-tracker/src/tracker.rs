use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use dashmap::DashMap;
use reng_persistence::Persistence;
use reng_price_monitor::PriceMonitor;
use reng_statistics::StatisticsCalculator;
use reng_types::{
    recommendation::{classify_result, compute_pnl},
    EngineConfig, EngineError, ExitLabel, Recommendation, RecommendationStatus,
};
use tokio::sync::watch;

use crate::exits::evaluate_exit;
use crate::state::ActiveSet;

/// State machine over recommendations (spec §4.5): ACTIVE on admission,
/// terminal CLOSED/EXPIRED on exit. Owns the mutable in-memory active set
/// exclusively; other components see it read-only via [`ActiveSet`]
/// clones.
pub struct Tracker {
    persistence: Persistence,
    price_monitor: Arc<PriceMonitor>,
    statistics: Arc<StatisticsCalculator>,
    config: EngineConfig,
    active: ActiveSet,
    /// First observed `UPSTREAM_UNAVAILABLE` time per symbol, cleared on a
    /// successful fetch; once older than the grace period G the
    /// recommendation is skipped for this tick rather than failing the
    /// whole loop (spec §4.5 step 2).
    stale_since: DashMap<String, chrono::DateTime<Utc>>,
    /// Set by the maintenance "stop tracker" operation; `tick` becomes a
    /// no-op while set, rather than tearing down and respawning the loop.
    paused: AtomicBool,
}

impl Tracker {
    pub fn new(
        persistence: Persistence,
        price_monitor: Arc<PriceMonitor>,
        statistics: Arc<StatisticsCalculator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            persistence,
            price_monitor,
            statistics,
            config,
            active: ActiveSet::new(),
            stale_since: DashMap::new(),
            paused: AtomicBool::new(false),
        }
    }

    pub fn active_set(&self) -> ActiveSet {
        self.active.clone()
    }

    /// Maintenance "stop tracker" (spec §6): suspend exit evaluation
    /// without tearing down the periodic loop.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Maintenance "start tracker": resume exit evaluation.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Seed the in-memory active set from persisted `ACTIVE` rows before
    /// the periodic loop starts (spec §4.5.1), the same "load state before
    /// the main cycle loop" ordering as the teacher's agent bootstrap.
    pub async fn rehydrate(&self) -> Result<(), EngineError> {
        let rows = self.persistence.recommendations().list_active().await?;
        tracing::info!(count = rows.len(), "rehydrated active recommendations");
        self.active.seed(rows).await;
        Ok(())
    }

    /// Run the periodic loop until `shutdown` flips to `true`, finishing
    /// the in-flight tick before exiting (spec §5 "cooperative shutdown").
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.config.tick_interval_tracker_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "tracker tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("tracker loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One iteration: snapshot the active set, evaluate exits in order,
    /// persist transitions. Per-recommendation failures are isolated; the
    /// loop itself never aborts (spec §4.5 "Failure semantics").
    pub async fn tick(&self) -> Result<(), EngineError> {
        if self.is_paused() {
            return Ok(());
        }
        let snapshot = self.active.snapshot().await;
        for rec in snapshot {
            if let Err(e) = self.evaluate_one(&rec).await {
                tracing::warn!(recommendation_id = %rec.id, error = %e, "exit evaluation failed, will retry next tick");
            }
        }
        Ok(())
    }

    async fn evaluate_one(&self, rec: &Recommendation) -> Result<(), EngineError> {
        let reading = match self.price_monitor.get_latest(&rec.symbol).await {
            Ok(reading) => {
                self.stale_since.remove(&rec.symbol);
                reading
            }
            Err(EngineError::UpstreamUnavailable(_)) => {
                let since = *self
                    .stale_since
                    .entry(rec.symbol.clone())
                    .or_insert_with(Utc::now);
                let grace = chrono::Duration::seconds(self.config.tracker_grace_period_secs as i64);
                if Utc::now() - since >= grace {
                    tracing::warn!(symbol = %rec.symbol, "price unavailable past grace period, skipping");
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let label = evaluate_exit(
            rec,
            reading.price,
            Utc::now(),
            chrono::Duration::seconds(self.config.max_holding_time_secs),
            chrono::Duration::seconds(self.config.breakeven_window_secs),
            self.config.enable_breakeven_exit,
        );

        let Some(label) = label else {
            return Ok(());
        };

        self.close(rec.id.clone(), reading.price, label, RecommendationStatus::Closed, format!("EXITED:{label:?}"))
            .await
    }

    /// The active set has already dropped `id` by the time a second
    /// manual-close/force-expire call arrives for an already-terminal
    /// recommendation; distinguish that from a truly unknown id by
    /// consulting persistence (spec "force-expire an already-expired
    /// recommendation ... returns `ALREADY_CLOSED`").
    async fn not_active_error(&self, id: &str) -> Result<EngineError, EngineError> {
        match self.persistence.recommendations().get(id).await? {
            Some(rec) if rec.status != RecommendationStatus::Active => {
                Ok(EngineError::AlreadyClosed(id.to_string()))
            }
            _ => Ok(EngineError::RecommendationNotFound(id.to_string())),
        }
    }

    /// Manually close a recommendation. Runs the same exit evaluation
    /// against the latest price; if no condition has actually triggered
    /// yet, the closure is still labeled the way force-expire labels an
    /// out-of-band closure — `TIMEOUT` — so the non-null `exit_label`
    /// invariant always holds.
    pub async fn close_manual(&self, id: &str, reason: Option<String>) -> Result<Recommendation, EngineError> {
        let rec = match self.active.get(id).await {
            Some(rec) => rec,
            None => return Err(self.not_active_error(id).await?),
        };

        let reading = self.price_monitor.get_latest(&rec.symbol).await?;
        let label = evaluate_exit(
            &rec,
            reading.price,
            Utc::now(),
            chrono::Duration::seconds(self.config.max_holding_time_secs),
            chrono::Duration::seconds(self.config.breakeven_window_secs),
            self.config.enable_breakeven_exit,
        )
        .unwrap_or(ExitLabel::Timeout);

        self.close(
            id.to_string(),
            reading.price,
            label,
            RecommendationStatus::Closed,
            reason.unwrap_or_else(|| "MANUAL_CLOSE".to_string()),
        )
        .await?;

        self.persistence
            .recommendations()
            .get(id)
            .await?
            .ok_or_else(|| EngineError::RecommendationNotFound(id.to_string()))
    }

    /// Force-expire: terminal `EXPIRED` status, always labeled `TIMEOUT`
    /// (spec §3 / §4.5 "EXPIRED ... treated as TIMEOUT label").
    pub async fn force_expire(&self, id: &str) -> Result<Recommendation, EngineError> {
        let rec = match self.active.get(id).await {
            Some(rec) => rec,
            None => return Err(self.not_active_error(id).await?),
        };
        let reading = self.price_monitor.get_latest(&rec.symbol).await?;

        self.close(
            id.to_string(),
            reading.price,
            ExitLabel::Timeout,
            RecommendationStatus::Expired,
            "FORCE_EXPIRE".to_string(),
        )
        .await?;

        self.persistence
            .recommendations()
            .get(id)
            .await?
            .ok_or_else(|| EngineError::RecommendationNotFound(id.to_string()))
    }

    async fn close(
        &self,
        id: String,
        exit_price: rust_decimal::Decimal,
        label: ExitLabel,
        status: RecommendationStatus,
        reason: String,
    ) -> Result<(), EngineError> {
        let Some(mut rec) = self.active.get(&id).await else {
            return Err(EngineError::RecommendationNotFound(id));
        };

        let (pnl_amount, pnl_percent) = compute_pnl(rec.entry_price, exit_price, rec.leverage, rec.direction);
        let result = classify_result(pnl_percent);

        rec.status = status;
        rec.closed_at = Some(Utc::now());
        rec.exit_price = Some(exit_price);
        rec.exit_reason = Some(reason.clone());
        rec.exit_label = Some(label);
        rec.result = Some(result);
        rec.pnl_amount = Some(pnl_amount);
        rec.pnl_percent = Some(pnl_percent);

        self.persistence.recommendations().update(&rec).await?;
        self.persistence
            .strategy_performance()
            .record_closure(&rec.strategy_type, result, pnl_amount)
            .await?;
        if let Err(e) =
            reng_persistence::record_execution_on_close(&self.persistence, &rec, label, exit_price, rec.closed_at.unwrap_or_else(Utc::now))
                .await
        {
            tracing::warn!(recommendation_id = %rec.id, error = %e, "failed to record slippage observation on close");
        }
        self.active.remove(&id).await;
        self.statistics.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_price_monitor::StaticPriceFeed;
    use reng_types::{Direction, RecommendationStatus};
    use rust_decimal_macros::dec;

    async fn harness() -> (Tracker, Arc<StaticPriceFeed>) {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let feed = Arc::new(StaticPriceFeed::new());
        let monitor = Arc::new(PriceMonitor::new(
            feed.clone(),
            StdDuration::from_secs(10),
            StdDuration::from_secs(60),
        ));
        let statistics = Arc::new(StatisticsCalculator::new(persistence.clone(), StdDuration::from_secs(30)));
        let tracker = Tracker::new(persistence, monitor, statistics, EngineConfig::default());
        (tracker, feed)
    }

    fn sample(id: &str) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            symbol: "ETH-PERP".into(),
            direction: Direction::Long,
            strategy_type: "momentum".into(),
            leverage: dec!(1),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(2100),
            stop_loss_price: dec!(1950),
            confidence: 0.8,
            status: RecommendationStatus::Active,
            created_at: Utc::now(),
            closed_at: None,
            exit_price: None,
            exit_reason: None,
            exit_label: None,
            result: None,
            pnl_amount: None,
            pnl_percent: None,
            experiment_id: None,
            variant: None,
            ab_group: None,
            decision_chain_id: None,
        }
    }

    #[tokio::test]
    async fn tick_closes_on_stop_loss() {
        let (tracker, feed) = harness().await;
        feed.set("ETH-PERP", dec!(1940));
        let rec = sample("r1");
        tracker.persistence.recommendations().insert(&rec).await.unwrap();
        tracker.active.insert(rec).await;

        tracker.tick().await.unwrap();

        assert_eq!(tracker.active.len().await, 0);
        let stored = tracker.persistence.recommendations().get("r1").await.unwrap().unwrap();
        assert_eq!(stored.status, RecommendationStatus::Closed);
        assert_eq!(stored.exit_label, Some(ExitLabel::DynamicStopLoss));
    }

    #[tokio::test]
    async fn tick_leaves_open_position_untouched() {
        let (tracker, feed) = harness().await;
        feed.set("ETH-PERP", dec!(2005));
        let rec = sample("r1");
        tracker.persistence.recommendations().insert(&rec).await.unwrap();
        tracker.active.insert(rec).await;

        tracker.tick().await.unwrap();

        assert_eq!(tracker.active.len().await, 1);
    }

    #[tokio::test]
    async fn force_expire_sets_timeout_label() {
        let (tracker, feed) = harness().await;
        feed.set("ETH-PERP", dec!(2005));
        let rec = sample("r1");
        tracker.persistence.recommendations().insert(&rec).await.unwrap();
        tracker.active.insert(rec).await;

        let closed = tracker.force_expire("r1").await.unwrap();
        assert_eq!(closed.status, RecommendationStatus::Expired);
        assert_eq!(closed.exit_label, Some(ExitLabel::Timeout));
    }

    #[tokio::test]
    async fn force_expire_twice_returns_already_closed() {
        let (tracker, feed) = harness().await;
        feed.set("ETH-PERP", dec!(2005));
        let rec = sample("r1");
        tracker.persistence.recommendations().insert(&rec).await.unwrap();
        tracker.active.insert(rec).await;

        tracker.force_expire("r1").await.unwrap();
        let err = tracker.force_expire("r1").await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyClosed(id) if id == "r1"));
    }

    #[tokio::test]
    async fn close_manual_on_unknown_id_returns_not_found() {
        let (tracker, _feed) = harness().await;
        let err = tracker.close_manual("missing", None).await.unwrap_err();
        assert!(matches!(err, EngineError::RecommendationNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn rehydrate_seeds_active_set_from_persistence() {
        let (tracker, _feed) = harness().await;
        tracker.persistence.recommendations().insert(&sample("r1")).await.unwrap();

        tracker.rehydrate().await.unwrap();

        assert_eq!(tracker.active.len().await, 1);
    }
}
