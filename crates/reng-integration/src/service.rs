use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::DashMap;
use reng_decision_chain::DecisionChainMonitor;
use reng_gating::GatingEngine;
use reng_persistence::{GatingSnapshot, Persistence};
use reng_statistics::StatisticsCalculator;
use reng_tracker::Tracker;
use reng_types::{
    decision_chain::{Decision, DecisionStage},
    gating::{Candidate, GatingRejection},
    ids::new_gated_id,
    new_id, EngineConfig, EngineError, Recommendation, RecommendationStatus,
};
use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::hooks::HookRegistry;
use crate::metrics::IntegrationMetrics;
use crate::signal::SignalSource;

/// The outcome of one admission attempt, returned to callers that need the
/// chain id regardless of verdict (the manual-create API path — spec §6).
pub enum AdmissionOutcome {
    Admitted { recommendation: Recommendation, chain_id: String },
    Rejected { rejection: GatingRejection, chain_id: String },
}

/// Wires the signal collaborator, gating engine, persistence, and tracker
/// together and drives the periodic admission loop (spec §4.7). The loop is
/// at-most-one-in-flight: an `AtomicBool` guard causes an overlapping tick
/// to be skipped and counted rather than queued.
pub struct IntegrationService {
    persistence: Persistence,
    gating: Arc<GatingEngine>,
    tracker: Arc<Tracker>,
    statistics: Arc<StatisticsCalculator>,
    signal_source: Arc<dyn SignalSource>,
    hooks: HookRegistry,
    config: EngineConfig,
    metrics: AsyncMutex<IntegrationMetrics>,
    in_flight: AtomicBool,
    /// Serializes gating + persistence per symbol from "begin gating" to
    /// "admission persisted and added to tracker" (spec §5 ordering
    /// guarantee), the same per-key mutex discipline as
    /// `reng-price-monitor`'s single-flight refresh.
    symbol_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl IntegrationService {
    pub fn new(
        persistence: Persistence,
        gating: Arc<GatingEngine>,
        tracker: Arc<Tracker>,
        statistics: Arc<StatisticsCalculator>,
        signal_source: Arc<dyn SignalSource>,
        hooks: HookRegistry,
        config: EngineConfig,
        metrics_log_interval_cycles: u64,
    ) -> Self {
        Self {
            persistence,
            gating,
            tracker,
            statistics,
            signal_source,
            hooks,
            config,
            metrics: AsyncMutex::new(IntegrationMetrics::new(metrics_log_interval_cycles)),
            in_flight: AtomicBool::new(false),
            symbol_locks: DashMap::new(),
        }
    }

    /// Restore persisted cycle metrics, mirroring
    /// `state_manager::load_metrics` + `restore_from_json` ordering at
    /// startup (spec §4.7.1).
    pub async fn restore_metrics(&self) -> Result<(), EngineError> {
        if let Some(saved) = self.persistence.engine_state().load("integration_metrics").await? {
            if let Ok(json) = serde_json::from_str(&saved) {
                self.metrics.lock().await.restore_from_json(&json);
            }
        }
        Ok(())
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<AsyncMutex<()>> {
        self.symbol_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Run the periodic admission loop until `shutdown` flips to `true`
    /// (spec §5.1), finishing any in-flight tick before exiting.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.config.tick_interval_admission_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().tick_guarded().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("integration loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Skip a tick that would overlap a still-running one, counting it
    /// rather than queuing (spec §4.7 "overruns ... skipped").
    async fn tick_guarded(self: Arc<Self>) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.metrics.lock().await.record_overrun_skipped();
            tracing::warn!("admission tick skipped: previous tick still in flight");
            return;
        }
        if let Err(e) = self.tick().await {
            tracing::error!(error = %e, "admission tick failed");
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// One admission-loop iteration (spec §4.7 steps 1-4).
    pub async fn tick(&self) -> Result<(), EngineError> {
        let cycle_start = IntegrationMetrics::start_timer();

        let scan_start = IntegrationMetrics::start_timer();
        let candidate = self
            .signal_source
            .next_candidate()
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;
        {
            let mut metrics = self.metrics.lock().await;
            metrics.record_scan_duration(scan_start);
            metrics.record_candidate();
        }

        let Some(candidate) = candidate else {
            self.metrics.lock().await.record_null_candidate();
            self.finish_cycle(cycle_start).await;
            return Ok(());
        };

        let lock = self.symbol_lock(&candidate.symbol);
        let _guard = lock.lock().await;

        let outcome = self.admit_one(&candidate, "AUTO", true).await?;
        let admitted = matches!(outcome, AdmissionOutcome::Admitted { .. });
        self.metrics.lock().await.record_admission(admitted);
        self.finish_cycle(cycle_start).await;
        Ok(())
    }

    /// Entry point for a manually-submitted candidate (spec §6 Create).
    /// `fire_hooks` is `false` when the caller sent the `x-loop-guard`
    /// header.
    pub async fn submit_candidate(
        &self,
        candidate: &Candidate,
        fire_hooks: bool,
    ) -> Result<AdmissionOutcome, EngineError> {
        let lock = self.symbol_lock(&candidate.symbol);
        let _guard = lock.lock().await;
        self.admit_one(candidate, "MANUAL", fire_hooks).await
    }

    /// Snapshot of cycle telemetry for the monitoring API (spec §4.8
    /// "system health").
    pub async fn metrics_snapshot(&self) -> serde_json::Value {
        self.metrics.lock().await.snapshot_json()
    }

    async fn finish_cycle(&self, cycle_start: std::time::Instant) {
        let mut metrics = self.metrics.lock().await;
        metrics.finish_cycle(cycle_start);
        let json = metrics.to_json();
        drop(metrics);
        if let Err(e) = self.persistence.engine_state().save("integration_metrics", &json.to_string()).await {
            tracing::debug!(error = %e, "failed to persist integration metrics");
        }
    }

    /// Steps 2-4: start a chain, gate the candidate, and either finalize
    /// REJECTED or admit, persist, track, link, finalize APPROVED, and fire
    /// hooks (unless suppressed).
    async fn admit_one(
        &self,
        candidate: &Candidate,
        source: &str,
        fire_hooks: bool,
    ) -> Result<AdmissionOutcome, EngineError> {
        let chain = DecisionChainMonitor::new(&self.persistence);
        let chain_id = chain.start_chain(&candidate.symbol, candidate.direction, source).await?;

        let gate_start = IntegrationMetrics::start_timer();
        let world = self
            .persistence
            .recommendations()
            .gating_world_view(
                &candidate.symbol,
                candidate.direction,
                &candidate.strategy_type,
                self.config.duplicate_window_minutes,
            )
            .await?;
        let decision = self.gating.evaluate(candidate, &world);
        self.metrics.lock().await.record_gate_duration(gate_start);

        let rejection = match decision {
            Ok(()) => None,
            Err(rejection) => Some(rejection),
        };

        let Some(rejection) = rejection else {
            let recommendation = self.admit_and_finalize(&chain_id, candidate, fire_hooks).await?;
            return Ok(AdmissionOutcome::Admitted { recommendation, chain_id });
        };

        chain
            .add_step(
                &chain_id,
                DecisionStage::GatingCheck,
                Decision::Rejected,
                rejection.code.code_str(),
                serde_json::to_value(&rejection).unwrap_or(serde_json::Value::Null),
            )
            .await?;
        chain.finalize(&chain_id).await?;

        self.persistence
            .monitoring()
            .save_snapshot(&GatingSnapshot {
                id: new_gated_id(),
                symbol: candidate.symbol.clone(),
                check_time: chrono::Utc::now(),
                current_price: candidate.current_price,
                detail: serde_json::to_value(&rejection).unwrap_or(serde_json::Value::Null),
            })
            .await?;

        Ok(AdmissionOutcome::Rejected { rejection, chain_id })
    }

    async fn admit_and_finalize(
        &self,
        chain_id: &str,
        candidate: &Candidate,
        fire_hooks: bool,
    ) -> Result<Recommendation, EngineError> {
        let chain = DecisionChainMonitor::new(&self.persistence);
        chain
            .add_step(chain_id, DecisionStage::GatingCheck, Decision::Approved, "ok", serde_json::json!({}))
            .await?;

        let persist_start = IntegrationMetrics::start_timer();
        let rec = Recommendation {
            id: new_id("rec"),
            symbol: candidate.symbol.clone(),
            direction: candidate.direction,
            strategy_type: candidate.strategy_type.clone(),
            leverage: candidate.leverage,
            entry_price: candidate.entry_price,
            current_price: candidate.current_price,
            take_profit_price: candidate.take_profit_price,
            stop_loss_price: candidate.stop_loss_price,
            confidence: candidate.confidence,
            status: RecommendationStatus::Active,
            created_at: chrono::Utc::now(),
            closed_at: None,
            exit_price: None,
            exit_reason: None,
            exit_label: None,
            result: None,
            pnl_amount: None,
            pnl_percent: None,
            experiment_id: candidate.experiment_id.clone(),
            variant: candidate.variant.clone(),
            ab_group: candidate.ab_group.clone(),
            decision_chain_id: Some(chain_id.to_string()),
        };

        self.persistence.recommendations().insert(&rec).await?;
        self.tracker.active_set().insert(rec.clone()).await;
        self.metrics.lock().await.record_persist_duration(persist_start);

        chain.link_recommendation(chain_id, &rec.id).await?;
        chain
            .add_step(chain_id, DecisionStage::ExecutionDecision, Decision::Approved, "ADMITTED", serde_json::json!({}))
            .await?;
        chain.finalize(chain_id).await?;

        self.statistics.invalidate();
        if fire_hooks {
            self.hooks.fire(&rec).await;
        }

        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_persistence::ChainFilter;
    use reng_price_monitor::{PriceMonitor, StaticPriceFeed};
    use reng_types::Direction;
    use rust_decimal_macros::dec;

    fn candidate() -> Candidate {
        Candidate {
            symbol: "ETH-PERP".into(),
            direction: Direction::Long,
            strategy_type: "momentum".into(),
            leverage: dec!(3),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(2100),
            stop_loss_price: dec!(1950),
            confidence: 0.8,
            bypass_cooldown: true,
            mtf_agreement: None,
            mtf_dominant_direction: None,
            experiment_id: None,
            variant: None,
            ab_group: None,
        }
    }

    async fn harness() -> (Arc<IntegrationService>, Persistence, Arc<crate::signal::QueueSignalSource>) {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let config = EngineConfig::default();
        let gating = Arc::new(GatingEngine::new(config.clone()));
        let feed = Arc::new(StaticPriceFeed::new());
        feed.set("ETH-PERP", dec!(2000));
        let monitor = Arc::new(PriceMonitor::new(feed, StdDuration::from_secs(10), StdDuration::from_secs(60)));
        let statistics = Arc::new(StatisticsCalculator::new(persistence.clone(), StdDuration::from_secs(30)));
        let tracker = Arc::new(Tracker::new(persistence.clone(), monitor, statistics.clone(), config.clone()));
        let signal = Arc::new(crate::signal::QueueSignalSource::new());
        let service = Arc::new(IntegrationService::new(
            persistence.clone(),
            gating,
            tracker,
            statistics,
            signal.clone(),
            HookRegistry::new(),
            config,
            0,
        ));
        (service, persistence, signal)
    }

    #[tokio::test]
    async fn admits_clean_candidate_and_finalizes_chain_approved() {
        let (service, persistence, signal) = harness().await;
        signal.push(candidate()).await;

        service.tick().await.unwrap();

        let active = persistence.recommendations().list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(service.tracker.active_set().len().await, 1);

        let chains = persistence.decision_chains().list(&ChainFilter::default()).await.unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].final_decision, Decision::Approved);
        assert_eq!(chains[0].recommendation_id.as_deref(), Some(active[0].id.as_str()));
    }

    #[tokio::test]
    async fn rejects_invalid_candidate_and_saves_gating_snapshot() {
        let (service, persistence, signal) = harness().await;
        let mut bad = candidate();
        bad.entry_price = dec!(-1);
        signal.push(bad).await;

        service.tick().await.unwrap();

        let active = persistence.recommendations().list_active().await.unwrap();
        assert!(active.is_empty());

        let chains = persistence.decision_chains().list(&ChainFilter::default()).await.unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].final_decision, Decision::Rejected);

        let snapshots = persistence.monitoring().list_recent("ETH-PERP", 10).await.unwrap();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn null_candidate_is_a_noop_tick() {
        let (service, persistence, _signal) = harness().await;

        service.tick().await.unwrap();

        let active = persistence.recommendations().list_active().await.unwrap();
        assert!(active.is_empty());
        assert_eq!(service.metrics.lock().await.candidates_null, 1);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped_and_counted() {
        let (service, _persistence, _signal) = harness().await;
        service.in_flight.store(true, Ordering::SeqCst);

        service.clone().tick_guarded().await;

        assert_eq!(service.metrics.lock().await.overruns_skipped, 1);
    }
}
