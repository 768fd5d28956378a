//! Slippage analysis (spec §4.9), colocated with the rest of persistence
//! rather than split into its own crate: turning closed executions into
//! slippage observations, and the debounced adaptive-threshold maintainer
//! that is the third long-lived background task (spec §5c).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use reng_types::{
    new_id,
    slippage::{classify_severity, propose_threshold, MIN_THRESHOLD_BPS, THRESHOLD_ADJUST_TAG},
    EngineConfig, EngineError, EventType, Execution, ExitLabel, Recommendation, SlippageAlert,
    SlippageRecord, SlippageStatistics, SlippageThreshold,
};
use rust_decimal::Decimal;
use statrs::statistics::{Data, Distribution, OrderStatistics};
use tokio::sync::watch;

use crate::Persistence;

/// Ascending upper bounds (bps) for the distribution histogram; the last
/// bucket is unbounded and catches anything larger.
const BUCKET_BOUNDS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, f64::INFINITY,
];

/// Record the closing fill of a recommendation as an [`Execution`] and a
/// matching [`SlippageRecord`] (spec §4.9: "On each closed execution,
/// compute the slippage in bps, append a slippage record").
///
/// The intended price is the trigger price implied by the exit label: a
/// stop-loss or take-profit fills against its own trigger price. A
/// timeout or breakeven exit has no fixed trigger price, so it is recorded
/// against its own fill price — zero slippage by definition.
pub async fn record_execution_on_close(
    persistence: &Persistence,
    rec: &Recommendation,
    label: ExitLabel,
    fill_price: Decimal,
    fill_timestamp: DateTime<Utc>,
) -> Result<(), EngineError> {
    let intended_price = match label {
        ExitLabel::DynamicStopLoss => rec.stop_loss_price,
        ExitLabel::DynamicTakeProfit => rec.take_profit_price,
        ExitLabel::Timeout | ExitLabel::Breakeven => fill_price,
    };
    let slippage_bps = Execution::compute_slippage_bps(intended_price, fill_price);

    let execution = Execution {
        id: new_id("exec"),
        recommendation_id: rec.id.clone(),
        symbol: rec.symbol.clone(),
        direction: rec.direction,
        event_type: EventType::Close,
        intended_price,
        fill_price,
        fill_timestamp,
        latency_ms: 0,
        slippage_bps,
        fee_bps: 0.0,
        pnl_amount: rec.pnl_amount,
        pnl_percent: rec.pnl_percent,
    };
    persistence.executions().insert(&execution).await?;

    persistence
        .slippage()
        .insert_record(&SlippageRecord {
            id: new_id("slip"),
            symbol: rec.symbol.clone(),
            execution_id: execution.id,
            slippage_bps,
            latency_ms: 0,
            recorded_at: fill_timestamp,
            tag: None,
        })
        .await?;

    Ok(())
}

/// Periodically recomputes rolling slippage statistics per symbol and
/// proposes adaptive threshold adjustments, debounced so a single noisy
/// tick can't thrash a symbol's threshold.
pub struct SlippageAnalyzer {
    persistence: Persistence,
    k: f64,
    debounce: chrono::Duration,
    sample_size: i64,
    tick_interval_secs: u64,
}

impl SlippageAnalyzer {
    pub fn new(persistence: Persistence, config: &EngineConfig) -> Self {
        Self {
            persistence,
            k: config.slippage_threshold_k,
            debounce: chrono::Duration::seconds(config.slippage_threshold_debounce_secs),
            sample_size: config.slippage_stats_sample_size,
            tick_interval_secs: config.tick_interval_slippage_secs,
        }
    }

    /// Run the periodic loop until `shutdown` flips to `true`, finishing
    /// the in-flight tick before exiting (spec §5 "cooperative shutdown").
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.tick_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "slippage analyzer tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("slippage analyzer loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One iteration: sweep every symbol with recorded observations and
    /// attempt a debounced threshold adjustment. Per-symbol failures are
    /// isolated; the loop itself never aborts.
    pub async fn tick(&self) -> Result<(), EngineError> {
        for symbol in self.persistence.slippage().distinct_symbols().await? {
            if let Err(e) = self.maybe_adjust_threshold(&symbol).await {
                tracing::warn!(symbol = %symbol, error = %e, "threshold maintenance failed, will retry next tick");
            }
        }
        Ok(())
    }

    /// Rolling statistics for a symbol over its most recent observations.
    pub async fn compute_statistics(&self, symbol: &str) -> Result<SlippageStatistics, EngineError> {
        let records = self
            .persistence
            .slippage()
            .list_records(symbol, self.sample_size)
            .await?;

        let mut distribution_buckets: Vec<(f64, i64)> =
            BUCKET_BOUNDS.iter().map(|b| (*b, 0)).collect();

        if records.is_empty() {
            return Ok(SlippageStatistics {
                symbol: symbol.to_string(),
                sample_count: 0,
                avg_bps: 0.0,
                median_bps: 0.0,
                p95_bps: 0.0,
                avg_latency_ms: 0.0,
                distribution_buckets,
                updated_at: Utc::now(),
            });
        }

        let bps: Vec<f64> = records.iter().map(|r| r.slippage_bps).collect();
        let avg_latency_ms =
            records.iter().map(|r| r.latency_ms as f64).sum::<f64>() / records.len() as f64;

        for &b in &bps {
            if let Some(bucket) = distribution_buckets.iter_mut().find(|bucket| b <= bucket.0) {
                bucket.1 += 1;
            }
        }

        let mut data = Data::new(bps);
        let avg_bps = data.mean().unwrap_or(0.0);
        let median_bps = data.median();
        let p95_bps = data.percentile(95);

        Ok(SlippageStatistics {
            symbol: symbol.to_string(),
            sample_count: records.len() as i64,
            avg_bps,
            median_bps,
            p95_bps,
            avg_latency_ms,
            distribution_buckets,
            updated_at: Utc::now(),
        })
    }

    /// Debounced threshold-adjustment routine (spec §4.9): proposes a new
    /// threshold from rolling p95 + kσ. When the existing threshold is
    /// stale enough and the proposal actually differs, upserts it, records
    /// an alert sized by relative magnitude, and tags the triggering row
    /// `THRESHOLD_ADJUST`.
    pub async fn maybe_adjust_threshold(
        &self,
        symbol: &str,
    ) -> Result<Option<SlippageAlert>, EngineError> {
        let existing = self.persistence.slippage().get_threshold(symbol).await?;
        if let Some(existing) = &existing {
            if Utc::now() - existing.updated_at < self.debounce {
                return Ok(None);
            }
        }

        let stats = self.compute_statistics(symbol).await?;
        if stats.sample_count == 0 {
            return Ok(None);
        }

        let bps: Vec<f64> = self
            .persistence
            .slippage()
            .list_records(symbol, self.sample_size)
            .await?
            .into_iter()
            .map(|r| r.slippage_bps)
            .collect();
        let std_dev_bps = Data::new(bps).std_dev().unwrap_or(0.0);

        let previous_bps = existing
            .as_ref()
            .map(|t| t.threshold_bps)
            .unwrap_or(MIN_THRESHOLD_BPS);
        let new_bps = propose_threshold(stats.p95_bps, std_dev_bps, self.k);

        if (new_bps - previous_bps).abs() < f64::EPSILON {
            return Ok(None);
        }

        let now = Utc::now();
        self.persistence
            .slippage()
            .upsert_threshold(&SlippageThreshold {
                symbol: symbol.to_string(),
                threshold_bps: new_bps,
                updated_at: now,
            })
            .await?;

        let severity = classify_severity(previous_bps, new_bps);
        let alert = SlippageAlert {
            id: new_id("alert"),
            symbol: symbol.to_string(),
            severity,
            previous_threshold_bps: previous_bps,
            new_threshold_bps: new_bps,
            message: format!(
                "slippage threshold for {symbol} adjusted from {previous_bps:.2}bps to {new_bps:.2}bps"
            ),
            created_at: now,
        };
        self.persistence.slippage().insert_alert(&alert).await?;

        self.persistence
            .slippage()
            .insert_record(&SlippageRecord {
                id: new_id("slip"),
                symbol: symbol.to_string(),
                execution_id: alert.id.clone(),
                slippage_bps: new_bps,
                latency_ms: 0,
                recorded_at: now,
                tag: Some(THRESHOLD_ADJUST_TAG.to_string()),
            })
            .await?;

        Ok(Some(alert))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::Direction;
    use rust_decimal_macros::dec;

    fn sample_rec() -> Recommendation {
        Recommendation {
            id: "r1".into(),
            symbol: "ETH-PERP".into(),
            direction: Direction::Long,
            strategy_type: "momentum".into(),
            leverage: dec!(1),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(2100),
            stop_loss_price: dec!(1950),
            confidence: 0.8,
            status: reng_types::RecommendationStatus::Closed,
            created_at: Utc::now(),
            closed_at: Some(Utc::now()),
            exit_price: Some(dec!(1945)),
            exit_reason: Some("EXITED".into()),
            exit_label: Some(ExitLabel::DynamicStopLoss),
            result: Some(reng_types::TradeResult::Loss),
            pnl_amount: Some(dec!(-55)),
            pnl_percent: Some(-2.75),
            experiment_id: None,
            variant: None,
            ab_group: None,
            decision_chain_id: None,
        }
    }

    #[tokio::test]
    async fn record_execution_on_close_writes_execution_and_slippage_row() {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let rec = sample_rec();

        record_execution_on_close(&persistence, &rec, ExitLabel::DynamicStopLoss, dec!(1945), Utc::now())
            .await
            .unwrap();

        let execs = persistence.executions().list_for_recommendation("r1").await.unwrap();
        assert_eq!(execs.len(), 1);
        assert!(execs[0].slippage_bps < 0.0, "fill better than stop trigger should be negative bps");

        let records = persistence.slippage().list_records("ETH-PERP", 10).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn maybe_adjust_threshold_is_noop_without_samples() {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let analyzer = Arc::new(SlippageAnalyzer::new(persistence, &EngineConfig::default()));

        let alert = analyzer.maybe_adjust_threshold("ETH-PERP").await.unwrap();
        assert!(alert.is_none());
    }

    #[tokio::test]
    async fn maybe_adjust_threshold_proposes_and_alerts_on_first_observation() {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let rec = sample_rec();
        record_execution_on_close(&persistence, &rec, ExitLabel::DynamicStopLoss, dec!(1945), Utc::now())
            .await
            .unwrap();

        let analyzer = SlippageAnalyzer::new(persistence.clone(), &EngineConfig::default());
        let alert = analyzer.maybe_adjust_threshold("ETH-PERP").await.unwrap();
        assert!(alert.is_some());

        let threshold = persistence.slippage().get_threshold("ETH-PERP").await.unwrap();
        assert!(threshold.is_some());
    }
}
