use std::sync::Arc;

use async_trait::async_trait;
use reng_types::Recommendation;
use tokio::sync::RwLock;

/// A collaborator notified after a recommendation is admitted. Failures are
/// logged and never propagated (spec §4.7 step 4) — a hook that errors
/// never rolls back the admission it was notified of.
#[async_trait]
pub trait CreateHook: Send + Sync {
    async fn on_create(&self, recommendation: &Recommendation) -> anyhow::Result<()>;
}

/// The set of hooks fired on every admission (manual creates included,
/// unless suppressed by the `x-loop-guard` header at the API layer — spec
/// §6). Hooks run concurrently and independently; one failing never blocks
/// or fails the others.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<Vec<Arc<dyn CreateHook>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, hook: Arc<dyn CreateHook>) {
        self.hooks.write().await.push(hook);
    }

    /// Fire every registered hook asynchronously; a hook's failure is
    /// logged at the call site and never surfaces to the admission loop.
    pub async fn fire(&self, recommendation: &Recommendation) {
        let hooks = self.hooks.read().await.clone();
        for hook in hooks {
            let rec = recommendation.clone();
            tokio::spawn(async move {
                if let Err(err) = hook.on_create(&rec).await {
                    tracing::warn!(recommendation_id = %rec.id, %err, "onCreate hook failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reng_types::{Direction, RecommendationStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook(Arc<AtomicUsize>);

    #[async_trait]
    impl CreateHook for CountingHook {
        async fn on_create(&self, _recommendation: &Recommendation) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHook;

    #[async_trait]
    impl CreateHook for FailingHook {
        async fn on_create(&self, _recommendation: &Recommendation) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn sample() -> Recommendation {
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
    async fn fires_every_registered_hook_and_survives_a_failure() {
        let registry = HookRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(CountingHook(count.clone()))).await;
        registry.register(Arc::new(FailingHook)).await;

        registry.fire(&sample()).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
