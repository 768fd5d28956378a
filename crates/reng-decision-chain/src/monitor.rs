use reng_persistence::{ChainFilter, DecisionChainStore, Persistence};
use reng_types::{
    decision_chain::{Decision, DecisionStage},
    new_id, DecisionChain, Direction, EngineError,
};

/// Thin façade over [`DecisionChainStore`] giving each operation in spec
/// §4.3 a stable name and minting chain ids the way every other id in this
/// engine is minted (`reng_types::new_id`).
pub struct DecisionChainMonitor<'a> {
    persistence: &'a Persistence,
}

impl<'a> DecisionChainMonitor<'a> {
    pub fn new(persistence: &'a Persistence) -> Self {
        Self { persistence }
    }

    fn store(&self) -> DecisionChainStore<'a> {
        self.persistence.decision_chains()
    }

    pub async fn start_chain(
        &self,
        symbol: &str,
        direction: Direction,
        source: &str,
    ) -> Result<String, EngineError> {
        let chain_id = new_id("chain");
        self.store().start(&chain_id, symbol, direction, source).await?;
        Ok(chain_id)
    }

    pub async fn add_step(
        &self,
        chain_id: &str,
        stage: DecisionStage,
        decision: Decision,
        reason: &str,
        details: serde_json::Value,
    ) -> Result<(), EngineError> {
        self.store().add_step(chain_id, stage, decision, reason, details).await
    }

    pub async fn link_recommendation(&self, chain_id: &str, recommendation_id: &str) -> Result<(), EngineError> {
        self.store().link_recommendation(chain_id, recommendation_id).await
    }

    pub async fn link_execution(&self, chain_id: &str, execution_id: &str) -> Result<(), EngineError> {
        self.store().link_execution(chain_id, execution_id).await
    }

    pub async fn finalize(&self, chain_id: &str) -> Result<DecisionChain, EngineError> {
        self.store().finalize(chain_id).await
    }

    pub async fn get(&self, chain_id: &str) -> Result<Option<DecisionChain>, EngineError> {
        self.store().get(chain_id).await
    }

    pub async fn query(&self, filter: &ChainFilter) -> Result<Vec<DecisionChain>, EngineError> {
        self.store().list(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::decision_chain::{Decision, DecisionStage};

    #[tokio::test]
    async fn full_lifecycle_through_facade() {
        let persistence = Persistence::connect("sqlite::memory:").await.unwrap();
        let monitor = DecisionChainMonitor::new(&persistence);

        let chain_id = monitor
            .start_chain("ETH-PERP", Direction::Long, "AUTO")
            .await
            .unwrap();
        monitor
            .add_step(&chain_id, DecisionStage::GatingCheck, Decision::Approved, "ok", serde_json::json!({}))
            .await
            .unwrap();
        monitor
            .add_step(
                &chain_id,
                DecisionStage::ExecutionDecision,
                Decision::Approved,
                "ADMITTED",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        monitor.link_recommendation(&chain_id, "rec1").await.unwrap();

        let chain = monitor.finalize(&chain_id).await.unwrap();
        assert_eq!(chain.final_decision, Decision::Approved);
        assert_eq!(chain.recommendation_id.as_deref(), Some("rec1"));
    }
}
