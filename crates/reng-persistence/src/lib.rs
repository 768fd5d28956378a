//! SQLite-backed durable storage for recommendations, executions, decision
//! chains, gating snapshots, and slippage analysis. The sole owner of
//! durable state (spec §3 ownership note).

mod db;
mod decision_chains;
mod engine_state;
mod executions;
mod monitoring;
mod recommendations;
mod rows;
mod slippage_analysis;
mod slippage_store;
mod strategy_performance;

pub use db::Db;
pub use decision_chains::{ChainFilter, DecisionChainStore};
pub use engine_state::EngineStateStore;
pub use executions::{ExecutionFilter, ExecutionStore};
pub use monitoring::{GatingSnapshot, MonitoringStore};
pub use recommendations::RecommendationStore;
pub use slippage_analysis::{record_execution_on_close, SlippageAnalyzer};
pub use slippage_store::SlippageStore;
pub use strategy_performance::{StrategyPerformance, StrategyPerformanceStore};

/// A handle bundling every store over a shared connection pool, the shape
/// components construct once at startup and clone cheaply thereafter.
#[derive(Clone)]
pub struct Persistence {
    db: Db,
}

impl Persistence {
    pub async fn connect(database_url: &str) -> Result<Self, reng_types::EngineError> {
        Ok(Self {
            db: Db::connect(database_url).await?,
        })
    }

    pub fn recommendations(&self) -> RecommendationStore<'_> {
        RecommendationStore::new(&self.db)
    }

    pub fn executions(&self) -> ExecutionStore<'_> {
        ExecutionStore::new(&self.db)
    }

    pub fn decision_chains(&self) -> DecisionChainStore<'_> {
        DecisionChainStore::new(&self.db)
    }

    pub fn monitoring(&self) -> MonitoringStore<'_> {
        MonitoringStore::new(&self.db)
    }

    pub fn slippage(&self) -> SlippageStore<'_> {
        SlippageStore::new(&self.db)
    }

    pub fn strategy_performance(&self) -> StrategyPerformanceStore<'_> {
        StrategyPerformanceStore::new(&self.db)
    }

    pub fn engine_state(&self) -> EngineStateStore<'_> {
        EngineStateStore::new(&self.db)
    }

    pub fn db(&self) -> &Db {
        &self.db
    }
}
