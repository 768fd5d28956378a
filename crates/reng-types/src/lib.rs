//! Shared domain vocabulary for the recommendation engine: recommendation
//! lifecycle types, decision-chain records, gating rejection codes,
//! execution/slippage rows, and the engine-wide config and error types.

pub mod config;
pub mod decision_chain;
pub mod error;
pub mod execution;
pub mod gating;
pub mod ids;
pub mod recommendation;
pub mod slippage;

pub use config::EngineConfig;
pub use decision_chain::{Decision, DecisionChain, DecisionStage, DecisionStep};
pub use error::EngineError;
pub use execution::{EventType, Execution};
pub use gating::{
    Candidate, CooldownScope, GatingCommon, GatingRejection, GatingWorldView,
};
pub use ids::new_id;
pub use recommendation::{
    Direction, ExitLabel, Recommendation, RecommendationFilter, RecommendationStatus,
    TradeResult,
};
pub use slippage::{SlippageAlert, SlippageRecord, SlippageStatistics, SlippageThreshold};
