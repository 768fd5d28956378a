use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recommendation::Direction;

/// Stage at which a decision step was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStage {
    SignalCollection,
    GatingCheck,
    ExecutionDecision,
}

/// Outcome recorded by a decision step, or the chain's overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Decision {
    Approved,
    Rejected,
    Pending,
}

/// One entry in a decision chain's append-only step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionStep {
    pub chain_id: String,
    pub step_index: i64,
    pub stage: DecisionStage,
    pub decision: Decision,
    pub reason: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// An ordered, queryable audit record of one admission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionChain {
    pub chain_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub final_decision: Decision,
    pub decision_time_ms: Option<i64>,
    pub recommendation_id: Option<String>,
    pub execution_id: Option<String>,
    pub steps: Vec<DecisionStep>,
}

/// Reason recorded when a chain is finalized having seen neither an
/// `EXECUTION_DECISION` step nor a `REJECTED` step (spec §4.3 invariant).
pub const ABANDONED_REASON: &str = "ABANDONED";

impl DecisionChain {
    /// Derive `final_decision` from the recorded steps, per spec §4.3:
    /// it equals the decision of the last `EXECUTION_DECISION` step, or
    /// `REJECTED` if any `GATING_CHECK` step rejected, or `REJECTED`
    /// (reason `ABANDONED`) if neither occurred.
    pub fn derive_final_decision(&self) -> (Decision, Option<&'static str>) {
        if let Some(last_exec) = self
            .steps
            .iter()
            .rev()
            .find(|s| s.stage == DecisionStage::ExecutionDecision)
        {
            return (last_exec.decision, None);
        }
        if self
            .steps
            .iter()
            .any(|s| s.stage == DecisionStage::GatingCheck && s.decision == Decision::Rejected)
        {
            return (Decision::Rejected, None);
        }
        (Decision::Rejected, Some(ABANDONED_REASON))
    }

    /// Invariant: steps must be non-decreasing in timestamp and strictly
    /// increasing in step_index.
    pub fn steps_well_ordered(&self) -> bool {
        self.steps
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp && w[0].step_index < w[1].step_index)
    }
}
