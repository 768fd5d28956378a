use chrono::{DateTime, Utc};
use reng_types::{
    decision_chain::{Decision, DecisionStage},
    execution::EventType,
    recommendation::{Direction, ExitLabel, RecommendationStatus, TradeResult},
    DecisionChain, DecisionStep, Execution, Recommendation,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default()
}

/// Intermediate row for `recommendations`: money fields land as `f64`, the
/// same two-struct pattern the teacher's `ActiveRiskPositionRow` uses, then
/// [`RecommendationRow::into_domain`] widens them into [`Decimal`].
#[derive(sqlx::FromRow)]
pub(crate) struct RecommendationRow {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub strategy_type: String,
    pub leverage: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub confidence: f64,
    pub status: RecommendationStatus,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<String>,
    pub exit_label: Option<ExitLabel>,
    pub result: Option<TradeResult>,
    pub pnl_amount: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub experiment_id: Option<String>,
    pub variant: Option<String>,
    pub ab_group: Option<String>,
    pub decision_chain_id: Option<String>,
}

impl RecommendationRow {
    pub fn into_domain(self) -> Recommendation {
        Recommendation {
            id: self.id,
            symbol: self.symbol,
            direction: self.direction,
            strategy_type: self.strategy_type,
            leverage: dec(self.leverage),
            entry_price: dec(self.entry_price),
            current_price: dec(self.current_price),
            take_profit_price: dec(self.take_profit_price),
            stop_loss_price: dec(self.stop_loss_price),
            confidence: self.confidence,
            status: self.status,
            created_at: parse_dt(&self.created_at),
            closed_at: self.closed_at.as_deref().map(parse_dt),
            exit_price: self.exit_price.map(dec),
            exit_reason: self.exit_reason,
            exit_label: self.exit_label,
            result: self.result,
            pnl_amount: self.pnl_amount.map(dec),
            pnl_percent: self.pnl_percent,
            experiment_id: self.experiment_id,
            variant: self.variant,
            ab_group: self.ab_group,
            decision_chain_id: self.decision_chain_id,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ExecutionRow {
    pub id: String,
    pub recommendation_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub event_type: EventType,
    pub intended_price: f64,
    pub fill_price: f64,
    pub fill_timestamp: String,
    pub latency_ms: i64,
    pub slippage_bps: f64,
    pub fee_bps: f64,
    pub pnl_amount: Option<f64>,
    pub pnl_percent: Option<f64>,
}

impl ExecutionRow {
    pub fn into_domain(self) -> Execution {
        Execution {
            id: self.id,
            recommendation_id: self.recommendation_id,
            symbol: self.symbol,
            direction: self.direction,
            event_type: self.event_type,
            intended_price: dec(self.intended_price),
            fill_price: dec(self.fill_price),
            fill_timestamp: parse_dt(&self.fill_timestamp),
            latency_ms: self.latency_ms,
            slippage_bps: self.slippage_bps,
            fee_bps: self.fee_bps,
            pnl_amount: self.pnl_amount.map(dec),
            pnl_percent: self.pnl_percent,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DecisionChainRow {
    pub chain_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub source: String,
    pub started_at: String,
    pub finalized_at: Option<String>,
    pub final_decision: Decision,
    pub decision_time_ms: Option<i64>,
    pub recommendation_id: Option<String>,
    pub execution_id: Option<String>,
}

impl DecisionChainRow {
    pub fn into_domain(self, steps: Vec<DecisionStep>) -> DecisionChain {
        DecisionChain {
            chain_id: self.chain_id,
            symbol: self.symbol,
            direction: self.direction,
            source: self.source,
            started_at: parse_dt(&self.started_at),
            finalized_at: self.finalized_at.as_deref().map(parse_dt),
            final_decision: self.final_decision,
            decision_time_ms: self.decision_time_ms,
            recommendation_id: self.recommendation_id,
            execution_id: self.execution_id,
            steps,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DecisionStepRow {
    pub chain_id: String,
    pub step_index: i64,
    pub stage: DecisionStage,
    pub decision: Decision,
    pub reason: String,
    pub details: String,
    pub timestamp: String,
}

impl DecisionStepRow {
    pub fn into_domain(self) -> DecisionStep {
        DecisionStep {
            chain_id: self.chain_id,
            step_index: self.step_index,
            stage: self.stage,
            decision: self.decision,
            reason: self.reason,
            details: serde_json::from_str(&self.details).unwrap_or(serde_json::Value::Null),
            timestamp: parse_dt(&self.timestamp),
        }
    }
}
