use chrono::Duration;
use reng_persistence::GatingSnapshot;
use reng_types::{decision_chain::DecisionStep, DecisionChain};
use rust_decimal::Decimal;

/// A decision step annotated with the market price observed closest to its
/// timestamp, when a monitoring snapshot for that time exists.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplayStep {
    pub step: DecisionStep,
    pub market_price: Option<Decimal>,
}

/// A pure reconstruction of one chain's step sequence plus (optionally)
/// the market context recorded in monitoring snapshots at the time of each
/// step (spec §4.3 "Replay" — "pure function of stored data").
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainReplay {
    pub chain_id: String,
    pub steps: Vec<ReplayStep>,
}

/// Snapshots are matched to steps by nearest timestamp within this
/// tolerance; outside it a step is replayed with no market context.
const MATCH_TOLERANCE: Duration = Duration::seconds(5);

impl ChainReplay {
    pub fn build(chain: &DecisionChain, snapshots: &[GatingSnapshot]) -> Self {
        let steps = chain
            .steps
            .iter()
            .map(|step| {
                let market_price = snapshots
                    .iter()
                    .filter(|s| (s.check_time - step.timestamp).abs() <= MATCH_TOLERANCE)
                    .min_by_key(|s| (s.check_time - step.timestamp).num_milliseconds().abs())
                    .map(|s| s.current_price);
                ReplayStep { step: step.clone(), market_price }
            })
            .collect();

        Self {
            chain_id: chain.chain_id.clone(),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reng_types::{
        decision_chain::{Decision, DecisionStage},
        Direction,
    };
    use rust_decimal_macros::dec;

    #[test]
    fn matches_snapshot_within_tolerance() {
        let now = Utc::now();
        let chain = DecisionChain {
            chain_id: "c1".into(),
            symbol: "ETH".into(),
            direction: Direction::Long,
            source: "AUTO".into(),
            started_at: now,
            finalized_at: None,
            final_decision: Decision::Pending,
            decision_time_ms: None,
            recommendation_id: None,
            execution_id: None,
            steps: vec![DecisionStep {
                chain_id: "c1".into(),
                step_index: 0,
                stage: DecisionStage::GatingCheck,
                decision: Decision::Rejected,
                reason: "COOLDOWN_GLOBAL".into(),
                details: serde_json::json!({}),
                timestamp: now,
            }],
        };
        let snapshots = vec![GatingSnapshot {
            id: "s1".into(),
            symbol: "ETH".into(),
            check_time: now,
            current_price: dec!(2000),
            detail: serde_json::json!({}),
        }];

        let replay = ChainReplay::build(&chain, &snapshots);
        assert_eq!(replay.steps[0].market_price, Some(dec!(2000)));
    }
}
