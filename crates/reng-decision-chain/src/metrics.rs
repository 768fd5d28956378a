use std::collections::HashMap;

use reng_types::{decision_chain::Decision, DecisionChain};

/// Aggregate metrics over a set of decision chains (spec §4.3 "Metrics"):
/// totals, approval rate, rejection-reason histogram, average decision
/// time.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ChainMetrics {
    pub total: i64,
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
    pub approval_rate: f64,
    pub avg_decision_time_ms: f64,
    pub rejection_reason_histogram: HashMap<String, i64>,
}

impl ChainMetrics {
    /// Pure function of already-retrieved chains — the metrics read-model
    /// does no I/O of its own.
    pub fn compute(chains: &[DecisionChain]) -> Self {
        let total = chains.len() as i64;
        let mut approved = 0i64;
        let mut rejected = 0i64;
        let mut pending = 0i64;
        let mut decision_times = Vec::new();
        let mut histogram: HashMap<String, i64> = HashMap::new();

        for chain in chains {
            match chain.final_decision {
                Decision::Approved => approved += 1,
                Decision::Rejected => {
                    rejected += 1;
                    if let Some(reason) = rejection_reason(chain) {
                        *histogram.entry(reason).or_insert(0) += 1;
                    }
                }
                Decision::Pending => pending += 1,
            }
            if let Some(ms) = chain.decision_time_ms {
                decision_times.push(ms as f64);
            }
        }

        let approval_rate = if total > 0 {
            approved as f64 / total as f64
        } else {
            0.0
        };
        let avg_decision_time_ms = if decision_times.is_empty() {
            0.0
        } else {
            decision_times.iter().sum::<f64>() / decision_times.len() as f64
        };

        Self {
            total,
            approved,
            rejected,
            pending,
            approval_rate,
            avg_decision_time_ms,
            rejection_reason_histogram: histogram,
        }
    }
}

/// The reason recorded on the step that decided the rejection: the last
/// `GATING_CHECK` rejection's reason, or the finalize-time `ABANDONED`
/// reason if the chain never reached a gating verdict.
fn rejection_reason(chain: &DecisionChain) -> Option<String> {
    chain
        .steps
        .iter()
        .rev()
        .find(|s| s.decision == Decision::Rejected)
        .map(|s| s.reason.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reng_types::{decision_chain::DecisionStage, DecisionStep, Direction};

    fn chain(final_decision: Decision, steps: Vec<DecisionStep>, decision_time_ms: Option<i64>) -> DecisionChain {
        DecisionChain {
            chain_id: "c".into(),
            symbol: "ETH".into(),
            direction: Direction::Long,
            source: "AUTO".into(),
            started_at: Utc::now(),
            finalized_at: Some(Utc::now()),
            final_decision,
            decision_time_ms,
            recommendation_id: None,
            execution_id: None,
            steps,
        }
    }

    fn step(reason: &str, decision: Decision) -> DecisionStep {
        DecisionStep {
            chain_id: "c".into(),
            step_index: 0,
            stage: DecisionStage::GatingCheck,
            decision,
            reason: reason.to_string(),
            details: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn computes_approval_rate_and_histogram() {
        let chains = vec![
            chain(Decision::Approved, vec![], Some(100)),
            chain(
                Decision::Rejected,
                vec![step("COOLDOWN_GLOBAL", Decision::Rejected)],
                Some(50),
            ),
            chain(
                Decision::Rejected,
                vec![step("COOLDOWN_GLOBAL", Decision::Rejected)],
                Some(30),
            ),
        ];

        let metrics = ChainMetrics::compute(&chains);
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.approved, 1);
        assert_eq!(metrics.rejected, 2);
        assert!((metrics.approval_rate - (1.0 / 3.0)).abs() < 1e-9);
        assert_eq!(metrics.rejection_reason_histogram["COOLDOWN_GLOBAL"], 2);
        assert!((metrics.avg_decision_time_ms - 60.0).abs() < 1e-9);
    }
}
