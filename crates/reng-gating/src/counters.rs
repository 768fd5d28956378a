use dashmap::DashMap;
use reng_types::gating::GatingRejection;

/// Process-wide gating counters keyed `{reason, direction, mtf-bucket,
/// hourly-scope}` (spec §3 ownership note: "lifecycle tied to process
/// uptime", spec §4.4 "Observable side effect on reject").
#[derive(Default)]
pub struct GatingCounters {
    by_key: DashMap<String, i64>,
}

impl GatingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, symbol: &str, rejection: &GatingRejection) {
        let key = format!("{}|{}", symbol, rejection.code.code_str());
        *self.by_key.entry(key).or_insert(0) += 1;
    }

    pub fn count(&self, symbol: &str, code: &str) -> i64 {
        self.by_key.get(&format!("{symbol}|{code}")).map(|v| *v).unwrap_or(0)
    }

    pub fn snapshot(&self) -> std::collections::HashMap<String, i64> {
        self.by_key.iter().map(|e| (e.key().clone(), *e.value())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::gating::{CooldownScope, GatingCode};

    #[test]
    fn increments_per_symbol_and_code() {
        let counters = GatingCounters::new();
        let rejection = GatingRejection::new(
            GatingCode::HourlyCap {
                scope: CooldownScope::Total,
                cap: 10,
                current_count: 10,
                next_available_at: chrono::Utc::now(),
            },
            "cooldown",
        );
        counters.record("ETH-PERP", &rejection);
        counters.record("ETH-PERP", &rejection);
        assert_eq!(counters.count("ETH-PERP", "HOURLY_CAP"), 2);
    }
}
