use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of fill event an [`Execution`] row records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EventType {
    Open,
    Close,
    Reduce,
}

/// A realised fill record for a recommendation (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub recommendation_id: String,
    pub symbol: String,
    pub direction: crate::recommendation::Direction,
    pub event_type: EventType,
    pub intended_price: Decimal,
    pub fill_price: Decimal,
    pub fill_timestamp: DateTime<Utc>,
    pub latency_ms: i64,
    pub slippage_bps: f64,
    pub fee_bps: f64,
    pub pnl_amount: Option<Decimal>,
    pub pnl_percent: Option<f64>,
}

impl Execution {
    /// Slippage in basis points between intended and filled price, signed
    /// so that a fill worse than intended is positive.
    pub fn compute_slippage_bps(intended_price: Decimal, fill_price: Decimal) -> f64 {
        if intended_price.is_zero() {
            return 0.0;
        }
        let diff = (fill_price - intended_price) / intended_price;
        (diff * Decimal::from(10_000))
            .to_string()
            .parse::<f64>()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn slippage_bps_sign_and_magnitude() {
        let bps = Execution::compute_slippage_bps(dec!(2000), dec!(2002));
        assert!((bps - 10.0).abs() < 1e-6, "got {bps}");
    }
}
