use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position direction. LONG profits as price rises, SHORT as price falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The direction opposite to this one.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Lifecycle status of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum RecommendationStatus {
    Active,
    Closed,
    Expired,
}

/// The reason an active recommendation was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitLabel {
    DynamicTakeProfit,
    DynamicStopLoss,
    Timeout,
    Breakeven,
}

/// The realised outcome of a closed recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
}

/// Magnitude below which a realised pnl percentage is classified as
/// break-even rather than a win or loss (see spec §4.5 step 4).
pub const BREAKEVEN_PNL_PERCENT_THRESHOLD: f64 = 0.1;

/// Classify a realised pnl percentage into a [`TradeResult`].
///
/// Centralized per the spec's re-architecture note: never duplicate this
/// rule at the query layer.
pub fn classify_result(pnl_percent: f64) -> TradeResult {
    if pnl_percent.abs() < BREAKEVEN_PNL_PERCENT_THRESHOLD {
        TradeResult::Breakeven
    } else if pnl_percent > 0.0 {
        TradeResult::Win
    } else {
        TradeResult::Loss
    }
}

/// Compute `(pnl_amount, pnl_percent)` for a closed position.
///
/// `pnl_amount` is expressed as a fraction of notional (i.e. not scaled by
/// position size, only by leverage) and `pnl_percent` is the same value
/// times 100, matching the worked examples in spec §8.
pub fn compute_pnl(
    entry_price: Decimal,
    exit_price: Decimal,
    leverage: Decimal,
    direction: Direction,
) -> (Decimal, f64) {
    if entry_price.is_zero() {
        return (Decimal::ZERO, 0.0);
    }
    let raw_move = match direction {
        Direction::Long => (exit_price - entry_price) / entry_price,
        Direction::Short => (entry_price - exit_price) / entry_price,
    };
    let pnl_amount = raw_move * leverage;
    let pnl_percent = pnl_amount
        .checked_mul(Decimal::from(100))
        .and_then(|d| d.to_string().parse::<f64>().ok())
        .unwrap_or(0.0);
    (pnl_amount, pnl_percent)
}

/// The central trading-recommendation entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub strategy_type: String,
    pub leverage: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub take_profit_price: Decimal,
    pub stop_loss_price: Decimal,
    pub confidence: f64,

    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<String>,
    pub exit_label: Option<ExitLabel>,
    pub result: Option<TradeResult>,
    pub pnl_amount: Option<Decimal>,
    pub pnl_percent: Option<f64>,

    pub experiment_id: Option<String>,
    pub variant: Option<String>,
    pub ab_group: Option<String>,

    /// Foreign key to the decision chain that admitted this recommendation.
    pub decision_chain_id: Option<String>,
}

impl Recommendation {
    /// Invariant (iii) from spec §3: stop/entry/target ordering by direction.
    pub fn price_ordering_valid(&self) -> bool {
        match self.direction {
            Direction::Long => {
                self.stop_loss_price < self.entry_price && self.entry_price < self.take_profit_price
            }
            Direction::Short => {
                self.stop_loss_price > self.entry_price && self.entry_price > self.take_profit_price
            }
        }
    }

    /// Invariant (i): ACTIVE recommendations carry no closure fields.
    pub fn closure_fields_consistent(&self) -> bool {
        match self.status {
            RecommendationStatus::Active => {
                self.closed_at.is_none()
                    && self.exit_price.is_none()
                    && self.exit_label.is_none()
                    && self.result.is_none()
            }
            RecommendationStatus::Closed | RecommendationStatus::Expired => {
                self.closed_at.is_some()
                    && self.exit_price.is_some()
                    && self.exit_label.is_some()
                    && self.result.is_some()
                    && self.pnl_percent.is_some()
            }
        }
    }
}

/// Filters accepted by persistence list queries (spec §4.1, §6).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendationFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: Option<RecommendationStatus>,
    pub result: Option<TradeResult>,
    pub strategy_type: Option<String>,
    pub direction: Option<Direction>,
    pub experiment_id: Option<String>,
    pub include_active: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn happy_path_take_profit_pnl() {
        let (amount, percent) =
            compute_pnl(dec!(2000), dec!(2060), dec!(3), Direction::Long);
        assert!((percent - 9.0).abs() < 1e-9, "got {percent}");
        assert_eq!(classify_result(percent), TradeResult::Win);
        let _ = amount;
    }

    #[test]
    fn stop_loss_pnl() {
        let (_, percent) = compute_pnl(dec!(2000), dec!(1955), dec!(3), Direction::Long);
        assert!((percent - (-6.75)).abs() < 1e-6, "got {percent}");
        assert_eq!(classify_result(percent), TradeResult::Loss);
    }

    #[test]
    fn breakeven_threshold() {
        assert_eq!(classify_result(0.05), TradeResult::Breakeven);
        assert_eq!(classify_result(-0.05), TradeResult::Breakeven);
        assert_eq!(classify_result(0.1), TradeResult::Win);
    }

    #[test]
    fn short_price_ordering() {
        let rec = Recommendation {
            id: "r1".into(),
            symbol: "ETH".into(),
            direction: Direction::Short,
            strategy_type: "momentum".into(),
            leverage: dec!(1),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(1900),
            stop_loss_price: dec!(2050),
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
        };
        assert!(rec.price_ordering_valid());
        assert!(rec.closure_fields_consistent());
    }
}
