use chrono::{DateTime, Utc};
use reng_types::{recommendation::compute_pnl, Direction, ExitLabel, Recommendation};
use rust_decimal::Decimal;

/// Magnitude below which `|pnl_percent|` is still considered untouched for
/// break-even eligibility (spec §4.5 step 3, reusing the same 0.1%
/// threshold as realised-outcome classification).
const BREAKEVEN_PNL_BAND: f64 = 0.1;

/// Evaluate the four exit conditions **in order** against the current
/// price and clock (spec §4.5 step 3). Pure function of its inputs — no
/// I/O, so it is trivially unit-testable and reusable from both the
/// periodic loop and manual force-expire paths.
pub fn evaluate_exit(
    rec: &Recommendation,
    current_price: Decimal,
    now: DateTime<Utc>,
    max_holding_time: chrono::Duration,
    breakeven_window: chrono::Duration,
    enable_breakeven: bool,
) -> Option<ExitLabel> {
    let stop_hit = match rec.direction {
        Direction::Long => current_price <= rec.stop_loss_price,
        Direction::Short => current_price >= rec.stop_loss_price,
    };
    if stop_hit {
        return Some(ExitLabel::DynamicStopLoss);
    }

    let target_hit = match rec.direction {
        Direction::Long => current_price >= rec.take_profit_price,
        Direction::Short => current_price <= rec.take_profit_price,
    };
    if target_hit {
        return Some(ExitLabel::DynamicTakeProfit);
    }

    let age = now - rec.created_at;
    if age >= max_holding_time {
        return Some(ExitLabel::Timeout);
    }

    if enable_breakeven && age >= breakeven_window {
        let (_, pnl_percent) = compute_pnl(rec.entry_price, current_price, rec.leverage, rec.direction);
        if pnl_percent.abs() < BREAKEVEN_PNL_BAND {
            return Some(ExitLabel::Breakeven);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::RecommendationStatus;
    use rust_decimal_macros::dec;

    fn base(direction: Direction) -> Recommendation {
        Recommendation {
            id: "r1".into(),
            symbol: "ETH-PERP".into(),
            direction,
            strategy_type: "momentum".into(),
            leverage: dec!(1),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: match direction {
                Direction::Long => dec!(2100),
                Direction::Short => dec!(1900),
            },
            stop_loss_price: match direction {
                Direction::Long => dec!(1950),
                Direction::Short => dec!(2050),
            },
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
        }
    }

    #[test]
    fn long_stop_loss_triggers_before_timeout() {
        let rec = base(Direction::Long);
        let exit = evaluate_exit(
            &rec,
            dec!(1940),
            Utc::now(),
            chrono::Duration::hours(24),
            chrono::Duration::hours(1),
            true,
        );
        assert_eq!(exit, Some(ExitLabel::DynamicStopLoss));
    }

    #[test]
    fn short_take_profit_triggers() {
        let rec = base(Direction::Short);
        let exit = evaluate_exit(
            &rec,
            dec!(1899),
            Utc::now(),
            chrono::Duration::hours(24),
            chrono::Duration::hours(1),
            true,
        );
        assert_eq!(exit, Some(ExitLabel::DynamicTakeProfit));
    }

    #[test]
    fn timeout_after_max_holding_time() {
        let mut rec = base(Direction::Long);
        rec.created_at = Utc::now() - chrono::Duration::hours(25);
        let exit = evaluate_exit(
            &rec,
            dec!(2005),
            Utc::now(),
            chrono::Duration::hours(24),
            chrono::Duration::hours(1),
            true,
        );
        assert_eq!(exit, Some(ExitLabel::Timeout));
    }

    #[test]
    fn breakeven_when_flat_after_window() {
        let mut rec = base(Direction::Long);
        rec.created_at = Utc::now() - chrono::Duration::hours(2);
        let exit = evaluate_exit(
            &rec,
            dec!(2000),
            Utc::now(),
            chrono::Duration::hours(24),
            chrono::Duration::hours(1),
            true,
        );
        assert_eq!(exit, Some(ExitLabel::Breakeven));
    }

    #[test]
    fn no_exit_when_nothing_triggers() {
        let rec = base(Direction::Long);
        let exit = evaluate_exit(
            &rec,
            dec!(2005),
            Utc::now(),
            chrono::Duration::hours(24),
            chrono::Duration::hours(1),
            true,
        );
        assert_eq!(exit, None);
    }
}
