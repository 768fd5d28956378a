use chrono::{DateTime, Utc};
use reng_types::{Recommendation, RecommendationStatus, TradeResult};
use rust_decimal::prelude::ToPrimitive;

use crate::models::{
    AggregateStats, BinMode, EvBin, EvCalibrationGroup, EvDistribution, EvMonitoring, EvWindow,
    Period, PeriodStats, RealtimeStats, StrategyStats,
};

/// `recommendations` may include both closed and active rows; active ones
/// only contribute to `active_count` (spec §4.6 "active count").
pub fn overall(recommendations: &[Recommendation]) -> AggregateStats {
    aggregate(recommendations.iter())
}

pub fn per_strategy(recommendations: &[Recommendation]) -> Vec<StrategyStats> {
    let mut strategies: Vec<String> = recommendations
        .iter()
        .map(|r| r.strategy_type.clone())
        .collect();
    strategies.sort();
    strategies.dedup();

    strategies
        .into_iter()
        .map(|strategy_type| {
            let subset: Vec<&Recommendation> = recommendations
                .iter()
                .filter(|r| r.strategy_type == strategy_type)
                .collect();
            StrategyStats {
                strategy_type,
                stats: aggregate(subset.into_iter()),
            }
        })
        .collect()
}

pub fn per_period(recommendations: &[Recommendation], period: Period, now: DateTime<Utc>) -> PeriodStats {
    let cutoff = match period {
        Period::Daily => Some(now - chrono::Duration::days(1)),
        Period::Weekly => Some(now - chrono::Duration::days(7)),
        Period::Monthly => Some(now - chrono::Duration::days(30)),
        Period::AllTime => None,
    };

    let subset = recommendations.iter().filter(|r| match cutoff {
        Some(cutoff) => r.created_at >= cutoff,
        None => true,
    });

    PeriodStats {
        period,
        stats: aggregate(subset),
    }
}

/// Aggregates over a sub-day rolling window measured in minutes (1-60),
/// the same windowing rule `per_period` applies at day granularity.
pub fn realtime(recommendations: &[Recommendation], window_minutes: i64, now: DateTime<Utc>) -> RealtimeStats {
    let cutoff = now - chrono::Duration::minutes(window_minutes);
    let subset = recommendations.iter().filter(|r| r.created_at >= cutoff);
    RealtimeStats {
        window_minutes,
        stats: aggregate(subset),
    }
}

fn aggregate<'a>(recs: impl Iterator<Item = &'a Recommendation>) -> AggregateStats {
    let mut stats = AggregateStats::default();
    let mut pnl_percent_sum = 0.0;
    let mut closed_count = 0i64;

    for rec in recs {
        if rec.status == RecommendationStatus::Active {
            stats.active_count += 1;
            continue;
        }

        stats.total_trades += 1;
        closed_count += 1;
        if let Some(pnl_amount) = rec.pnl_amount {
            stats.total_pnl_amount += pnl_amount.to_f64().unwrap_or(0.0);
        }
        if let Some(pnl_percent) = rec.pnl_percent {
            pnl_percent_sum += pnl_percent;
        }
        match rec.result {
            Some(TradeResult::Win) => stats.winning_trades += 1,
            Some(TradeResult::Loss) => stats.losing_trades += 1,
            Some(TradeResult::Breakeven) => stats.breakeven_trades += 1,
            None => {}
        }
    }

    if closed_count > 0 {
        stats.win_rate = stats.winning_trades as f64 / closed_count as f64;
        stats.avg_pnl_percent = pnl_percent_sum / closed_count as f64;
    }

    stats
}

/// Bin closed recommendations by `confidence` (the only per-candidate
/// scalar prediction named in §3 — used here as the EV proxy since the
/// domain types carry no separate predicted-EV field) against realised
/// `pnl_percent` (spec §4.6 "EV-vs-PnL distribution").
pub fn ev_distribution(
    recommendations: &[Recommendation],
    bins: usize,
    mode: BinMode,
    variant_filter: Option<&str>,
) -> EvDistribution {
    let closed: Vec<&Recommendation> = recommendations
        .iter()
        .filter(|r| r.status != RecommendationStatus::Active)
        .filter(|r| match variant_filter {
            Some(v) => r.variant.as_deref() == Some(v),
            None => true,
        })
        .collect();

    if closed.is_empty() || bins == 0 {
        return EvDistribution { bin_mode: mode, bins: Vec::new() };
    }

    let edges = bin_edges(&closed, bins, mode);
    let mut result = Vec::with_capacity(bins);
    for i in 0..bins {
        let (lower, upper) = (edges[i], edges[i + 1]);
        let in_bin: Vec<&&Recommendation> = closed
            .iter()
            .filter(|r| {
                if i == bins - 1 {
                    r.confidence >= lower && r.confidence <= upper
                } else {
                    r.confidence >= lower && r.confidence < upper
                }
            })
            .collect();

        let count = in_bin.len() as i64;
        let mean_pnl = if count > 0 {
            in_bin.iter().filter_map(|r| r.pnl_percent).sum::<f64>() / count as f64
        } else {
            0.0
        };
        let hits = in_bin
            .iter()
            .filter(|r| matches!(r.result, Some(TradeResult::Win)))
            .count() as f64;
        let hit_rate = if count > 0 { hits / count as f64 } else { 0.0 };

        result.push(EvBin {
            bin_index: i,
            ev_lower: lower,
            ev_upper: upper,
            count,
            mean_realised_pnl_percent: mean_pnl,
            hit_rate,
            variant: variant_filter.map(str::to_string),
        });
    }

    EvDistribution { bin_mode: mode, bins: result }
}

fn bin_edges(recs: &[&Recommendation], bins: usize, mode: BinMode) -> Vec<f64> {
    match mode {
        BinMode::Even => {
            let step = 1.0 / bins as f64;
            (0..=bins).map(|i| i as f64 * step).collect()
        }
        BinMode::Quantile => {
            let mut confidences: Vec<f64> = recs.iter().map(|r| r.confidence).collect();
            confidences.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = confidences.len();
            (0..=bins)
                .map(|i| {
                    if i == 0 {
                        return 0.0;
                    }
                    if i == bins {
                        return 1.0;
                    }
                    let idx = ((i as f64 / bins as f64) * n as f64) as usize;
                    confidences.get(idx.min(n - 1)).copied().unwrap_or(1.0)
                })
                .collect()
        }
    }
}

/// Rolling-window calibration grouped into confidence deciles (spec
/// §4.6 "EV monitoring ... grouped by EV level").
pub fn ev_monitoring(recommendations: &[Recommendation], window: EvWindow, now: DateTime<Utc>) -> EvMonitoring {
    let cutoff = now - window.duration();
    let closed: Vec<&Recommendation> = recommendations
        .iter()
        .filter(|r| r.status != RecommendationStatus::Active)
        .filter(|r| r.closed_at.map(|c| c >= cutoff).unwrap_or(false))
        .collect();

    let mut groups: Vec<EvCalibrationGroup> = Vec::new();
    for decile in 0..10 {
        let lower = decile as f64 / 10.0;
        let upper = (decile + 1) as f64 / 10.0;
        let in_bucket: Vec<&&Recommendation> = closed
            .iter()
            .filter(|r| {
                if decile == 9 {
                    r.confidence >= lower && r.confidence <= upper
                } else {
                    r.confidence >= lower && r.confidence < upper
                }
            })
            .collect();
        if in_bucket.is_empty() {
            continue;
        }
        let count = in_bucket.len() as i64;
        let avg_conf = in_bucket.iter().map(|r| r.confidence).sum::<f64>() / count as f64;
        let avg_pnl = in_bucket.iter().filter_map(|r| r.pnl_percent).sum::<f64>() / count as f64;
        groups.push(EvCalibrationGroup {
            ev_level_bucket: format!("{lower:.1}-{upper:.1}"),
            count,
            avg_predicted_confidence: avg_conf,
            avg_realised_pnl_percent: avg_pnl,
            calibration_error: (avg_conf * 100.0 - avg_pnl).abs(),
        });
    }

    EvMonitoring { window, groups }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::{Direction, RecommendationStatus as Status, TradeResult};
    use rust_decimal_macros::dec;

    fn closed_at(id: &str, created_at: DateTime<Utc>, result: TradeResult) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            symbol: "ETH-PERP".into(),
            direction: Direction::Long,
            strategy_type: "momentum".into(),
            leverage: dec!(1),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(2100),
            stop_loss_price: dec!(1950),
            confidence: 0.8,
            status: Status::Closed,
            created_at,
            closed_at: Some(created_at),
            exit_price: Some(dec!(2050)),
            exit_reason: Some("EXITED".into()),
            exit_label: Some(reng_types::ExitLabel::DynamicTakeProfit),
            result: Some(result),
            pnl_amount: Some(dec!(50)),
            pnl_percent: Some(5.0),
            experiment_id: None,
            variant: None,
            ab_group: None,
            decision_chain_id: None,
        }
    }

    #[test]
    fn realtime_excludes_recommendations_outside_the_window() {
        let now = Utc::now();
        let recs = vec![
            closed_at("r1", now - chrono::Duration::minutes(2), TradeResult::Win),
            closed_at("r2", now - chrono::Duration::minutes(30), TradeResult::Loss),
        ];

        let stats = realtime(&recs, 5, now);
        assert_eq!(stats.window_minutes, 5);
        assert_eq!(stats.stats.total_trades, 1);
        assert_eq!(stats.stats.winning_trades, 1);
    }

    #[test]
    fn realtime_widens_to_include_older_rows_as_window_grows() {
        let now = Utc::now();
        let recs = vec![
            closed_at("r1", now - chrono::Duration::minutes(2), TradeResult::Win),
            closed_at("r2", now - chrono::Duration::minutes(30), TradeResult::Loss),
        ];

        let stats = realtime(&recs, 60, now);
        assert_eq!(stats.stats.total_trades, 2);
    }
}
