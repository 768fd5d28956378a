use chrono::Utc;
use reng_types::EngineError;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::db::Db;

/// Rolling per-strategy aggregate, updated incrementally on each closed
/// recommendation rather than recomputed from a full table scan (spec
/// §4.6.1), the same read-or-create-fold-writeback shape as the teacher's
/// `analytics::performance_tracker::update_strategy_performance`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy_type: String,
    pub closed_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub breakeven_trades: i64,
    pub total_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub last_updated: String,
}

pub struct StrategyPerformanceStore<'a> {
    db: &'a Db,
}

impl<'a> StrategyPerformanceStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// Fold a single closed recommendation's outcome into the strategy's
    /// running aggregate, creating the row on first sight.
    pub async fn record_closure(
        &self,
        strategy_type: &str,
        result: reng_types::TradeResult,
        pnl_amount: rust_decimal::Decimal,
    ) -> Result<(), EngineError> {
        use reng_types::TradeResult;

        let pnl = pnl_amount.to_f64().unwrap_or(0.0);
        let existing: Option<StrategyPerformance> =
            sqlx::query_as("SELECT * FROM strategy_performance WHERE strategy_type = ?")
                .bind(strategy_type)
                .fetch_optional(self.db.pool())
                .await?;

        let mut perf = existing.unwrap_or(StrategyPerformance {
            strategy_type: strategy_type.to_string(),
            closed_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            breakeven_trades: 0,
            total_pnl: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            win_rate: 0.0,
            profit_factor: 0.0,
            last_updated: Utc::now().to_rfc3339(),
        });

        perf.closed_trades += 1;
        perf.total_pnl += pnl;
        match result {
            TradeResult::Win => {
                perf.winning_trades += 1;
                perf.avg_win = ((perf.avg_win * (perf.winning_trades - 1) as f64) + pnl)
                    / perf.winning_trades as f64;
            }
            TradeResult::Loss => {
                perf.losing_trades += 1;
                perf.avg_loss = ((perf.avg_loss * (perf.losing_trades - 1) as f64) + pnl.abs())
                    / perf.losing_trades as f64;
            }
            TradeResult::Breakeven => {
                perf.breakeven_trades += 1;
            }
        }
        perf.win_rate = perf.winning_trades as f64 / perf.closed_trades as f64;
        let total_wins = perf.winning_trades as f64 * perf.avg_win;
        let total_losses = perf.losing_trades as f64 * perf.avg_loss;
        perf.profit_factor = if total_losses > 0.0 { total_wins / total_losses } else { 0.0 };
        perf.last_updated = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO strategy_performance (
                strategy_type, closed_trades, winning_trades, losing_trades,
                breakeven_trades, total_pnl, avg_win, avg_loss, win_rate,
                profit_factor, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(strategy_type) DO UPDATE SET
                closed_trades = excluded.closed_trades,
                winning_trades = excluded.winning_trades,
                losing_trades = excluded.losing_trades,
                breakeven_trades = excluded.breakeven_trades,
                total_pnl = excluded.total_pnl,
                avg_win = excluded.avg_win,
                avg_loss = excluded.avg_loss,
                win_rate = excluded.win_rate,
                profit_factor = excluded.profit_factor,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&perf.strategy_type)
        .bind(perf.closed_trades)
        .bind(perf.winning_trades)
        .bind(perf.losing_trades)
        .bind(perf.breakeven_trades)
        .bind(perf.total_pnl)
        .bind(perf.avg_win)
        .bind(perf.avg_loss)
        .bind(perf.win_rate)
        .bind(perf.profit_factor)
        .bind(&perf.last_updated)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn get(&self, strategy_type: &str) -> Result<Option<StrategyPerformance>, EngineError> {
        let row = sqlx::query_as("SELECT * FROM strategy_performance WHERE strategy_type = ?")
            .bind(strategy_type)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row)
    }

    pub async fn list_all(&self) -> Result<Vec<StrategyPerformance>, EngineError> {
        let rows = sqlx::query_as("SELECT * FROM strategy_performance ORDER BY profit_factor DESC")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::TradeResult;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn record_closure_accumulates_wins_and_losses() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = StrategyPerformanceStore::new(&db);

        store.record_closure("momentum", TradeResult::Win, dec!(100)).await.unwrap();
        store.record_closure("momentum", TradeResult::Loss, dec!(-40)).await.unwrap();

        let perf = store.get("momentum").await.unwrap().unwrap();
        assert_eq!(perf.closed_trades, 2);
        assert_eq!(perf.winning_trades, 1);
        assert_eq!(perf.losing_trades, 1);
        assert!((perf.win_rate - 0.5).abs() < 1e-9);
        assert!((perf.total_pnl - 60.0).abs() < 1e-9);
    }
}
