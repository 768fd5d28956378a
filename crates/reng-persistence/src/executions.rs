use reng_types::{Direction, EngineError, EventType, Execution};
use rust_decimal::prelude::ToPrimitive;

use crate::db::Db;
use crate::rows::ExecutionRow;

fn f64_of(d: rust_decimal::Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub symbol: Option<String>,
    pub direction: Option<Direction>,
    pub event_type: Option<EventType>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct ExecutionStore<'a> {
    db: &'a Db,
}

impl<'a> ExecutionStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, exec: &Execution) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, recommendation_id, symbol, direction, event_type,
                intended_price, fill_price, fill_timestamp, latency_ms,
                slippage_bps, fee_bps, pnl_amount, pnl_percent
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&exec.id)
        .bind(&exec.recommendation_id)
        .bind(&exec.symbol)
        .bind(exec.direction)
        .bind(exec.event_type)
        .bind(f64_of(exec.intended_price))
        .bind(f64_of(exec.fill_price))
        .bind(exec.fill_timestamp.to_rfc3339())
        .bind(exec.latency_ms)
        .bind(exec.slippage_bps)
        .bind(exec.fee_bps)
        .bind(exec.pnl_amount.map(f64_of))
        .bind(exec.pnl_percent)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, EngineError> {
        let mut sql = String::from("SELECT * FROM executions WHERE 1 = 1");
        if filter.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if filter.direction.is_some() {
            sql.push_str(" AND direction = ?");
        }
        if filter.event_type.is_some() {
            sql.push_str(" AND event_type = ?");
        }
        if filter.start_date.is_some() {
            sql.push_str(" AND fill_timestamp >= ?");
        }
        if filter.end_date.is_some() {
            sql.push_str(" AND fill_timestamp <= ?");
        }
        sql.push_str(" ORDER BY fill_timestamp DESC");

        let mut query = sqlx::query_as::<_, ExecutionRow>(&sql);
        if let Some(symbol) = &filter.symbol {
            query = query.bind(symbol);
        }
        if let Some(direction) = filter.direction {
            query = query.bind(direction);
        }
        if let Some(event_type) = filter.event_type {
            query = query.bind(event_type);
        }
        if let Some(start) = filter.start_date {
            query = query.bind(start.to_rfc3339());
        }
        if let Some(end) = filter.end_date {
            query = query.bind(end.to_rfc3339());
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        Ok(rows.into_iter().map(ExecutionRow::into_domain).collect())
    }

    pub async fn list_for_recommendation(
        &self,
        recommendation_id: &str,
    ) -> Result<Vec<Execution>, EngineError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM executions WHERE recommendation_id = ? ORDER BY fill_timestamp",
        )
        .bind(recommendation_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(ExecutionRow::into_domain).collect())
    }
}
