use chrono::{DateTime, Utc};
use reng_types::{
    gating::GatingWorldView, recommendation::RecommendationFilter, Direction, EngineError,
    Recommendation, RecommendationStatus,
};
use rust_decimal::prelude::ToPrimitive;

use crate::db::Db;
use crate::rows::RecommendationRow;

fn f64_of(d: rust_decimal::Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Recommendation CRUD (spec §4.1). All money fields are persisted as
/// `f64` and widened back to `Decimal` on read, the same split the
/// teacher's portfolio/risk stores use.
pub struct RecommendationStore<'a> {
    db: &'a Db,
}

impl<'a> RecommendationStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, rec: &Recommendation) -> Result<(), EngineError> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM recommendations WHERE id = ?")
                .bind(&rec.id)
                .fetch_optional(self.db.pool())
                .await?;
        if existing.is_some() {
            return Err(EngineError::Conflict(rec.id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO recommendations (
                id, symbol, direction, strategy_type, leverage, entry_price,
                current_price, take_profit_price, stop_loss_price, confidence,
                status, created_at, closed_at, exit_price, exit_reason,
                exit_label, result, pnl_amount, pnl_percent, experiment_id,
                variant, ab_group, decision_chain_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rec.id)
        .bind(&rec.symbol)
        .bind(rec.direction)
        .bind(&rec.strategy_type)
        .bind(f64_of(rec.leverage))
        .bind(f64_of(rec.entry_price))
        .bind(f64_of(rec.current_price))
        .bind(f64_of(rec.take_profit_price))
        .bind(f64_of(rec.stop_loss_price))
        .bind(rec.confidence)
        .bind(rec.status)
        .bind(rec.created_at.to_rfc3339())
        .bind(rec.closed_at.map(|d| d.to_rfc3339()))
        .bind(rec.exit_price.map(f64_of))
        .bind(&rec.exit_reason)
        .bind(rec.exit_label)
        .bind(rec.result)
        .bind(rec.pnl_amount.map(f64_of))
        .bind(rec.pnl_percent)
        .bind(&rec.experiment_id)
        .bind(&rec.variant)
        .bind(&rec.ab_group)
        .bind(&rec.decision_chain_id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Full rewrite of the mutable fields on an existing row (the tracker is
    /// the sole mutator of lifecycle fields, per spec §3 ownership note).
    pub async fn update(&self, rec: &Recommendation) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE recommendations SET
                current_price = ?, status = ?, closed_at = ?, exit_price = ?,
                exit_reason = ?, exit_label = ?, result = ?, pnl_amount = ?,
                pnl_percent = ?
            WHERE id = ?
            "#,
        )
        .bind(f64_of(rec.current_price))
        .bind(rec.status)
        .bind(rec.closed_at.map(|d| d.to_rfc3339()))
        .bind(rec.exit_price.map(f64_of))
        .bind(&rec.exit_reason)
        .bind(rec.exit_label)
        .bind(rec.result)
        .bind(rec.pnl_amount.map(f64_of))
        .bind(rec.pnl_percent)
        .bind(&rec.id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::RecommendationNotFound(rec.id.clone()));
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Recommendation>, EngineError> {
        let row: Option<RecommendationRow> =
            sqlx::query_as("SELECT * FROM recommendations WHERE id = ?")
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.map(RecommendationRow::into_domain))
    }

    pub async fn list(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<Vec<Recommendation>, EngineError> {
        let mut sql = String::from("SELECT * FROM recommendations WHERE 1 = 1");

        if !filter.include_active {
            sql.push_str(" AND status != 'ACTIVE'");
        }
        if filter.start_date.is_some() {
            sql.push_str(" AND created_at >= ?");
        }
        if filter.end_date.is_some() {
            sql.push_str(" AND created_at <= ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.result.is_some() {
            sql.push_str(" AND result = ?");
        }
        if filter.strategy_type.is_some() {
            sql.push_str(" AND strategy_type = ?");
        }
        if filter.direction.is_some() {
            sql.push_str(" AND direction = ?");
        }
        if filter.experiment_id.is_some() {
            sql.push_str(" AND experiment_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        if filter.offset.is_some() {
            sql.push_str(" OFFSET ?");
        }

        let mut query = sqlx::query_as::<_, RecommendationRow>(&sql);
        if let Some(start) = filter.start_date {
            query = query.bind(start.to_rfc3339());
        }
        if let Some(end) = filter.end_date {
            query = query.bind(end.to_rfc3339());
        }
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(result) = filter.result {
            query = query.bind(result);
        }
        if let Some(strategy_type) = &filter.strategy_type {
            query = query.bind(strategy_type);
        }
        if let Some(direction) = filter.direction {
            query = query.bind(direction);
        }
        if let Some(experiment_id) = &filter.experiment_id {
            query = query.bind(experiment_id);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }
        if let Some(offset) = filter.offset {
            query = query.bind(offset);
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        Ok(rows.into_iter().map(RecommendationRow::into_domain).collect())
    }

    pub async fn list_active(&self) -> Result<Vec<Recommendation>, EngineError> {
        let rows: Vec<RecommendationRow> = sqlx::query_as(
            "SELECT * FROM recommendations WHERE status = 'ACTIVE' ORDER BY created_at",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(RecommendationRow::into_domain).collect())
    }

    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM recommendations WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Keep the `keep` most-recent rows (default 100), deleting the rest
    /// (spec §4.1 "trim-history").
    pub async fn trim_history(&self, keep: i64) -> Result<u64, EngineError> {
        let result = sqlx::query(
            r#"
            DELETE FROM recommendations
            WHERE id NOT IN (
                SELECT id FROM recommendations ORDER BY created_at DESC LIMIT ?
            )
            "#,
        )
        .bind(keep)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_hourly(&self, symbol: &str, since_hour_start: chrono::DateTime<chrono::Utc>) -> Result<i64, EngineError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recommendations WHERE symbol = ? AND created_at >= ?",
        )
        .bind(symbol)
        .bind(since_hour_start.to_rfc3339())
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    pub async fn count_active_by_direction(
        &self,
        symbol: &str,
        direction: reng_types::Direction,
    ) -> Result<i64, EngineError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recommendations WHERE symbol = ? AND direction = ? AND status = 'ACTIVE'",
        )
        .bind(symbol)
        .bind(direction)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    async fn last_created_at(
        &self,
        symbol: &str,
        direction: Option<Direction>,
    ) -> Result<Option<DateTime<Utc>>, EngineError> {
        let row: Option<(String,)> = if let Some(direction) = direction {
            sqlx::query_as(
                "SELECT created_at FROM recommendations WHERE symbol = ? AND direction = ? ORDER BY created_at DESC LIMIT 1",
            )
            .bind(symbol)
            .bind(direction)
            .fetch_optional(self.db.pool())
            .await?
        } else {
            sqlx::query_as(
                "SELECT created_at FROM recommendations WHERE symbol = ? ORDER BY created_at DESC LIMIT 1",
            )
            .bind(symbol)
            .fetch_optional(self.db.pool())
            .await?
        };
        Ok(row.and_then(|(ts,)| DateTime::parse_from_rfc3339(&ts).ok().map(|d| d.with_timezone(&Utc))))
    }

    /// Gather every fact a gating rule needs straight from persisted state
    /// (spec §4.4 tie-break rule: never from stale caches), for the given
    /// candidate's `(symbol, direction, strategy_type)`.
    pub async fn gating_world_view(
        &self,
        symbol: &str,
        direction: Direction,
        strategy_type: &str,
        duplicate_window_minutes: i64,
    ) -> Result<GatingWorldView, EngineError> {
        let opposite = direction.opposite();
        let hour_start = Utc::now() - chrono::Duration::hours(1);
        let duplicate_since = Utc::now() - chrono::Duration::minutes(duplicate_window_minutes);

        let same_direction_last_created_at = self.last_created_at(symbol, Some(direction)).await?;
        let opposite_last_created_at = self.last_created_at(symbol, Some(opposite)).await?;
        let global_last_created_at = self.last_created_at(symbol, None).await?;

        let (hourly_total_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM recommendations WHERE symbol = ? AND created_at >= ?")
                .bind(symbol)
                .bind(hour_start.to_rfc3339())
                .fetch_one(self.db.pool())
                .await?;
        let (hourly_per_direction_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recommendations WHERE symbol = ? AND direction = ? AND created_at >= ?",
        )
        .bind(symbol)
        .bind(direction)
        .bind(hour_start.to_rfc3339())
        .fetch_one(self.db.pool())
        .await?;

        let duplicate_rows: Vec<(String, f64, String)> = sqlx::query_as(
            r#"
            SELECT id, entry_price, created_at FROM recommendations
            WHERE symbol = ? AND direction = ? AND strategy_type = ? AND created_at >= ?
            "#,
        )
        .bind(symbol)
        .bind(direction)
        .bind(strategy_type)
        .bind(duplicate_since.to_rfc3339())
        .fetch_all(self.db.pool())
        .await?;
        let duplicate_candidates = duplicate_rows
            .into_iter()
            .filter_map(|(id, entry_price, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at).ok()?.with_timezone(&Utc);
                let entry_price = rust_decimal::Decimal::from_f64_retain(entry_price)?;
                Some((id, entry_price, created_at))
            })
            .collect();

        let opposite_active_count = self.count_active_by_direction(symbol, opposite).await?;
        let direction_active_count = self.count_active_by_direction(symbol, direction).await?;
        let (total_active_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM recommendations WHERE symbol = ? AND status = 'ACTIVE'")
                .bind(symbol)
                .fetch_one(self.db.pool())
                .await?;

        Ok(GatingWorldView {
            same_direction_last_created_at,
            opposite_last_created_at,
            global_last_created_at,
            hourly_total_count,
            hourly_per_direction_count,
            duplicate_candidates,
            opposite_active_count,
            total_active_count,
            direction_active_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reng_types::Direction;
    use rust_decimal_macros::dec;

    fn sample(id: &str) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            symbol: "ETH-PERP".into(),
            direction: Direction::Long,
            strategy_type: "momentum".into(),
            leverage: dec!(3),
            entry_price: dec!(2000),
            current_price: dec!(2000),
            take_profit_price: dec!(2100),
            stop_loss_price: dec!(1950),
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

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = RecommendationStore::new(&db);
        let rec = sample("r1");
        store.insert(&rec).await.unwrap();

        let fetched = store.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.symbol, "ETH-PERP");
        assert_eq!(fetched.entry_price, dec!(2000));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = RecommendationStore::new(&db);
        store.insert(&sample("r1")).await.unwrap();
        let err = store.insert(&sample("r1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn list_active_excludes_closed() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = RecommendationStore::new(&db);
        let mut closed = sample("r2");
        closed.status = RecommendationStatus::Closed;
        closed.closed_at = Some(Utc::now());
        closed.exit_price = Some(dec!(2100));
        closed.exit_label = Some(reng_types::ExitLabel::DynamicTakeProfit);
        closed.result = Some(reng_types::TradeResult::Win);
        closed.pnl_percent = Some(15.0);
        store.insert(&sample("r1")).await.unwrap();
        store.insert(&closed).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "r1");
    }

    #[tokio::test]
    async fn trim_history_keeps_most_recent() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = RecommendationStore::new(&db);
        for i in 0..5 {
            store.insert(&sample(&format!("r{i}"))).await.unwrap();
        }
        let deleted = store.trim_history(2).await.unwrap();
        assert_eq!(deleted, 3);
        let remaining = store
            .list(&RecommendationFilter {
                include_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn gating_world_view_reflects_active_exposure_and_duplicates() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = RecommendationStore::new(&db);
        store.insert(&sample("r1")).await.unwrap();

        let world = store
            .gating_world_view("ETH-PERP", Direction::Long, "momentum", 30)
            .await
            .unwrap();

        assert_eq!(world.total_active_count, 1);
        assert_eq!(world.direction_active_count, 1);
        assert_eq!(world.opposite_active_count, 0);
        assert_eq!(world.duplicate_candidates.len(), 1);
        assert_eq!(world.duplicate_candidates[0].0, "r1");
        assert!(world.same_direction_last_created_at.is_some());
        assert!(world.opposite_last_created_at.is_none());
    }
}
