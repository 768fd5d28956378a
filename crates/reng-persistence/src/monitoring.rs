use chrono::{DateTime, Utc};
use reng_types::EngineError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// A monitoring row written on every gating rejection (spec §3 `GatingSnapshot`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct GatingSnapshot {
    pub id: String,
    pub symbol: String,
    pub check_time: DateTime<Utc>,
    pub current_price: Decimal,
    pub detail: serde_json::Value,
}

use crate::db::Db;

pub struct MonitoringStore<'a> {
    db: &'a Db,
}

impl<'a> MonitoringStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn save_snapshot(&self, snapshot: &GatingSnapshot) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO gating_snapshots (id, symbol, check_time, current_price, detail) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.symbol)
        .bind(snapshot.check_time.to_rfc3339())
        .bind(snapshot.current_price.to_f64().unwrap_or(0.0))
        .bind(snapshot.detail.to_string())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn list_recent(&self, symbol: &str, limit: i64) -> Result<Vec<GatingSnapshot>, EngineError> {
        let rows: Vec<(String, String, String, f64, String)> = sqlx::query_as(
            "SELECT id, symbol, check_time, current_price, detail FROM gating_snapshots WHERE symbol = ? ORDER BY check_time DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, symbol, check_time, current_price, detail)| GatingSnapshot {
                id,
                symbol,
                check_time: DateTime::parse_from_rfc3339(&check_time)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                current_price: Decimal::from_f64(current_price).unwrap_or_default(),
                detail: serde_json::from_str(&detail).unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn saves_and_lists_snapshot() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = MonitoringStore::new(&db);
        store
            .save_snapshot(&GatingSnapshot {
                id: reng_types::new_id("gate"),
                symbol: "ETH-PERP".into(),
                check_time: Utc::now(),
                current_price: dec!(2000),
                detail: serde_json::json!({"reason": "COOLDOWN_GLOBAL"}),
            })
            .await
            .unwrap();

        let rows = store.list_recent("ETH-PERP", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].detail["reason"], "COOLDOWN_GLOBAL");
    }
}
