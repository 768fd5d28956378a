use chrono::{DateTime, Utc};
use reng_types::{slippage::AlertSeverity, EngineError, SlippageAlert, SlippageRecord, SlippageThreshold};

use crate::db::Db;

pub struct SlippageStore<'a> {
    db: &'a Db,
}

impl<'a> SlippageStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn insert_record(&self, record: &SlippageRecord) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO slippage_records (id, symbol, execution_id, slippage_bps, latency_ms, recorded_at, tag) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.symbol)
        .bind(&record.execution_id)
        .bind(record.slippage_bps)
        .bind(record.latency_ms)
        .bind(record.recorded_at.to_rfc3339())
        .bind(&record.tag)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn list_records(&self, symbol: &str, limit: i64) -> Result<Vec<SlippageRecord>, EngineError> {
        let rows: Vec<(String, String, String, f64, i64, String, Option<String>)> = sqlx::query_as(
            "SELECT id, symbol, execution_id, slippage_bps, latency_ms, recorded_at, tag FROM slippage_records WHERE symbol = ? ORDER BY recorded_at DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, symbol, execution_id, slippage_bps, latency_ms, recorded_at, tag)| SlippageRecord {
                id,
                symbol,
                execution_id,
                slippage_bps,
                latency_ms,
                recorded_at: parse_dt(&recorded_at),
                tag,
            })
            .collect())
    }

    pub async fn upsert_threshold(&self, threshold: &SlippageThreshold) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO slippage_thresholds (symbol, threshold_bps, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET threshold_bps = excluded.threshold_bps, updated_at = excluded.updated_at
            "#,
        )
        .bind(&threshold.symbol)
        .bind(threshold.threshold_bps)
        .bind(threshold.updated_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn get_threshold(&self, symbol: &str) -> Result<Option<SlippageThreshold>, EngineError> {
        let row: Option<(String, f64, String)> = sqlx::query_as(
            "SELECT symbol, threshold_bps, updated_at FROM slippage_thresholds WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|(symbol, threshold_bps, updated_at)| SlippageThreshold {
            symbol,
            threshold_bps,
            updated_at: parse_dt(&updated_at),
        }))
    }

    pub async fn insert_alert(&self, alert: &SlippageAlert) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO slippage_alerts (id, symbol, severity, previous_threshold_bps, new_threshold_bps, message, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.id)
        .bind(&alert.symbol)
        .bind(alert.severity)
        .bind(alert.previous_threshold_bps)
        .bind(alert.new_threshold_bps)
        .bind(&alert.message)
        .bind(alert.created_at.to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Every symbol with at least one recorded slippage observation, the
    /// set the threshold maintainer sweeps each tick (spec §4.9).
    pub async fn distinct_symbols(&self) -> Result<Vec<String>, EngineError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT symbol FROM slippage_records")
                .fetch_all(self.db.pool())
                .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    pub async fn list_alerts(&self, symbol: &str, limit: i64) -> Result<Vec<SlippageAlert>, EngineError> {
        let rows: Vec<(String, String, AlertSeverity, f64, f64, String, String)> = sqlx::query_as(
            "SELECT id, symbol, severity, previous_threshold_bps, new_threshold_bps, message, created_at FROM slippage_alerts WHERE symbol = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, symbol, severity, previous_threshold_bps, new_threshold_bps, message, created_at)| SlippageAlert {
                id,
                symbol,
                severity,
                previous_threshold_bps,
                new_threshold_bps,
                message,
                created_at: parse_dt(&created_at),
            })
            .collect())
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn threshold_upsert_replaces_existing() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = SlippageStore::new(&db);
        store
            .upsert_threshold(&SlippageThreshold {
                symbol: "ETH-PERP".into(),
                threshold_bps: 10.0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .upsert_threshold(&SlippageThreshold {
                symbol: "ETH-PERP".into(),
                threshold_bps: 15.0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let threshold = store.get_threshold("ETH-PERP").await.unwrap().unwrap();
        assert_eq!(threshold.threshold_bps, 15.0);
    }
}
