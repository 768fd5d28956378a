use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use reng_types::{
    decision_chain::{Decision, DecisionStage},
    DecisionChain, DecisionStep, EngineError,
};
use tokio::sync::Mutex;

use crate::db::Db;
use crate::rows::{DecisionChainRow, DecisionStepRow};

/// Serializes chain/step writes so concurrent `add_step` calls never race
/// on sequence assignment, the same single global lock the teacher's
/// audit-log writer holds around its read-prev + insert — without the
/// hash-chaining, which this store has no tamper-evidence need for.
static CHAIN_WRITE_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ChainFilter {
    pub symbol: Option<String>,
    pub direction: Option<reng_types::Direction>,
    pub source: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub final_decision: Option<Decision>,
    pub limit: Option<i64>,
}

pub struct DecisionChainStore<'a> {
    db: &'a Db,
}

impl<'a> DecisionChainStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn start(
        &self,
        chain_id: &str,
        symbol: &str,
        direction: reng_types::Direction,
        source: &str,
    ) -> Result<(), EngineError> {
        let _guard = CHAIN_WRITE_LOCK.lock().await;
        sqlx::query(
            r#"
            INSERT INTO decision_chains (
                chain_id, symbol, direction, source, started_at, final_decision
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chain_id)
        .bind(symbol)
        .bind(direction)
        .bind(source)
        .bind(Utc::now().to_rfc3339())
        .bind(Decision::Pending)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Append a step, assigning the next `step_index` under the write lock
    /// so concurrent callers on distinct chains never interleave (spec
    /// §4.3.1). Rejects if the chain is already finalized.
    pub async fn add_step(
        &self,
        chain_id: &str,
        stage: DecisionStage,
        decision: Decision,
        reason: &str,
        details: serde_json::Value,
    ) -> Result<(), EngineError> {
        let _guard = CHAIN_WRITE_LOCK.lock().await;

        let finalized: Option<(Option<String>,)> =
            sqlx::query_as("SELECT finalized_at FROM decision_chains WHERE chain_id = ?")
                .bind(chain_id)
                .fetch_optional(self.db.pool())
                .await?;
        match finalized {
            None => return Err(EngineError::ChainNotFound(chain_id.to_string())),
            Some((Some(_),)) => {
                return Err(EngineError::Validation(format!(
                    "chain {chain_id} is already finalized"
                )))
            }
            Some((None,)) => {}
        }

        let (next_index,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(step_index) + 1, 0) FROM decision_steps WHERE chain_id = ?",
        )
        .bind(chain_id)
        .fetch_one(self.db.pool())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO decision_steps (chain_id, step_index, stage, decision, reason, details, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chain_id)
        .bind(next_index)
        .bind(stage)
        .bind(decision)
        .bind(reason)
        .bind(details.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn link_recommendation(
        &self,
        chain_id: &str,
        recommendation_id: &str,
    ) -> Result<(), EngineError> {
        sqlx::query("UPDATE decision_chains SET recommendation_id = ? WHERE chain_id = ?")
            .bind(recommendation_id)
            .bind(chain_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    pub async fn link_execution(&self, chain_id: &str, execution_id: &str) -> Result<(), EngineError> {
        sqlx::query("UPDATE decision_chains SET execution_id = ? WHERE chain_id = ?")
            .bind(execution_id)
            .bind(chain_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Finalize the chain: sets `finalized_at`, computes `decision_time_ms`,
    /// and derives `final_decision` from the recorded steps (spec §4.3).
    pub async fn finalize(&self, chain_id: &str) -> Result<DecisionChain, EngineError> {
        let _guard = CHAIN_WRITE_LOCK.lock().await;
        let chain = self
            .get_locked(chain_id)
            .await?
            .ok_or_else(|| EngineError::ChainNotFound(chain_id.to_string()))?;

        let (final_decision, abandoned_reason) = chain.derive_final_decision();
        let finalized_at = Utc::now();
        let decision_time_ms = (finalized_at - chain.started_at).num_milliseconds();

        sqlx::query(
            "UPDATE decision_chains SET finalized_at = ?, final_decision = ?, decision_time_ms = ? WHERE chain_id = ?",
        )
        .bind(finalized_at.to_rfc3339())
        .bind(final_decision)
        .bind(decision_time_ms)
        .bind(chain_id)
        .execute(self.db.pool())
        .await?;

        if let Some(reason) = abandoned_reason {
            let next_index = chain.steps.len() as i64;
            sqlx::query(
                r#"
                INSERT INTO decision_steps (chain_id, step_index, stage, decision, reason, details, timestamp)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chain_id)
            .bind(next_index)
            .bind(DecisionStage::ExecutionDecision)
            .bind(Decision::Rejected)
            .bind(reason)
            .bind(serde_json::json!({}).to_string())
            .bind(finalized_at.to_rfc3339())
            .execute(self.db.pool())
            .await?;
        }

        self.get_locked(chain_id)
            .await?
            .ok_or_else(|| EngineError::ChainNotFound(chain_id.to_string()))
    }

    pub async fn get(&self, chain_id: &str) -> Result<Option<DecisionChain>, EngineError> {
        self.get_locked(chain_id).await
    }

    async fn get_locked(&self, chain_id: &str) -> Result<Option<DecisionChain>, EngineError> {
        let row: Option<DecisionChainRow> =
            sqlx::query_as("SELECT * FROM decision_chains WHERE chain_id = ?")
                .bind(chain_id)
                .fetch_optional(self.db.pool())
                .await?;
        let Some(row) = row else { return Ok(None) };

        let step_rows: Vec<DecisionStepRow> = sqlx::query_as(
            "SELECT * FROM decision_steps WHERE chain_id = ? ORDER BY step_index",
        )
        .bind(chain_id)
        .fetch_all(self.db.pool())
        .await?;
        let steps = step_rows.into_iter().map(DecisionStepRow::into_domain).collect();

        Ok(Some(row.into_domain(steps)))
    }

    pub async fn list(&self, filter: &ChainFilter) -> Result<Vec<DecisionChain>, EngineError> {
        let mut sql = String::from("SELECT * FROM decision_chains WHERE 1 = 1");
        if filter.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if filter.direction.is_some() {
            sql.push_str(" AND direction = ?");
        }
        if filter.source.is_some() {
            sql.push_str(" AND source = ?");
        }
        if filter.start_date.is_some() {
            sql.push_str(" AND started_at >= ?");
        }
        if filter.end_date.is_some() {
            sql.push_str(" AND started_at <= ?");
        }
        if filter.final_decision.is_some() {
            sql.push_str(" AND final_decision = ?");
        }
        sql.push_str(" ORDER BY started_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, DecisionChainRow>(&sql);
        if let Some(symbol) = &filter.symbol {
            query = query.bind(symbol);
        }
        if let Some(direction) = filter.direction {
            query = query.bind(direction);
        }
        if let Some(source) = &filter.source {
            query = query.bind(source);
        }
        if let Some(start) = filter.start_date {
            query = query.bind(start.to_rfc3339());
        }
        if let Some(end) = filter.end_date {
            query = query.bind(end.to_rfc3339());
        }
        if let Some(final_decision) = filter.final_decision {
            query = query.bind(final_decision);
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(self.db.pool()).await?;
        let mut chains = Vec::with_capacity(rows.len());
        for row in rows {
            let step_rows: Vec<DecisionStepRow> = sqlx::query_as(
                "SELECT * FROM decision_steps WHERE chain_id = ? ORDER BY step_index",
            )
            .bind(&row.chain_id)
            .fetch_all(self.db.pool())
            .await?;
            let steps = step_rows.into_iter().map(DecisionStepRow::into_domain).collect();
            chains.push(row.into_domain(steps));
        }
        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reng_types::Direction;

    #[tokio::test]
    async fn start_add_step_and_finalize_approved() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = DecisionChainStore::new(&db);
        store.start("c1", "ETH-PERP", Direction::Long, "AUTO").await.unwrap();

        store
            .add_step(
                "c1",
                DecisionStage::GatingCheck,
                Decision::Approved,
                "ok",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        store
            .add_step(
                "c1",
                DecisionStage::ExecutionDecision,
                Decision::Approved,
                "ADMITTED",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let chain = store.finalize("c1").await.unwrap();
        assert_eq!(chain.final_decision, Decision::Approved);
        assert!(chain.finalized_at.is_some());
        assert_eq!(chain.steps.len(), 2);
    }

    #[tokio::test]
    async fn cannot_add_step_after_finalize() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = DecisionChainStore::new(&db);
        store.start("c1", "ETH-PERP", Direction::Long, "AUTO").await.unwrap();
        store.finalize("c1").await.unwrap();

        let err = store
            .add_step(
                "c1",
                DecisionStage::ExecutionDecision,
                Decision::Approved,
                "late",
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn abandoned_when_finalized_with_no_terminal_step() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = DecisionChainStore::new(&db);
        store.start("c1", "ETH-PERP", Direction::Long, "AUTO").await.unwrap();
        let chain = store.finalize("c1").await.unwrap();
        assert_eq!(chain.final_decision, Decision::Rejected);
        assert_eq!(chain.steps.last().unwrap().reason, "ABANDONED");
    }
}
