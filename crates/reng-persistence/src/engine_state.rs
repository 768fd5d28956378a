use chrono::Utc;
use reng_types::EngineError;

use crate::db::Db;

/// Generic key-value state, the same `agent_state`-style table the
/// teacher's `state_manager` uses to persist metrics across restarts.
pub struct EngineStateStore<'a> {
    db: &'a Db,
}

impl<'a> EngineStateStore<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub async fn save(&self, key: &str, value: &str) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO engine_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    pub async fn load(&self, key: &str) -> Result<Option<String>, EngineError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM engine_state WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|(v,)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        let store = EngineStateStore::new(&db);
        store.save("k", "v1").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some("v1".to_string()));
        store.save("k", "v2").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some("v2".to_string()));
    }
}
