use std::str::FromStr;

use chrono::Utc;
use reng_types::EngineError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// One additive migration, applied in ascending `version` order exactly
/// once each, tracked in `schema_migrations`.
struct Migration {
    version: i64,
    statements: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    statements: include_str!("../schema.sql"),
}];

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| EngineError::internal(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        let applied: Vec<(i64,)> = sqlx::query_as("SELECT version FROM schema_migrations")
            .fetch_all(&self.pool)
            .await?;
        let applied: std::collections::HashSet<i64> = applied.into_iter().map(|(v,)| v).collect();

        for migration in MIGRATIONS {
            if applied.contains(&migration.version) {
                continue;
            }
            for statement in migration.statements.split(';') {
                let stmt = statement.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(&self.pool).await?;
                }
            }
            sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
                .bind(migration.version)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_and_runs_migrations_once() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        assert!(db.pool().acquire().await.is_ok());

        let rows: Vec<(i64,)> = sqlx::query_as("SELECT version FROM schema_migrations")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), MIGRATIONS.len());
    }
}
