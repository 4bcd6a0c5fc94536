//! Stored scan results keyed by collection

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rarity_common::Result;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::models::RunResult;

/// Persistent store for finished runs.
///
/// Accessed only before a run starts (load) and after it completes (store).
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<RunResult>>;

    async fn store(&self, key: &str, result: &RunResult) -> Result<()>;

    /// Remove every stored result
    async fn clear(&self) -> Result<()>;
}

/// SQLite-backed store; the run result is kept as one JSON document per key
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Keys with a stored result, most recent first
    pub async fn keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT collection_key FROM scan_results ORDER BY stored_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn load(&self, key: &str) -> Result<Option<RunResult>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT result FROM scan_results WHERE collection_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, result: &RunResult) -> Result<()> {
        let json = serde_json::to_string(result)?;

        sqlx::query(
            r#"
            INSERT INTO scan_results (collection_key, result, item_count, stored_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection_key) DO UPDATE SET
                result = excluded.result,
                item_count = excluded.item_count,
                stored_at = excluded.stored_at
            "#,
        )
        .bind(key)
        .bind(json)
        .bind(result.items.len() as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(key = %key, items = result.items.len(), "Stored scan result");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM scan_results")
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::info!(deleted, "Cleared stored scan results");
        Ok(())
    }
}

/// In-process store for tests and cache-less runs
#[derive(Default)]
pub struct MemoryRunStore {
    results: Mutex<HashMap<String, RunResult>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.lock().await.is_empty()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn load(&self, key: &str) -> Result<Option<RunResult>> {
        Ok(self.results.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, result: &RunResult) -> Result<()> {
        self.results
            .lock()
            .await
            .insert(key.to_string(), result.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.results.lock().await.clear();
        Ok(())
    }
}
