//! Result cache database
//!
//! Finished scans are cached in a SQLite file so a collection can be re-ranked
//! without fetching it again.

pub mod scan_results;

pub use scan_results::{MemoryRunStore, RunStore, SqliteRunStore};

use rarity_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the cache database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the cache tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_results (
            collection_key TEXT PRIMARY KEY,
            result TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0,
            stored_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (scan_results)");

    Ok(())
}
