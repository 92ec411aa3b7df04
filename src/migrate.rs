//! Schema for the durable content store.
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `content_items` | one row per ingested item, keyed by item id |
//! | `content_fts` | FTS5 index over item text, ranked with `bm25` |
//!
//! Every statement is idempotent, so the schema is applied on each open.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and apply the schema (`recall init`).
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(&config.content_store.path).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            app_id TEXT NOT NULL,
            source_type TEXT NOT NULL,
            link TEXT,
            created_at INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='content_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE content_fts USING fts5(
                item_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_user_created ON content_items(user_id, created_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_app_source ON content_items(app_id, source_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
