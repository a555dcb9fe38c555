use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per conversation thread
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            thread_id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Turns, ordered per thread by seq
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turns (
            thread_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            query TEXT NOT NULL,
            response TEXT NOT NULL,
            path_taken TEXT NOT NULL,
            citations_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (thread_id, seq),
            FOREIGN KEY (thread_id) REFERENCES conversations(thread_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedded documents; populated by an external indexer
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_reference TEXT NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_source_reference ON chunks(source_reference)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
