//! SQLite-backed [`ConversationStore`].
//!
//! Turns are ordered by a per-thread `seq` column. `append` computes the
//! next `seq` and inserts inside one transaction, so two appends can never
//! claim the same position.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use adaptive_rag_core::conversation::ConversationStore;
use adaptive_rag_core::{ConversationState, Route, Turn};

#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let created_at: Option<i64> =
            sqlx::query_scalar("SELECT created_at FROM conversations WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(created_at) = created_at else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT query, response, path_taken, citations_json, created_at
            FROM turns
            WHERE thread_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in &rows {
            let path: String = row.get("path_taken");
            let path_taken = Route::parse(&path)
                .with_context(|| format!("unknown path_taken '{}' in thread {}", path, thread_id))?;
            let citations_json: String = row.get("citations_json");
            let citations: Vec<String> = serde_json::from_str(&citations_json)
                .with_context(|| format!("corrupt citations in thread {}", thread_id))?;
            turns.push(Turn {
                query: row.get("query"),
                response: row.get("response"),
                path_taken,
                citations,
                timestamp: from_millis(row.get("created_at")),
            });
        }

        Ok(Some(ConversationState {
            thread_id: thread_id.to_string(),
            turns,
            created_at: from_millis(created_at),
        }))
    }

    async fn append(&self, thread_id: &str, turn: &Turn) -> Result<()> {
        let citations_json = serde_json::to_string(&turn.citations)?;
        let created_at = turn.timestamp.timestamp_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO conversations (thread_id, created_at) VALUES (?, ?)")
            .bind(thread_id)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

        let seq: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM turns WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO turns (thread_id, seq, query, response, path_taken, citations_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(thread_id)
        .bind(seq)
        .bind(&turn.query)
        .bind(&turn.response)
        .bind(turn.path_taken.as_str())
        .bind(&citations_json)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT thread_id FROM conversations ORDER BY thread_id ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> SqliteConversationStore {
        let pool = db::open(&tmp.path().join("arag.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        SqliteConversationStore::new(pool)
    }

    #[tokio::test]
    async fn test_unknown_thread_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(store.list_threads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_round_trips_in_order() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        store
            .append("t1", &Turn::new("hi", "hello", Route::General, vec![]))
            .await
            .unwrap();
        store
            .append(
                "t1",
                &Turn::new(
                    "refunds?",
                    "30 days",
                    Route::Retrieval,
                    vec!["policy/refunds.md".to_string()],
                ),
            )
            .await
            .unwrap();
        store
            .append("t0", &Turn::new("x", "y", Route::General, vec![]))
            .await
            .unwrap();

        let state = store.load("t1").await.unwrap().unwrap();
        assert_eq!(state.thread_id, "t1");
        assert_eq!(state.turns.len(), 2);
        assert_eq!(state.turns[0].query, "hi");
        assert_eq!(state.turns[1].path_taken, Route::Retrieval);
        assert_eq!(state.turns[1].citations, vec!["policy/refunds.md"]);

        assert_eq!(store.list_threads().await.unwrap(), vec!["t0", "t1"]);
    }

    #[tokio::test]
    async fn test_turns_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = store(&tmp).await;
            store
                .append("keep", &Turn::new("q", "a", Route::General, vec![]))
                .await
                .unwrap();
        }
        let reopened = store(&tmp).await;
        let state = reopened.load("keep").await.unwrap().unwrap();
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.turns[0].response, "a");
    }
}
