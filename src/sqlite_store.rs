//! SQLite-backed [`VectorStore`].
//!
//! Reads the `chunks` table, which an external indexer fills with
//! `(id, source_reference, content, embedding)` rows. Search loads every
//! vector and ranks by cosine similarity in Rust; there is no ANN index.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use adaptive_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use adaptive_rag_core::store::{StoreHit, VectorStore};

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace one chunk.
    pub async fn upsert_chunk(
        &self,
        id: &str,
        source_reference: &str,
        content: &str,
        embedding: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_reference, content, embedding)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_reference = excluded.source_reference,
                content = excluded.content,
                embedding = excluded.embedding
            "#,
        )
        .bind(id)
        .bind(source_reference)
        .bind(content)
        .bind(vec_to_blob(embedding))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<StoreHit>> {
        let rows = sqlx::query("SELECT source_reference, content, embedding FROM chunks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut skipped = 0usize;
        let mut hits: Vec<StoreHit> = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                if vec.len() != query_vec.len() {
                    skipped += 1;
                    return None;
                }
                let score = cosine_similarity(query_vec, &vec) as f64;
                Some(StoreHit {
                    content: row.get("content"),
                    source_reference: row.get("source_reference"),
                    score,
                    embedding: Some(vec),
                })
            })
            .collect();

        if skipped > 0 {
            debug!(skipped, dims = query_vec.len(), "chunks with mismatched dimensions ignored");
        }

        // Sort by similarity desc and take top K
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteVectorStore) {
        let tmp = TempDir::new().unwrap();
        let pool = db::open(&tmp.path().join("data/arag.sqlite")).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteVectorStore::new(pool))
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_hits() {
        let (_tmp, store) = store().await;
        assert!(store.similarity_search(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine_and_truncates() {
        let (_tmp, store) = store().await;
        store.upsert_chunk("a", "a.md", "alpha", &[1.0, 0.0]).await.unwrap();
        store.upsert_chunk("b", "b.md", "beta", &[0.7, 0.7]).await.unwrap();
        store.upsert_chunk("c", "c.md", "gamma", &[0.0, 1.0]).await.unwrap();

        let hits = store.similarity_search(&[1.0, 0.1], 2).await.unwrap();
        let refs: Vec<&str> = hits.iter().map(|h| h.source_reference.as_str()).collect();
        assert_eq!(refs, vec!["a.md", "b.md"]);
        assert!(hits[0].score > hits[1].score);
        assert_eq!(hits[0].embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_mismatched_dims_are_skipped() {
        let (_tmp, store) = store().await;
        store.upsert_chunk("a", "a.md", "old", &[1.0, 0.0]).await.unwrap();
        store.upsert_chunk("a", "a.md", "new", &[1.0, 0.0]).await.unwrap();
        store.upsert_chunk("z", "z.md", "3d", &[1.0, 0.0, 0.0]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store.similarity_search(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "new");
    }
}
