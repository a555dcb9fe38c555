//! In-memory [`VectorStore`] implementation for tests and embedding hosts.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;

use super::{StoreHit, VectorStore};

struct StoredEntry {
    source_reference: String,
    content: String,
    vector: Vec<f32>,
}

/// In-memory vector store.
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<StoredEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace the entry for `source_reference`.
    pub fn insert(
        &self,
        source_reference: impl Into<String>,
        content: impl Into<String>,
        vector: Vec<f32>,
    ) -> Result<()> {
        let source_reference = source_reference.into();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        entries.retain(|e| e.source_reference != source_reference);
        entries.push(StoredEntry {
            source_reference,
            content: content.into(),
            vector,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<StoreHit>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        let mut hits: Vec<StoreHit> = entries
            .iter()
            .map(|e| StoreHit {
                content: e.content.clone(),
                source_reference: e.source_reference.clone(),
                score: cosine_similarity(query_vec, &e.vector) as f64,
                embedding: Some(e.vector.clone()),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}
