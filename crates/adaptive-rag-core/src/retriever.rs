//! Candidate retrieval: fan every query variant out to the vector store
//! concurrently and merge the hits.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::models::{CandidateSet, Document, QueryVariant};
use crate::store::{StoreHit, VectorStore};

pub struct CandidateRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl CandidateRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Retrieve up to `k` documents per variant.
    ///
    /// Individual variant failures are logged and skipped. Only when the
    /// embedder fails or every variant search fails is the result an error.
    pub async fn retrieve(
        &self,
        variants: &[QueryVariant],
        k: usize,
    ) -> Result<CandidateSet, PipelineError> {
        if variants.is_empty() || k == 0 {
            return Ok(CandidateSet::empty());
        }

        let texts: Vec<String> = variants.iter().map(|v| v.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("embedding failed: {:#}", e)))?;
        if vectors.len() != variants.len() {
            return Err(PipelineError::RetrievalUnavailable(format!(
                "embedder returned {} vectors for {} queries",
                vectors.len(),
                variants.len()
            )));
        }

        let searches = vectors
            .iter()
            .map(|vec| self.store.similarity_search(vec, k));
        let results = join_all(searches).await;

        let mut per_variant = Vec::with_capacity(results.len());
        let mut last_error = None;
        for (variant, result) in variants.iter().zip(results) {
            match result {
                Ok(hits) => {
                    debug!(rank_hint = variant.rank_hint, hits = hits.len(), "variant search done");
                    per_variant.push(hits);
                }
                Err(err) => {
                    warn!(query = %variant.text, error = %err, "variant search failed");
                    last_error = Some(err);
                }
            }
        }

        if per_variant.is_empty() {
            let reason = last_error
                .map(|e| format!("{:#}", e))
                .unwrap_or_else(|| "no searches completed".to_string());
            return Err(PipelineError::RetrievalUnavailable(reason));
        }

        Ok(merge_by_max_score(per_variant))
    }
}

/// Merge per-variant hit lists into one candidate set.
///
/// Hits with identical source reference and content collapse into one
/// document carrying the highest score seen. The result is sorted by score
/// descending; ties keep first-seen order (variant order, then hit order).
pub fn merge_by_max_score(per_variant: Vec<Vec<StoreHit>>) -> CandidateSet {
    let mut merged: Vec<Document> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for hit in per_variant.into_iter().flatten() {
        let key = (hit.source_reference.clone(), hit.content.clone());
        match index.get(&key) {
            Some(&i) => {
                let existing = &mut merged[i];
                if hit.score > existing.retrieval_score {
                    existing.retrieval_score = hit.score;
                }
                if existing.embedding.is_none() {
                    existing.embedding = hit.embedding;
                }
            }
            None => {
                index.insert(key, merged.len());
                merged.push(Document::from(hit));
            }
        }
    }

    merged.sort_by(|a, b| b.retrieval_score.total_cmp(&a.retrieval_score));
    CandidateSet::new(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryVectorStore;
    use crate::testing::{FailingEmbedder, HashEmbedder};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    fn hit(reference: &str, content: &str, score: f64) -> StoreHit {
        StoreHit {
            content: content.to_string(),
            source_reference: reference.to_string(),
            score,
            embedding: None,
        }
    }

    fn variant(text: &str, rank: usize) -> QueryVariant {
        QueryVariant {
            text: text.to_string(),
            source_query: "q".to_string(),
            rank_hint: rank,
        }
    }

    #[test]
    fn test_merge_keeps_max_score() {
        let merged = merge_by_max_score(vec![
            vec![hit("a", "alpha", 0.5), hit("b", "beta", 0.4)],
            vec![hit("a", "alpha", 0.9), hit("c", "gamma", 0.4)],
        ]);
        let refs: Vec<&str> = merged.iter().map(|d| d.source_reference.as_str()).collect();
        assert_eq!(refs, vec!["a", "b", "c"]);
        assert_eq!(merged.as_slice()[0].retrieval_score, 0.9);
    }

    #[test]
    fn test_merge_same_reference_different_content_kept() {
        let merged = merge_by_max_score(vec![vec![hit("a", "one", 0.5), hit("a", "two", 0.5)]]);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_unions_variants() {
        let embedder = Arc::new(HashEmbedder::new(64));
        let store = Arc::new(InMemoryVectorStore::new());
        for (r, text) in [
            ("refunds.md", "refund policy thirty days"),
            ("shipping.md", "shipping takes five days"),
            ("careers.md", "we are hiring engineers"),
        ] {
            store.insert(r, text, embedder.vector(text)).unwrap();
        }

        let retriever = CandidateRetriever::new(embedder, store);
        let set = retriever
            .retrieve(&[variant("refund policy", 0), variant("shipping days", 1)], 1)
            .await
            .unwrap();
        let refs = set.source_references();
        assert_eq!(set.len(), 2);
        assert!(refs.contains(&"refunds.md".to_string()));
        assert!(refs.contains(&"shipping.md".to_string()));
    }

    #[tokio::test]
    async fn test_embedder_failure_is_retrieval_unavailable() {
        let retriever = CandidateRetriever::new(
            Arc::new(FailingEmbedder),
            Arc::new(InMemoryVectorStore::new()),
        );
        let err = retriever.retrieve(&[variant("q", 0)], 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::RetrievalUnavailable(_)));
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn similarity_search(&self, _query_vec: &[f32], _k: usize) -> Result<Vec<StoreHit>> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_all_searches_failing_is_error() {
        let retriever = CandidateRetriever::new(Arc::new(HashEmbedder::new(8)), Arc::new(DownStore));
        let err = retriever
            .retrieve(&[variant("a", 0), variant("b", 1)], 5)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_set() {
        let retriever = CandidateRetriever::new(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(InMemoryVectorStore::new()),
        );
        let set = retriever.retrieve(&[variant("a", 0)], 5).await.unwrap();
        assert!(set.is_empty());
    }
}
