//! Near-duplicate removal over merged candidates.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{CandidateSet, Document};

pub struct RedundancyFilter {
    embedder: Arc<dyn Embedder>,
    similarity_threshold: f32,
}

impl RedundancyFilter {
    pub fn new(embedder: Arc<dyn Embedder>, similarity_threshold: f32) -> Self {
        Self {
            embedder,
            similarity_threshold,
        }
    }

    /// Drop documents too similar to a higher-scored one.
    ///
    /// Documents that arrive without an embedding are embedded first. If
    /// that fails they are compared by exact content only.
    pub async fn dedupe(&self, candidates: CandidateSet) -> CandidateSet {
        let mut documents = candidates.into_inner();

        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_none())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| documents[i].content.clone()).collect();
            match self.embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == missing.len() => {
                    for (i, vec) in missing.into_iter().zip(vectors) {
                        documents[i].embedding = Some(vec);
                    }
                }
                Ok(vectors) => warn!(
                    expected = missing.len(),
                    got = vectors.len(),
                    "embedder returned wrong batch size; comparing by content"
                ),
                Err(err) => warn!(error = %err, "embedding candidates failed; comparing by content"),
            }
        }

        let before = documents.len();
        let kept = dedupe_by_similarity(documents, self.similarity_threshold);
        debug!(before, after = kept.len(), "redundancy filter");
        kept
    }
}

/// Stable greedy pass: sort by retrieval score descending, then keep each
/// document unless it is redundant with one already kept.
///
/// Two documents are redundant when both have embeddings whose cosine
/// similarity exceeds `threshold`, or when their trimmed contents match.
pub fn dedupe_by_similarity(mut documents: Vec<Document>, threshold: f32) -> CandidateSet {
    documents.sort_by(|a, b| b.retrieval_score.total_cmp(&a.retrieval_score));

    let mut kept: Vec<Document> = Vec::with_capacity(documents.len());
    for doc in documents {
        if !kept.iter().any(|k| is_redundant(k, &doc, threshold)) {
            kept.push(doc);
        }
    }
    CandidateSet::new(kept)
}

fn is_redundant(a: &Document, b: &Document, threshold: f32) -> bool {
    if a.content.trim() == b.content.trim() {
        return true;
    }
    match (&a.embedding, &b.embedding) {
        (Some(x), Some(y)) => cosine_similarity(x, y) > threshold,
        _ => false,
    }
}
