//! Relevance reranking.
//!
//! A [`RelevanceScorer`] judges each (query, document) pair jointly, the
//! way a cross-encoder does, and the [`Reranker`] reorders and truncates the
//! candidate set by that judgement. If the scorer fails the retrieval-score
//! order is kept.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, Task};
use crate::models::{CandidateSet, Document};
use crate::prompts;

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per document, in input order. Higher is more relevant.
    async fn score(&self, query: &str, documents: &[Document]) -> Result<Vec<f64>>;
}

/// Scores documents by asking the language model for a 0–10 grade.
pub struct LlmRelevanceScorer {
    llm: Arc<dyn LanguageModel>,
}

impl LlmRelevanceScorer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    async fn grade(&self, query: &str, document: &Document) -> Result<f64> {
        let request = CompletionRequest::new(
            Task::ScoreRelevance,
            vec![
                ChatMessage::system(prompts::RERANK_SYSTEM),
                ChatMessage::user(prompts::rerank_user(query, document)),
            ],
        )
        .with_temperature(0.0);
        let raw = self.llm.complete(&request).await?;
        parse_grade(&raw)
            .ok_or_else(|| anyhow!("unparseable relevance grade for {}: {:?}", document.source_reference, raw))
    }
}

#[async_trait]
impl RelevanceScorer for LlmRelevanceScorer {
    async fn score(&self, query: &str, documents: &[Document]) -> Result<Vec<f64>> {
        try_join_all(documents.iter().map(|d| self.grade(query, d))).await
    }
}

/// Read the first number in `raw` as a 0–10 grade, normalized to `[0, 1]`.
pub fn parse_grade(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let number: String = raw[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = number.trim_end_matches('.').parse().ok()?;
    Some(value.clamp(0.0, 10.0) / 10.0)
}

pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    pub async fn rerank(&self, candidates: CandidateSet, query: &str, top_k: usize) -> CandidateSet {
        if candidates.is_empty() {
            return candidates;
        }

        let scored = match self.scorer.score(query, candidates.as_slice()).await {
            Ok(scores) if scores.len() == candidates.len() => Ok(scores),
            Ok(scores) => Err(PipelineError::RerankFailure(format!(
                "scorer returned {} scores for {} documents",
                scores.len(),
                candidates.len()
            ))),
            Err(err) => Err(PipelineError::RerankFailure(format!("{:#}", err))),
        };

        let mut documents = candidates.into_inner();
        match scored {
            Ok(scores) => {
                for (doc, score) in documents.iter_mut().zip(scores) {
                    doc.relevance_score = Some(score);
                }
                order_by_relevance(&mut documents);
            }
            Err(err) => {
                warn!(error = %err, "keeping retrieval order");
                documents.sort_by(|a, b| b.retrieval_score.total_cmp(&a.retrieval_score));
            }
        }

        documents.truncate(top_k);
        debug!(kept = documents.len(), top_k, "reranked");
        CandidateSet::new(documents)
    }
}

/// Sort by relevance desc, then retrieval score desc. Stable, so remaining
/// ties keep insertion order.
pub fn order_by_relevance(documents: &mut [Document]) {
    documents.sort_by(|a, b| {
        let ra = a.relevance_score.unwrap_or(f64::MIN);
        let rb = b.relevance_score.unwrap_or(f64::MIN);
        rb.total_cmp(&ra)
            .then_with(|| b.retrieval_score.total_cmp(&a.retrieval_score))
    });
}
