//! Contextual compression: narrow each candidate to the passages that
//! bear on the query.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{llm_error_label, PipelineError};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, Task};
use crate::models::{CandidateSet, Document};
use crate::prompts;

#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub enabled: bool,
    /// Upper bound on the characters kept per document.
    pub max_chars: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 1200,
        }
    }
}

pub struct ContextualCompressor {
    llm: Arc<dyn LanguageModel>,
    config: CompressorConfig,
}

impl ContextualCompressor {
    pub fn new(llm: Arc<dyn LanguageModel>, config: CompressorConfig) -> Self {
        Self { llm, config }
    }

    /// Compress every candidate concurrently. Survivors keep input order.
    pub async fn compress(&self, candidates: CandidateSet, query: &str) -> CandidateSet {
        if !self.config.enabled {
            let docs = candidates
                .into_iter()
                .map(|d| {
                    if d.content.chars().count() > self.config.max_chars {
                        let narrowed = truncate_chars(&d.content, self.config.max_chars).to_string();
                        d.narrowed(narrowed)
                    } else {
                        d
                    }
                })
                .collect::<Vec<_>>();
            return CandidateSet::new(docs);
        }

        let before = candidates.len();
        let results = join_all(candidates.iter().map(|d| self.compress_one(d, query))).await;

        let mut kept = Vec::with_capacity(before);
        for result in results {
            match result {
                Ok(Some(doc)) => kept.push(doc),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "dropping document"),
            }
        }
        debug!(before, after = kept.len(), "compressed candidates");
        CandidateSet::new(kept)
    }

    async fn compress_one(
        &self,
        document: &Document,
        query: &str,
    ) -> Result<Option<Document>, PipelineError> {
        let request = CompletionRequest::new(
            Task::Compress,
            vec![
                ChatMessage::system(prompts::COMPRESS_SYSTEM),
                ChatMessage::user(prompts::compress_user(query, document)),
            ],
        )
        .with_temperature(0.0);

        let raw = self.llm.complete(&request).await.map_err(|e| {
            PipelineError::CompressionFailure {
                source_reference: document.source_reference.clone(),
                reason: format!("{} ({})", e, llm_error_label(&e)),
            }
        })?;

        let extracted = raw.trim();
        if extracted.is_empty() || extracted.contains(prompts::NO_RELEVANT_CONTENT) {
            debug!(source = %document.source_reference, "no relevant content");
            return Ok(None);
        }

        let base = if extracted.chars().count() > document.content.chars().count() {
            document.content.as_str()
        } else {
            extracted
        };
        Ok(Some(
            document.narrowed(truncate_chars(base, self.config.max_chars)),
        ))
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
