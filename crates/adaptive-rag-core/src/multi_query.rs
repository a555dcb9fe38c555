//! Multi-query expansion.
//!
//! One user question becomes several search phrasings so retrieval can
//! reach documents a single embedding would miss. The original question
//! is always variant 0; expansion failures degrade to just the original.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::llm_error_label;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, Task};
use crate::models::QueryVariant;
use crate::prompts;

pub struct MultiQueryGenerator {
    llm: Arc<dyn LanguageModel>,
    variant_count: usize,
}

impl MultiQueryGenerator {
    /// `variant_count` is the total number of variants including the
    /// original. Values below 1 are treated as 1.
    pub fn new(llm: Arc<dyn LanguageModel>, variant_count: usize) -> Self {
        Self {
            llm,
            variant_count: variant_count.max(1),
        }
    }

    pub async fn expand(&self, query: &str) -> Vec<QueryVariant> {
        let original = QueryVariant {
            text: query.to_string(),
            source_query: query.to_string(),
            rank_hint: 0,
        };
        if self.variant_count == 1 {
            return vec![original];
        }

        let alternatives = self.variant_count - 1;
        let request = CompletionRequest::new(
            Task::ExpandQuery,
            vec![
                ChatMessage::system(prompts::MULTI_QUERY_SYSTEM),
                ChatMessage::user(prompts::multi_query_user(query, alternatives)),
            ],
        );

        let raw = match self.llm.complete(&request).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    error = %err,
                    kind = llm_error_label(&err),
                    "query expansion failed; using original query only"
                );
                return vec![original];
            }
        };

        let mut variants = vec![original];
        for line in parse_variant_lines(&raw, query, alternatives) {
            let rank_hint = variants.len();
            variants.push(QueryVariant {
                text: line,
                source_query: query.to_string(),
                rank_hint,
            });
        }
        debug!(count = variants.len(), "expanded query");
        variants
    }
}

/// Extract up to `limit` alternative queries from model output.
///
/// Strips list markers (`1.`, `2)`, `-`, `*`) and surrounding quotes,
/// drops blanks and case-insensitive duplicates of the original or of
/// each other.
pub fn parse_variant_lines(raw: &str, original: &str, limit: usize) -> Vec<String> {
    let mut seen = vec![original.trim().to_lowercase()];
    let mut out = Vec::new();
    for line in raw.lines() {
        if out.len() >= limit {
            break;
        }
        let cleaned = strip_list_marker(line.trim())
            .trim_matches(|c: char| c == '"' || c == '\'')
            .trim();
        if cleaned.is_empty() {
            continue;
        }
        let key = cleaned.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(cleaned.to_string());
    }
    out
}

fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return rest;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}
