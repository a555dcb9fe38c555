//! Core data types that flow through one conversation turn.
//!
//! [`Turn`] and [`ConversationState`] are durable; everything else
//! ([`QueryVariant`], [`Document`], [`CandidateSet`], [`RouteDecision`])
//! lives only for the duration of a single turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::store::StoreHit;

/// The two processing paths a turn can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Answer from model knowledge and prior turns only.
    General,
    /// Answer grounded in documents from the vector store.
    Retrieval,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::General => "general",
            Route::Retrieval => "retrieval",
        }
    }

    /// Parse a route label, case-insensitively.
    ///
    /// `"retriever"` and `"vectorstore"` are accepted as aliases for
    /// [`Route::Retrieval`]; anything else is out of domain.
    pub fn parse(label: &str) -> Option<Route> {
        match label.trim().to_ascii_lowercase().as_str() {
            "general" => Some(Route::General),
            "retrieval" | "retriever" | "vectorstore" => Some(Route::Retrieval),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed question/answer exchange. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    pub response: String,
    pub path_taken: Route,
    /// Source references of the documents the answer was grounded in.
    /// Always empty on the general path.
    #[serde(default)]
    pub citations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        path_taken: Route,
        citations: Vec<String>,
    ) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            path_taken,
            citations,
            timestamp: Utc::now(),
        }
    }
}

/// All turns of one conversation thread, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Return the trailing `n` turns of a history.
pub fn recent_turns(turns: &[Turn], n: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(n)..]
}

/// One phrasing of the user's query used for retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVariant {
    pub text: String,
    pub source_query: String,
    /// Generation order; the original query is always `0`.
    pub rank_hint: usize,
}

/// A retrieved (or narrowed) document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub content: String,
    /// Opaque locator used for citation.
    pub source_reference: String,
    /// Similarity score reported by the vector store.
    pub retrieval_score: f64,
    /// Embedding used for redundancy comparison, when known.
    pub embedding: Option<Vec<f32>>,
    /// Source reference of the document this one was narrowed from.
    pub derived_from: Option<String>,
    /// Score assigned by the reranker, when it ran.
    pub relevance_score: Option<f64>,
}

impl Document {
    pub fn new(
        content: impl Into<String>,
        source_reference: impl Into<String>,
        retrieval_score: f64,
    ) -> Self {
        Self {
            content: content.into(),
            source_reference: source_reference.into(),
            retrieval_score,
            embedding: None,
            derived_from: None,
            relevance_score: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Build a new document holding a narrowed version of this one's content.
    ///
    /// The citation locator is preserved and `derived_from` points back at
    /// the original. The embedding is dropped since it described the old text.
    pub fn narrowed(&self, content: impl Into<String>) -> Document {
        Document {
            content: content.into(),
            source_reference: self.source_reference.clone(),
            retrieval_score: self.retrieval_score,
            embedding: None,
            derived_from: Some(
                self.derived_from
                    .clone()
                    .unwrap_or_else(|| self.source_reference.clone()),
            ),
            relevance_score: self.relevance_score,
        }
    }
}

impl From<StoreHit> for Document {
    fn from(hit: StoreHit) -> Self {
        Document {
            content: hit.content,
            source_reference: hit.source_reference,
            retrieval_score: hit.score,
            embedding: hit.embedding,
            derived_from: None,
            relevance_score: None,
        }
    }
}

/// Ordered documents for one retrieval-path turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet(Vec<Document>);

impl CandidateSet {
    pub fn new(documents: Vec<Document>) -> Self {
        Self(documents)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Document> {
        self.0
    }

    /// Distinct source references, in set order.
    pub fn source_references(&self) -> Vec<String> {
        let mut refs: Vec<String> = Vec::new();
        for doc in &self.0 {
            if !refs.contains(&doc.source_reference) {
                refs.push(doc.source_reference.clone());
            }
        }
        refs
    }
}

impl From<Vec<Document>> for CandidateSet {
    fn from(documents: Vec<Document>) -> Self {
        Self(documents)
    }
}

impl IntoIterator for CandidateSet {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The router's verdict for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub label: Route,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl RouteDecision {
    pub fn new(label: Route) -> Self {
        Self {
            label,
            confidence: None,
            rationale: None,
        }
    }

    /// The decision used whenever classification cannot be trusted.
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            label: Route::Retrieval,
            confidence: None,
            rationale: Some(reason.into()),
        }
    }
}

/// Caller-facing request for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    pub thread_id: String,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            thread_id: thread_id.into(),
        }
    }
}

/// Caller-facing result of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub thread_id: String,
    pub answer: String,
    pub path_taken: Route,
    pub citations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parse_aliases() {
        assert_eq!(Route::parse("general"), Some(Route::General));
        assert_eq!(Route::parse(" GENERAL "), Some(Route::General));
        assert_eq!(Route::parse("retriever"), Some(Route::Retrieval));
        assert_eq!(Route::parse("Retrieval"), Some(Route::Retrieval));
        assert_eq!(Route::parse("web_search"), None);
        assert_eq!(Route::parse(""), None);
    }

    #[test]
    fn test_route_serde_lowercase() {
        let json = serde_json::to_string(&Route::Retrieval).unwrap();
        assert_eq!(json, "\"retrieval\"");
        let back: Route = serde_json::from_str("\"general\"").unwrap();
        assert_eq!(back, Route::General);
    }

    #[test]
    fn test_narrowed_keeps_citation() {
        let original = Document::new("long text about policy", "policy.pdf#3", 0.7)
            .with_embedding(vec![1.0, 0.0]);
        let narrowed = original.narrowed("policy");
        assert_eq!(narrowed.source_reference, "policy.pdf#3");
        assert_eq!(narrowed.derived_from.as_deref(), Some("policy.pdf#3"));
        assert_eq!(narrowed.retrieval_score, 0.7);
        assert!(narrowed.embedding.is_none());
        assert_eq!(original.content, "long text about policy");
    }

    #[test]
    fn test_recent_turns() {
        let turns: Vec<Turn> = (0..5)
            .map(|i| Turn::new(format!("q{}", i), "a", Route::General, vec![]))
            .collect();
        let recent = recent_turns(&turns, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "q3");
        assert_eq!(recent_turns(&turns, 10).len(), 5);
        assert!(recent_turns(&turns, 0).is_empty());
    }

    #[test]
    fn test_source_references_distinct() {
        let set = CandidateSet::new(vec![
            Document::new("a", "doc-1", 0.9),
            Document::new("b", "doc-2", 0.8),
            Document::new("c", "doc-1", 0.7),
        ]);
        assert_eq!(set.source_references(), vec!["doc-1", "doc-2"]);
    }
}
