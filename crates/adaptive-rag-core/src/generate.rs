//! Answer generation for both routes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{llm_error_label, PipelineError};
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel, Task};
use crate::models::{recent_turns, CandidateSet, Turn};
use crate::prompts;

/// A grounded answer and the documents it cites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedAnswer {
    pub text: String,
    pub citations: Vec<String>,
}

pub struct AnswerGenerator {
    llm: Arc<dyn LanguageModel>,
    history_turns: usize,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>, history_turns: usize) -> Self {
        Self { llm, history_turns }
    }

    /// Answer from model knowledge and the recent conversation only.
    pub async fn answer_general(&self, query: &str, context: &[Turn]) -> Result<String, PipelineError> {
        let mut messages = vec![ChatMessage::system(prompts::GENERAL_SYSTEM)];
        messages.extend(prompts::history_messages(recent_turns(context, self.history_turns)));
        messages.push(ChatMessage::user(query));
        self.complete(CompletionRequest::new(Task::AnswerGeneral, messages))
            .await
    }

    /// Answer grounded in `documents`, citing their source references.
    ///
    /// An empty set short-circuits to [`prompts::INSUFFICIENT_CONTEXT_ANSWER`]
    /// without calling the model.
    pub async fn answer_from_documents(
        &self,
        query: &str,
        documents: &CandidateSet,
        context: &[Turn],
    ) -> Result<GeneratedAnswer, PipelineError> {
        if documents.is_empty() {
            debug!("no documents to ground on");
            return Ok(GeneratedAnswer {
                text: prompts::INSUFFICIENT_CONTEXT_ANSWER.to_string(),
                citations: Vec::new(),
            });
        }

        let mut messages = vec![ChatMessage::system(prompts::GROUNDED_SYSTEM)];
        messages.extend(prompts::history_messages(recent_turns(context, self.history_turns)));
        messages.push(ChatMessage::user(prompts::grounded_user(
            query,
            documents.as_slice(),
        )));
        let text = self
            .complete(CompletionRequest::new(Task::AnswerGrounded, messages))
            .await?;
        let citations = cited_references(&text, documents);
        Ok(GeneratedAnswer { text, citations })
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let raw = self.llm.complete(&request).await.map_err(|e| {
            warn!(task = request.task.as_str(), kind = llm_error_label(&e), error = %e, "generation failed");
            PipelineError::from_generation(e)
        })?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(PipelineError::Generation("model returned an empty answer".to_string()));
        }
        Ok(text.to_string())
    }
}

/// Opens an inline citation marker in a grounded answer.
const CITATION_MARKER: &str = "[source:";

/// References cited through `[source: …]` markers that name a document in
/// the set exactly, in set order. Unknown references are ignored and an
/// answer without markers cites nothing.
pub fn cited_references(text: &str, documents: &CandidateSet) -> Vec<String> {
    let marked = citation_markers(text);
    documents
        .source_references()
        .into_iter()
        .filter(|r| marked.contains(&r.as_str()))
        .collect()
}

/// Every reference named in a `[source: …]` marker. A marker may list
/// several references separated by `;`.
fn citation_markers(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(CITATION_MARKER) {
        let after = &rest[start + CITATION_MARKER.len()..];
        let Some(end) = after.find(']') else {
            break;
        };
        found.extend(
            after[..end]
                .split(';')
                .map(str::trim)
                .filter(|r| !r.is_empty()),
        );
        rest = &after[end + 1..];
    }
    found
}
