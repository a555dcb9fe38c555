//! Prompt templates and message builders for every model call.

use serde_json::json;

use crate::llm::{ChatMessage, ResponseSchema};
use crate::models::{Document, Turn};

pub const ROUTER_SYSTEM: &str = "You route user questions for a retrieval-augmented assistant.\n\
Decide whether the question needs the document knowledge base or can be answered from \
general knowledge and the conversation so far.\n\
- \"retrieval\": questions about specific documents, policies, code, APIs, product or \
framework details, or anything where a citation would help.\n\
- \"general\": greetings, chit-chat, and broad conceptual questions answerable without \
documents, or follow-ups fully answered by the conversation history.\n\
When unsure, choose \"retrieval\".\n\
Respond with a JSON object: {\"label\": \"general\" | \"retrieval\", \"confidence\": 0..1, \
\"rationale\": \"short reason\"}.";

pub const ROUTER_REASK: &str = "Your previous reply could not be parsed. Reply with only a \
JSON object whose \"label\" is exactly \"general\" or \"retrieval\".";

pub const MULTI_QUERY_SYSTEM: &str = "You help a search engine find relevant documents. \
Rewrite the user's question into alternative search queries that cover different facets \
or phrasings of it. Output one query per line with no numbering and no commentary.";

/// Sentinel a compressor reply may use to say nothing in the document is relevant.
pub const NO_RELEVANT_CONTENT: &str = "NO_RELEVANT_CONTENT";

pub const COMPRESS_SYSTEM: &str = "Extract from the document only the sentences that help \
answer the question. Copy them verbatim; do not add facts, do not summarize beyond removing \
irrelevant text. If nothing in the document is relevant, reply exactly NO_RELEVANT_CONTENT.";

pub const RERANK_SYSTEM: &str = "Rate how relevant the document is to the question on a scale \
from 0 (irrelevant) to 10 (directly answers it). Reply with only the number.";

pub const GENERAL_SYSTEM: &str = "You are a helpful, concise assistant. Answer from your own \
knowledge and the conversation history. Keep answers short and friendly.";

pub const GROUNDED_SYSTEM: &str = "You answer questions using only the provided documents.\n\
Rules:\n\
1. Use only facts found in the documents below; never guess or use outside knowledge.\n\
2. After each claim, cite its document as [source: <reference>] using the reference shown \
in the document header.\n\
3. If the documents do not contain the answer, say that there is not enough context to \
answer the question.";

/// Fixed reply for a retrieval-path turn with nothing left to ground on.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "I do not have enough context to answer that question: no relevant documents were found.";

/// JSON schema for the router's structured output.
pub fn route_schema() -> ResponseSchema {
    ResponseSchema {
        name: "route_decision".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "enum": ["general", "retrieval"] },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "rationale": { "type": "string" }
            },
            "required": ["label"],
            "additionalProperties": false
        }),
    }
}

/// Replay prior turns as alternating user/assistant messages.
pub fn history_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .flat_map(|t| {
            [
                ChatMessage::user(t.query.clone()),
                ChatMessage::assistant(t.response.clone()),
            ]
        })
        .collect()
}

pub fn multi_query_user(query: &str, alternatives: usize) -> String {
    format!(
        "Write {} alternative search queries for this question:\n\n{}",
        alternatives, query
    )
}

pub fn compress_user(query: &str, document: &Document) -> String {
    format!(
        "Question:\n{}\n\nDocument ({}):\n{}",
        query, document.source_reference, document.content
    )
}

pub fn rerank_user(query: &str, document: &Document) -> String {
    format!("Question:\n{}\n\nDocument:\n{}", query, document.content)
}

/// Render documents as numbered blocks tagged with their citation locator.
pub fn render_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "[{}] (reference: {})\n{}",
                i + 1,
                d.source_reference,
                d.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn grounded_user(query: &str, documents: &[Document]) -> String {
    format!(
        "DOCUMENTS:\n{}\n\nQUESTION:\n{}",
        render_documents(documents),
        query
    )
}
