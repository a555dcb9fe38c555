//! Language-model service boundary.
//!
//! The pipeline never talks HTTP itself. Every model call goes through
//! [`LanguageModel::complete`] with a [`CompletionRequest`] naming the
//! [`Task`] it serves, so adapters can log and tests can script per stage.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Which pipeline stage issued a model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Route,
    ExpandQuery,
    Compress,
    ScoreRelevance,
    AnswerGeneral,
    AnswerGrounded,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Route => "route",
            Task::ExpandQuery => "expand_query",
            Task::Compress => "compress",
            Task::ScoreRelevance => "score_relevance",
            Task::AnswerGeneral => "answer_general",
            Task::AnswerGrounded => "answer_grounded",
        }
    }
}

/// A JSON schema the model output must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub task: Task,
    pub messages: Vec<ChatMessage>,
    pub schema: Option<ResponseSchema>,
    /// Overrides the adapter's default sampling temperature.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(task: Task, messages: Vec<ChatMessage>) -> Self {
        Self {
            task,
            messages,
            schema: None,
            temperature: None,
        }
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Content of the last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A chat-completion backend.
///
/// Implementations should wrap transport failures in
/// [`LlmError`](crate::error::LlmError) so callers can tell a timeout
/// from malformed output.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"llama-3.3-70b-versatile"`).
    fn model_name(&self) -> &str;

    /// Run one completion and return the raw text of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
