//! Error taxonomy for the turn pipeline.
//!
//! Only some of these ever escape a turn. `RoutingAmbiguous`,
//! `CompressionFailure`, `RerankFailure` and `RetrievalUnavailable` are
//! recovered inside their stage and exist so the recovery can be logged
//! with a precise cause.

use thiserror::Error;

/// Transport-level failures of a language-model call.
///
/// Adapters wrap these in `anyhow::Error`; call sites recover them with
/// `downcast_ref` to decide how to degrade.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model timed out: {0}")]
    Timeout(String),

    #[error("language model rate limited: {0}")]
    RateLimited(String),

    #[error("malformed language model output: {0}")]
    Malformed(String),

    #[error("language model unavailable: {0}")]
    Unavailable(String),
}

/// Short label for an error returned by a `LanguageModel`, for logs.
pub fn llm_error_label(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<LlmError>() {
        Some(LlmError::Timeout(_)) => "timeout",
        Some(LlmError::RateLimited(_)) => "rate_limited",
        Some(LlmError::Malformed(_)) => "malformed",
        Some(LlmError::Unavailable(_)) => "unavailable",
        None => "other",
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("thread_id must not be empty")]
    EmptyThreadId,

    #[error("routing output was ambiguous: {0}")]
    RoutingAmbiguous(String),

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("compression failed for {source_reference}: {reason}")]
    CompressionFailure {
        source_reference: String,
        reason: String,
    },

    #[error("rerank failed: {0}")]
    RerankFailure(String),

    /// The model answered, but not with anything usable.
    #[error("no answer could be generated: {0}")]
    Generation(String),

    /// The model could not be reached.
    #[error("answer generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("conversation memory read failed: {0}")]
    MemoryRead(String),

    #[error("conversation memory write failed: {0}")]
    MemoryWrite(String),
}

/// Coarse classification of a turn failure for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself was unusable.
    InvalidRequest,
    /// The system worked but no answer is possible.
    NoAnswer,
    /// A collaborating service failed; retrying the turn may succeed.
    SystemFault,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyQuery | PipelineError::EmptyThreadId => ErrorKind::InvalidRequest,
            PipelineError::Generation(_)
            | PipelineError::RoutingAmbiguous(_)
            | PipelineError::CompressionFailure { .. } => ErrorKind::NoAnswer,
            PipelineError::RetrievalUnavailable(_)
            | PipelineError::RerankFailure(_)
            | PipelineError::GenerationUnavailable(_)
            | PipelineError::MemoryRead(_)
            | PipelineError::MemoryWrite(_) => ErrorKind::SystemFault,
        }
    }

    /// Map a failed generation call to the matching variant.
    pub fn from_generation(err: anyhow::Error) -> Self {
        match err.downcast_ref::<LlmError>() {
            Some(LlmError::Malformed(msg)) => PipelineError::Generation(msg.clone()),
            _ => PipelineError::GenerationUnavailable(format!("{:#}", err)),
        }
    }
}
