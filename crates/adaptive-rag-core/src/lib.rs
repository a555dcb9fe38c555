//! # Adaptive RAG Core
//!
//! Runtime-agnostic logic for Adaptive RAG: the data model, the service
//! traits the pipeline talks to (language model, embedder, vector store,
//! conversation store), every refinement stage, and the per-turn workflow.
//!
//! This crate contains no tokio, sqlx, or HTTP dependencies. Concrete
//! adapters for the service traits live in the `adaptive-rag` app crate.
//!
//! ## Turn lifecycle
//!
//! ```text
//!                ┌────────┐
//!  query ──────▶ │ Router │ ── general ──────────────────────────────┐
//!                └───┬────┘                                          │
//!                    │ retrieval                                     ▼
//!   ┌────────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐
//!   │ MultiQuery │─▶│ Retriever │─▶│ Redundancy │─▶│ Compress │─▶│ Rerank   │
//!   └────────────┘  └───────────┘  └────────────┘  └──────────┘  └────┬─────┘
//!                                                                     ▼
//!                                                            ┌─────────────────┐
//!                                                            │ AnswerGenerator │
//!                                                            └────────┬────────┘
//!                                                                     ▼
//!                                                           ConversationStore
//! ```

pub mod compress;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod llm;
pub mod models;
pub mod multi_query;
pub mod prompts;
pub mod redundancy;
pub mod rerank;
pub mod retriever;
pub mod router;
pub mod store;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ErrorKind, LlmError, PipelineError};
pub use models::{
    CandidateSet, ConversationState, Document, QueryVariant, Route, RouteDecision, Turn,
    TurnRequest, TurnResponse,
};
pub use workflow::{PipelineSettings, Services, TurnOutcome, TurnState, WorkflowOrchestrator};
