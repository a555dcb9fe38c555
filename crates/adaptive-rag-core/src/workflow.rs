//! Per-turn workflow orchestration.
//!
//! [`WorkflowOrchestrator::run_turn`] drives one request through the
//! explicit [`TurnState`] machine:
//!
//! ```text
//! Start → Routed ─┬─ general ──▶ GeneralAnswered ───────────────────────────┐
//!                 └─ retrieval ▶ Retrieving → Compressing → Reranking        │
//!                                  → RetrievalAnswered ──────────────────────┤
//!                                                                 Persisted → End
//! ```
//!
//! Any unrecovered stage error moves the turn to `Failed`; nothing is
//! persisted unless an `*Answered` state was reached.
//!
//! Turns on the same thread are sequenced in arrival order: each turn
//! waits for the one enqueued before it to finish (or be dropped). Turns on
//! different threads never wait on each other. Arrival is the first poll of
//! the `run_turn` future.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compress::{CompressorConfig, ContextualCompressor};
use crate::conversation::ConversationStore;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::generate::AnswerGenerator;
use crate::llm::LanguageModel;
use crate::models::{
    CandidateSet, Route, RouteDecision, Turn, TurnRequest, TurnResponse,
};
use crate::multi_query::MultiQueryGenerator;
use crate::redundancy::RedundancyFilter;
use crate::rerank::{RelevanceScorer, Reranker};
use crate::retriever::CandidateRetriever;
use crate::router::{Router, RouterConfig};
use crate::store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Start,
    Routed,
    GeneralAnswered,
    Retrieving,
    Compressing,
    Reranking,
    RetrievalAnswered,
    Persisted,
    End,
    Failed,
}

impl TurnState {
    /// Whether `next` is a legal successor. Transitions only move forward;
    /// `Failed` is reachable from any non-terminal state.
    pub fn can_advance_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Start, Routed)
            | (Routed, GeneralAnswered)
            | (Routed, Retrieving)
            | (Retrieving, Compressing)
            | (Compressing, Reranking)
            | (Reranking, RetrievalAnswered)
            | (GeneralAnswered, Persisted)
            | (RetrievalAnswered, Persisted)
            | (Persisted, End) => true,
            _ => false,
        }
    }

    pub fn is_answered(self) -> bool {
        matches!(self, TurnState::GeneralAnswered | TurnState::RetrievalAnswered)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::End | TurnState::Failed)
    }
}

/// Every state a turn passed through, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnTrace {
    states: Vec<TurnState>,
}

impl TurnTrace {
    fn new() -> Self {
        Self {
            states: vec![TurnState::Start],
        }
    }

    pub fn states(&self) -> &[TurnState] {
        &self.states
    }

    pub fn current(&self) -> TurnState {
        self.states.last().copied().unwrap_or(TurnState::Start)
    }

    fn advance(&mut self, next: TurnState) {
        debug_assert!(
            self.current().can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.current(),
            next
        );
        self.states.push(next);
    }

    fn was_answered(&self) -> bool {
        self.states.iter().any(|s| s.is_answered())
    }
}

/// Tunables for one orchestrator. Immutable once the orchestrator is built.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub variant_count: usize,
    pub candidate_k: usize,
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub compression_enabled: bool,
    pub compression_max_chars: usize,
    pub history_turns: usize,
    pub min_confidence: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            variant_count: 3,
            candidate_k: 10,
            similarity_threshold: 0.95,
            top_k: 10,
            compression_enabled: true,
            compression_max_chars: 1200,
            history_turns: 2,
            min_confidence: 0.0,
        }
    }
}

/// External collaborators the pipeline talks to.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub conversations: Arc<dyn ConversationStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub response: TurnResponse,
    pub decision: RouteDecision,
    pub trace: TurnTrace,
}

/// Chains same-thread turns: each turn holds the sender its successor is
/// waiting on, and releases it by dropping it. A thread's entry lives only
/// while one of its turns is queued or running.
#[derive(Default)]
struct TurnSequencer {
    tails: Mutex<HashMap<String, (u64, oneshot::Receiver<()>)>>,
    next_ticket: AtomicU64,
}

impl TurnSequencer {
    fn enqueue(&self, thread_id: &str) -> (Option<oneshot::Receiver<()>>, TurnSlot<'_>) {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let previous = self
            .lock()
            .insert(thread_id.to_string(), (ticket, rx))
            .map(|(_, rx)| rx);
        let slot = TurnSlot {
            sequencer: self,
            thread_id: thread_id.to_string(),
            ticket,
            _release: tx,
        };
        (previous, slot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (u64, oneshot::Receiver<()>)>> {
        self.tails.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn tracked_threads(&self) -> usize {
        self.lock().len()
    }
}

/// A turn's place in its thread's queue. Dropping it, on completion or
/// cancellation, releases the successor and forgets the thread if no
/// successor arrived.
struct TurnSlot<'a> {
    sequencer: &'a TurnSequencer,
    thread_id: String,
    ticket: u64,
    _release: oneshot::Sender<()>,
}

impl Drop for TurnSlot<'_> {
    fn drop(&mut self) {
        let mut tails = self.sequencer.lock();
        if tails.get(&self.thread_id).map(|(ticket, _)| *ticket) == Some(self.ticket) {
            tails.remove(&self.thread_id);
        }
    }
}

pub struct WorkflowOrchestrator {
    router: Router,
    multi_query: MultiQueryGenerator,
    retriever: CandidateRetriever,
    redundancy: RedundancyFilter,
    compressor: ContextualCompressor,
    reranker: Reranker,
    generator: AnswerGenerator,
    conversations: Arc<dyn ConversationStore>,
    settings: PipelineSettings,
    sequencer: TurnSequencer,
}

impl WorkflowOrchestrator {
    pub fn new(services: Services, settings: PipelineSettings) -> Self {
        let Services {
            llm,
            embedder,
            vector_store,
            scorer,
            conversations,
        } = services;

        Self {
            router: Router::new(
                llm.clone(),
                RouterConfig {
                    min_confidence: settings.min_confidence,
                    history_turns: settings.history_turns,
                },
            ),
            multi_query: MultiQueryGenerator::new(llm.clone(), settings.variant_count),
            retriever: CandidateRetriever::new(embedder.clone(), vector_store),
            redundancy: RedundancyFilter::new(embedder, settings.similarity_threshold),
            compressor: ContextualCompressor::new(
                llm.clone(),
                CompressorConfig {
                    enabled: settings.compression_enabled,
                    max_chars: settings.compression_max_chars,
                },
            ),
            reranker: Reranker::new(scorer),
            generator: AnswerGenerator::new(llm, settings.history_turns),
            conversations,
            settings,
            sequencer: TurnSequencer::default(),
        }
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run one turn end to end and persist it.
    pub async fn run_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, PipelineError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }
        let thread_id = request.thread_id.trim();
        if thread_id.is_empty() {
            return Err(PipelineError::EmptyThreadId);
        }

        let (previous, _slot) = self.sequencer.enqueue(thread_id);
        if let Some(previous) = previous {
            // Ok or Canceled both mean the earlier turn is no longer running.
            let _ = previous.await;
        }

        let mut trace = TurnTrace::new();
        match self.execute(query, thread_id, &mut trace).await {
            Ok((response, decision)) => {
                info!(
                    thread_id,
                    route = %response.path_taken,
                    citations = response.citations.len(),
                    "turn complete"
                );
                debug!(states = ?trace.states(), "turn trace");
                Ok(TurnOutcome {
                    response,
                    decision,
                    trace,
                })
            }
            Err(err) => {
                trace.advance(TurnState::Failed);
                warn!(
                    thread_id,
                    error = %err,
                    answered = trace.was_answered(),
                    states = ?trace.states(),
                    "turn failed"
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        query: &str,
        thread_id: &str,
        trace: &mut TurnTrace,
    ) -> Result<(TurnResponse, RouteDecision), PipelineError> {
        let history = self
            .conversations
            .load(thread_id)
            .await
            .map_err(|e| PipelineError::MemoryRead(format!("{:#}", e)))?
            .map(|state| state.turns)
            .unwrap_or_default();

        let decision = self.router.classify(query, &history).await;
        trace.advance(TurnState::Routed);
        debug!(thread_id, route = %decision.label, rationale = ?decision.rationale, "routed");

        let (answer, citations) = match decision.label {
            Route::General => {
                let text = self.generator.answer_general(query, &history).await?;
                trace.advance(TurnState::GeneralAnswered);
                (text, Vec::new())
            }
            Route::Retrieval => {
                trace.advance(TurnState::Retrieving);
                let candidates = self.gather_candidates(query).await?;

                trace.advance(TurnState::Compressing);
                let compressed = self.compressor.compress(candidates, query).await;

                trace.advance(TurnState::Reranking);
                let ranked = self
                    .reranker
                    .rerank(compressed, query, self.settings.top_k)
                    .await;

                let generated = self
                    .generator
                    .answer_from_documents(query, &ranked, &history)
                    .await?;
                trace.advance(TurnState::RetrievalAnswered);
                (generated.text, generated.citations)
            }
        };

        let turn = Turn::new(query, answer.clone(), decision.label, citations.clone());
        self.conversations
            .append(thread_id, &turn)
            .await
            .map_err(|e| PipelineError::MemoryWrite(format!("{:#}", e)))?;
        trace.advance(TurnState::Persisted);
        trace.advance(TurnState::End);

        Ok((
            TurnResponse {
                thread_id: thread_id.to_string(),
                answer,
                path_taken: decision.label,
                citations,
            },
            decision,
        ))
    }

    /// Expand, retrieve and de-duplicate. A retrieval outage yields an
    /// empty set so the turn still answers with insufficient context.
    async fn gather_candidates(&self, query: &str) -> Result<CandidateSet, PipelineError> {
        let variants = self.multi_query.expand(query).await;
        let candidates = match self
            .retriever
            .retrieve(&variants, self.settings.candidate_k)
            .await
        {
            Ok(set) => set,
            Err(PipelineError::RetrievalUnavailable(reason)) => {
                warn!(%reason, "retrieval unavailable; continuing with no documents");
                CandidateSet::empty()
            }
            Err(err) => return Err(err),
        };
        debug!(variants = variants.len(), candidates = candidates.len(), "retrieved");
        Ok(self.redundancy.dedupe(candidates).await)
    }
}
