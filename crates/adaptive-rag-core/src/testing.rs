//! Deterministic fakes for the service traits.
//!
//! Enabled for this crate's own tests and, via the `testing` feature, for
//! downstream test suites.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::llm::{CompletionRequest, LanguageModel, Task};
use crate::models::Document;
use crate::rerank::RelevanceScorer;

type Handler = Box<dyn Fn(&CompletionRequest) -> Result<String> + Send + Sync>;

/// A language model whose replies are computed by a closure.
pub struct ScriptedModel {
    handler: Handler,
    calls: Mutex<Vec<CompletionRequest>>,
    yields: usize,
}

impl ScriptedModel {
    pub fn new(
        handler: impl Fn(&CompletionRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            yields: 0,
        }
    }

    /// Always reply with the same text.
    pub fn replying(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Yield to the executor this many times before replying, so
    /// concurrent callers interleave.
    pub fn with_yields(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, task: Task) -> usize {
        self.calls().iter().filter(|c| c.task == task).count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        for _ in 0..self.yields {
            YieldNow(false).await;
        }
        (self.handler)(request)
    }
}

struct YieldNow(bool);

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            Poll::Ready(())
        } else {
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Bag-of-words embedder: each lowercase word is hashed into a bucket.
///
/// Texts sharing vocabulary get high cosine similarity, which is enough
/// to exercise retrieval and redundancy filtering end to end.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dims;
            v[bucket] += 1.0;
        }
        v
    }
}

fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-embedder"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// An embedder that is always down.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(anyhow!("embedding service unreachable"))
    }
}

/// A relevance scorer backed by a closure over `(query, document)`.
pub struct ScriptedScorer {
    handler: Box<dyn Fn(&str, &Document) -> Result<f64> + Send + Sync>,
}

impl ScriptedScorer {
    pub fn new(handler: impl Fn(&str, &Document) -> Result<f64> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
        }
    }

    /// Score by the number of query words the document contains.
    pub fn word_overlap() -> Self {
        Self::new(|query, doc| {
            let content = doc.content.to_lowercase();
            let hits = query
                .to_lowercase()
                .split_whitespace()
                .filter(|w| content.contains(*w))
                .count();
            Ok(hits as f64)
        })
    }

    pub fn failing() -> Self {
        Self::new(|_, _| Err(anyhow!("scorer unavailable")))
    }
}

#[async_trait]
impl RelevanceScorer for ScriptedScorer {
    async fn score(&self, query: &str, documents: &[Document]) -> Result<Vec<f64>> {
        documents
            .iter()
            .map(|d| (self.handler)(query, d))
            .collect()
    }
}
