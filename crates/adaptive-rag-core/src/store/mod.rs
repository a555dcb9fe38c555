//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the only view the retrieval pipeline has
//! of the document index. How documents get into the index is outside
//! this crate; implementations only need to answer nearest-neighbour
//! queries.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// One nearest-neighbour match returned by a [`VectorStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub content: String,
    pub source_reference: String,
    /// Similarity to the query vector (higher is closer).
    pub score: f64,
    /// The stored vector, when the backend can return it cheaply.
    pub embedding: Option<Vec<f32>>,
}

/// Nearest-neighbour search over embedded documents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` hits ordered by descending score.
    ///
    /// An empty result is valid and must not be reported as an error.
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<StoreHit>>;
}
