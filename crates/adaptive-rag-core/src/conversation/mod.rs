//! Conversation memory keyed by thread identifier.
//!
//! A [`ConversationStore`] supports exactly two operations on the turn
//! path: read every turn of a thread, and append one turn. Implementations
//! must preserve append order; the workflow serializes appends per thread,
//! so a store only needs its own short critical section around each call.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ConversationState, Turn};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load the full state of a thread, or `None` if it has no turns yet.
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;

    /// Append a completed turn, creating the thread on first use.
    async fn append(&self, thread_id: &str, turn: &Turn) -> Result<()>;

    /// List known thread identifiers, sorted.
    async fn list_threads(&self) -> Result<Vec<String>>;
}
