//! In-memory [`ConversationStore`] for tests and single-process use.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ConversationState, Turn};

use super::ConversationStore;

pub struct InMemoryConversationStore {
    threads: RwLock<HashMap<String, ConversationState>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let threads = self
            .threads
            .read()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        Ok(threads.get(thread_id).cloned())
    }

    async fn append(&self, thread_id: &str, turn: &Turn) -> Result<()> {
        let mut threads = self
            .threads
            .write()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| ConversationState::new(thread_id))
            .turns
            .push(turn.clone());
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads = self
            .threads
            .read()
            .map_err(|_| anyhow!("conversation store lock poisoned"))?;
        let mut ids: Vec<String> = threads.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Route;

    #[tokio::test]
    async fn test_unknown_thread_is_none() {
        let store = InMemoryConversationStore::new();
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_preserves_order_per_thread() {
        let store = InMemoryConversationStore::new();
        for i in 0..3 {
            let turn = Turn::new(format!("q{}", i), format!("a{}", i), Route::General, vec![]);
            store.append("t1", &turn).await.unwrap();
        }
        store
            .append("t2", &Turn::new("other", "x", Route::Retrieval, vec![]))
            .await
            .unwrap();

        let state = store.load("t1").await.unwrap().unwrap();
        assert_eq!(state.thread_id, "t1");
        let queries: Vec<&str> = state.turns.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, vec!["q0", "q1", "q2"]);
        assert_eq!(store.list_threads().await.unwrap(), vec!["t1", "t2"]);
    }
}
