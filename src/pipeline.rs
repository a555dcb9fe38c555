//! Wiring from [`Config`] to a ready [`WorkflowOrchestrator`].

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use adaptive_rag_core::conversation::memory::InMemoryConversationStore;
use adaptive_rag_core::conversation::ConversationStore;
use adaptive_rag_core::rerank::LlmRelevanceScorer;
use adaptive_rag_core::{Services, WorkflowOrchestrator};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::OpenAiCompatibleClient;
use crate::migrate;
use crate::sqlite_memory::SqliteConversationStore;
use crate::sqlite_store::SqliteVectorStore;

/// Open the database and make sure the schema exists.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    let pool = db::connect(config)
        .await
        .with_context(|| format!("Failed to open database: {}", config.store.path.display()))?;
    migrate::apply(&pool).await?;
    Ok(pool)
}

/// The conversation store selected by `memory.backend`.
pub fn conversation_store(config: &Config, pool: &SqlitePool) -> Arc<dyn ConversationStore> {
    match config.memory.backend.as_str() {
        "memory" => Arc::new(InMemoryConversationStore::new()),
        _ => Arc::new(SqliteConversationStore::new(pool.clone())),
    }
}

/// Build the orchestrator with every production adapter.
pub async fn build_orchestrator(config: &Config) -> Result<WorkflowOrchestrator> {
    let pool = open_database(config).await?;

    let llm = Arc::new(
        OpenAiCompatibleClient::from_config(&config.llm)
            .with_context(|| "Failed to configure language model")?,
    );
    let embedder = create_embedder(&config.embedding)?;

    info!(
        model = %config.llm.model,
        embedding = %config.embedding.provider,
        memory = %config.memory.backend,
        "pipeline ready"
    );

    let services = Services {
        llm: llm.clone(),
        embedder,
        vector_store: Arc::new(SqliteVectorStore::new(pool.clone())),
        scorer: Arc::new(LlmRelevanceScorer::new(llm)),
        conversations: conversation_store(config, &pool),
    };
    Ok(WorkflowOrchestrator::new(services, config.pipeline_settings()))
}
