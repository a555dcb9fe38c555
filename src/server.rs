//! HTTP API for asking questions and reading conversation memory.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Run one turn (`thread_id` optional; a new one is generated) |
//! | `GET`  | `/threads` | List known thread ids |
//! | `GET`  | `/threads/{id}` | Full conversation state for one thread |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `generation_failed` (502), `memory_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use adaptive_rag_core::{
    ConversationState, PipelineError, TurnRequest, TurnResponse, WorkflowOrchestrator,
};

use crate::config::Config;
use crate::pipeline;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<WorkflowOrchestrator>,
    /// Upper bound on one whole turn; the turn future is dropped on expiry.
    turn_timeout: Duration,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Arc::new(pipeline::build_orchestrator(config).await?);
    let app = router(
        orchestrator,
        Duration::from_secs(config.server.turn_timeout_secs),
    );

    let bind_addr = config.server.bind.clone();
    println!("Adaptive RAG server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the API router around an orchestrator.
pub fn router(orchestrator: Arc<WorkflowOrchestrator>, turn_timeout: Duration) -> Router {
    let state = AppState {
        orchestrator,
        turn_timeout,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/threads", get(handle_list_threads))
        .route("/threads/{id}", get(handle_get_thread))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    app_error(StatusCode::NOT_FOUND, "not_found", message)
}

fn timeout_error(message: impl Into<String>) -> AppError {
    app_error(StatusCode::REQUEST_TIMEOUT, "timeout", message)
}

fn memory_unavailable(message: impl Into<String>) -> AppError {
    app_error(StatusCode::SERVICE_UNAVAILABLE, "memory_unavailable", message)
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::EmptyQuery | PipelineError::EmptyThreadId => bad_request(message),
            PipelineError::Generation(_) | PipelineError::GenerationUnavailable(_) => {
                app_error(StatusCode::BAD_GATEWAY, "generation_failed", message)
            }
            PipelineError::MemoryRead(_) | PipelineError::MemoryWrite(_) => {
                memory_unavailable(message)
            }
            _ => app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default)]
    thread_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let thread_id = req
        .thread_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = TurnRequest::new(req.query, thread_id);

    let outcome = tokio::time::timeout(state.turn_timeout, state.orchestrator.run_turn(&request))
        .await
        .map_err(|_| {
            warn!(thread_id = %request.thread_id, "turn timed out");
            timeout_error(format!(
                "turn did not finish within {}s",
                state.turn_timeout.as_secs()
            ))
        })??;

    info!(
        thread_id = %outcome.response.thread_id,
        route = %outcome.response.path_taken,
        citations = outcome.response.citations.len(),
        "turn answered"
    );
    Ok(Json(outcome.response))
}

// ============ GET /threads ============

#[derive(Serialize)]
struct ThreadListResponse {
    threads: Vec<String>,
}

async fn handle_list_threads(
    State(state): State<AppState>,
) -> Result<Json<ThreadListResponse>, AppError> {
    let threads = state
        .orchestrator
        .conversations()
        .list_threads()
        .await
        .map_err(|e| memory_unavailable(format!("{:#}", e)))?;
    Ok(Json(ThreadListResponse { threads }))
}

// ============ GET /threads/{id} ============

async fn handle_get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationState>, AppError> {
    state
        .orchestrator
        .conversations()
        .load(&id)
        .await
        .map_err(|e| memory_unavailable(format!("{:#}", e)))?
        .map(Json)
        .ok_or_else(|| not_found(format!("no thread with id: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_rag_core::conversation::memory::InMemoryConversationStore;
    use adaptive_rag_core::llm::{CompletionRequest, LanguageModel, Task};
    use adaptive_rag_core::store::memory::InMemoryVectorStore;
    use adaptive_rag_core::testing::{HashEmbedder, ScriptedModel, ScriptedScorer};
    use adaptive_rag_core::{LlmError, PipelineSettings, Services};
    use serde_json::{json, Value};

    fn orchestrator(model: ScriptedModel) -> Arc<WorkflowOrchestrator> {
        let llm = Arc::new(model);
        Arc::new(WorkflowOrchestrator::new(
            Services {
                llm,
                embedder: Arc::new(HashEmbedder::new(32)),
                vector_store: Arc::new(InMemoryVectorStore::new()),
                scorer: Arc::new(ScriptedScorer::word_overlap()),
                conversations: Arc::new(InMemoryConversationStore::new()),
            },
            PipelineSettings::default(),
        ))
    }

    fn general_model() -> ScriptedModel {
        ScriptedModel::new(|req| {
            Ok(match req.task {
                Task::Route => r#"{"label":"general","confidence":0.95}"#.to_string(),
                _ => "Paris.".to_string(),
            })
        })
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn(router(orchestrator(general_model()), Duration::from_secs(5))).await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_chat_generates_thread_and_persists() {
        let base = spawn(router(orchestrator(general_model()), Duration::from_secs(5))).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/chat", base))
            .json(&json!({ "query": "What is the capital of France?" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["answer"], "Paris.");
        assert_eq!(body["path_taken"], "general");
        let thread_id = body["thread_id"].as_str().unwrap().to_string();
        assert!(!thread_id.is_empty());

        let threads: Value = client
            .get(format!("{}/threads", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(threads["threads"], json!([thread_id.clone()]));

        let state: Value = client
            .get(format!("{}/threads/{}", base, thread_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(state["turns"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_error_contract() {
        let base = spawn(router(orchestrator(general_model()), Duration::from_secs(5))).await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{}/chat", base))
            .json(&json!({ "query": "   ", "thread_id": "t1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");

        let res = client
            .get(format!("{}/threads/missing", base))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn test_generation_failure_is_bad_gateway() {
        let model = ScriptedModel::new(|req| match req.task {
            Task::Route => Ok(r#"{"label":"general"}"#.to_string()),
            _ => Err(LlmError::Unavailable("connection refused".into()).into()),
        });
        let base = spawn(router(orchestrator(model), Duration::from_secs(5))).await;

        let res = reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&json!({ "query": "hello", "thread_id": "t1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 502);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "generation_failed");
    }

    struct StalledModel;

    #[async_trait::async_trait]
    impl LanguageModel for StalledModel {
        fn model_name(&self) -> &str {
            "stalled"
        }
        async fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("general".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_turn_times_out() {
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            Services {
                llm: Arc::new(StalledModel),
                embedder: Arc::new(HashEmbedder::new(32)),
                vector_store: Arc::new(InMemoryVectorStore::new()),
                scorer: Arc::new(ScriptedScorer::word_overlap()),
                conversations: Arc::new(InMemoryConversationStore::new()),
            },
            PipelineSettings::default(),
        ));
        let base = spawn(router(orchestrator.clone(), Duration::from_millis(50))).await;

        let res = reqwest::Client::new()
            .post(format!("{}/chat", base))
            .json(&json!({ "query": "hello", "thread_id": "slow" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 408);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"]["code"], "timeout");

        // The dropped turn persisted nothing.
        assert!(orchestrator
            .conversations()
            .load("slow")
            .await
            .unwrap()
            .is_none());
    }
}
