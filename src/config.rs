//! TOML configuration for the `arag` binary and library.
//!
//! Every section except `[store]` is optional; missing keys fall back to
//! the defaults below. See `config/arag.example.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use adaptive_rag_core::PipelineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. Unset means
    /// requests are sent without an `Authorization` header.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of the embedding API. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// `sqlite` persists conversations next to the vector store; `memory`
    /// keeps them for the life of the process.
    #[serde(default = "default_memory_backend")]
    pub backend: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
        }
    }
}

fn default_memory_backend() -> String {
    "sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_variant_count")]
    pub variant_count: usize,
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_true")]
    pub compression_enabled: bool,
    #[serde(default = "default_compression_max_chars")]
    pub compression_max_chars: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variant_count: default_variant_count(),
            candidate_k: default_candidate_k(),
            similarity_threshold: default_similarity_threshold(),
            top_k: default_top_k(),
            compression_enabled: true,
            compression_max_chars: default_compression_max_chars(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_variant_count() -> usize {
    3
}
fn default_candidate_k() -> usize {
    10
}
fn default_similarity_threshold() -> f32 {
    0.95
}
fn default_top_k() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_compression_max_chars() -> usize {
    1200
}
fn default_history_turns() -> usize {
    2
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RouterSection {
    /// General verdicts below this confidence are routed to retrieval.
    #[serde(default)]
    pub min_confidence: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_turn_timeout_secs() -> u64 {
    120
}

impl Config {
    /// The immutable per-run settings handed to the workflow.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            variant_count: self.pipeline.variant_count,
            candidate_k: self.pipeline.candidate_k,
            similarity_threshold: self.pipeline.similarity_threshold,
            top_k: self.pipeline.top_k,
            compression_enabled: self.pipeline.compression_enabled,
            compression_max_chars: self.pipeline.compression_max_chars,
            history_turns: self.pipeline.history_turns,
            min_confidence: self.router.min_confidence,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate pipeline
    let p = &config.pipeline;
    if p.variant_count < 1 {
        anyhow::bail!("pipeline.variant_count must be >= 1");
    }
    if p.candidate_k < 1 {
        anyhow::bail!("pipeline.candidate_k must be >= 1");
    }
    if p.top_k < 1 {
        anyhow::bail!("pipeline.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&p.similarity_threshold) {
        anyhow::bail!("pipeline.similarity_threshold must be in [0.0, 1.0]");
    }
    if p.compression_max_chars < 1 {
        anyhow::bail!("pipeline.compression_max_chars must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.router.min_confidence) {
        anyhow::bail!("router.min_confidence must be in [0.0, 1.0]");
    }

    // Validate llm
    if config.llm.base_url.trim().is_empty() {
        anyhow::bail!("llm.base_url must not be empty");
    }
    if config.llm.model.trim().is_empty() {
        anyhow::bail!("llm.model must not be empty");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.memory.backend.as_str() {
        "sqlite" | "memory" => {}
        other => anyhow::bail!(
            "Unknown memory backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    Ok(config)
}
