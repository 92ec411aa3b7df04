//! TOML configuration.
//!
//! Every section has serde defaults so a minimal file works; [`load_config`]
//! parses and validates. See `config/recall.example.toml` for a full example.
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [vector_store]
//! backend = "chroma"
//! url = "http://localhost:8000"
//!
//! [content_store]
//! path = "./data/recall.sqlite"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use context_recall_core::chunk::{ChunkOptions, DEFAULT_CHUNK_CHARS, MAX_OVERLAP_CHARS};

/// Hard ceiling on inputs per embedding call.
pub const MAX_EMBEDDING_BATCH: usize = 100;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub content_store: ContentStoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default)]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: 0,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions::new(self.max_chars, self.overlap_chars)
    }
}

fn default_max_chars() -> usize {
    DEFAULT_CHUNK_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Provider token ceiling for a single input.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            max_input_tokens: default_max_input_tokens(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_max_input_tokens() -> usize {
    8191
}
fn default_batch_size() -> usize {
    MAX_EMBEDDING_BATCH
}
fn default_batch_pause_ms() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Self-hosted endpoint, e.g. `http://localhost:8000`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Name of the environment variable holding the API token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl VectorStoreConfig {
    /// True when vectors live only as long as the process.
    pub fn is_ephemeral(&self) -> bool {
        self.backend == "memory"
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            tenant: default_tenant(),
            database: default_database(),
            api_key_env: None,
            collection: default_collection(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_tenant() -> String {
    "default_tenant".to_string()
}
fn default_database() -> String {
    "default_database".to_string()
}
fn default_collection() -> String {
    "user_content".to_string()
}
fn default_upsert_batch_size() -> usize {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentStoreConfig {
    #[serde(default = "default_content_path")]
    pub path: PathBuf,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            path: default_content_path(),
        }
    }
}

fn default_content_path() -> PathBuf {
    PathBuf::from("./data/recall.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_final_limit")]
    pub final_limit: usize,
    /// Each retriever fetches `max_results * candidate_multiplier` candidates.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_retriever_timeout_ms")]
    pub retriever_timeout_ms: u64,
    #[serde(default = "default_include_lexical")]
    pub include_lexical: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            final_limit: default_final_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            retriever_timeout_ms: default_retriever_timeout_ms(),
            include_lexical: default_include_lexical(),
        }
    }
}

impl RetrievalConfig {
    pub fn retriever_timeout(&self) -> Duration {
        Duration::from_millis(self.retriever_timeout_ms)
    }
}

fn default_final_limit() -> usize {
    20
}
fn default_candidate_multiplier() -> usize {
    2
}
fn default_retriever_timeout_ms() -> u64 {
    15_000
}
fn default_include_lexical() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7420".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    let chunking = &config.chunking;
    if chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if chunking.overlap_chars >= chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }
    if chunking.overlap_chars > MAX_OVERLAP_CHARS {
        anyhow::bail!("chunking.overlap_chars must be <= {}", MAX_OVERLAP_CHARS);
    }

    // Embedding
    let embedding = &config.embedding;
    if embedding.batch_size == 0 || embedding.batch_size > MAX_EMBEDDING_BATCH {
        anyhow::bail!("embedding.batch_size must be in 1..={}", MAX_EMBEDDING_BATCH);
    }
    if embedding.max_input_tokens == 0 {
        anyhow::bail!("embedding.max_input_tokens must be > 0");
    }
    if embedding.is_enabled() && embedding.provider != "hash" {
        if embedding.dims.is_none() || embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                embedding.provider
            );
        }
        if embedding.model.is_none() && embedding.provider != "local" {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                embedding.provider
            );
        }
    }
    match embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" | "hash" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }

    // Vector store
    let store = &config.vector_store;
    if store.upsert_batch_size == 0 {
        anyhow::bail!("vector_store.upsert_batch_size must be > 0");
    }
    match store.backend.as_str() {
        "chroma" => {
            if store.url.is_none() {
                anyhow::bail!("vector_store.url must be set when backend is 'chroma'");
            }
        }
        "memory" => {}
        other => anyhow::bail!(
            "Unknown vector store backend: '{}'. Must be chroma or memory.",
            other
        ),
    }

    // Retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }
    if config.retrieval.candidate_multiplier < 1 {
        anyhow::bail!("retrieval.candidate_multiplier must be >= 1");
    }

    Ok(())
}
