//! Embedding provider implementations.
//!
//! Concrete backends for the core [`EmbeddingProvider`] trait:
//! - **[`DisabledProvider`]**: always errors; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings` with retry and backoff.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalProvider`**: fastembed, behind the `local-embeddings-fastembed` feature.
//! - `"hash"`: the deterministic [`HashEmbeddingProvider`] from the core crate.
//!
//! # Retry Strategy
//!
//! The OpenAI and Ollama providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use context_recall_core::embedding::{EmbeddingOutput, EmbeddingProvider, HashEmbeddingProvider};
use context_recall_core::error::{RecallError, Result};

use crate::config::EmbeddingConfig;

/// Create the provider named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `local-embeddings-fastembed`) |
/// | `"hash"` | [`HashEmbeddingProvider`] |
///
/// # Errors
///
/// [`RecallError::Configuration`] for unknown providers, missing model or
/// dims, a missing `OPENAI_API_KEY`, or a disabled feature flag.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(config.dims.unwrap_or(256)))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RecallError::configuration(
            "Local embedding provider requires --features local-embeddings-fastembed",
        )),
        other => Err(RecallError::configuration(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _inputs: &[String]) -> Result<EmbeddingOutput> {
        Err(RecallError::configuration("Embedding provider is disabled"))
    }
}

// ============ Shared HTTP plumbing ============

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RecallError::configuration(format!("failed to build HTTP client: {}", e)))
}

fn required_model(config: &EmbeddingConfig, label: &str) -> Result<String> {
    config.model.clone().ok_or_else(|| {
        RecallError::configuration(format!("embedding.model required for {} provider", label))
    })
}

fn required_dims(config: &EmbeddingConfig, label: &str) -> Result<usize> {
    config.dims.filter(|d| *d > 0).ok_or_else(|| {
        RecallError::configuration(format!("embedding.dims required for {} provider", label))
    })
}

/// POST `body` to `url`, retrying 429/5xx and network errors with
/// exponential backoff. Returns the parsed JSON body of the first success.
async fn post_with_backoff(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    label: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider = label, attempt, ?delay, "retrying embedding call");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        RecallError::provider(format!("{} response decode failed: {}", label, e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = RecallError::provider(format!(
                    "{} API error {}: {}",
                    label, status, body_text
                ));

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                last_err = Some(RecallError::provider(format!(
                    "{} connection error ({}): {}",
                    label, url, e
                )));
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RecallError::provider(format!("{} embedding failed after retries", label))))
}

fn parse_vector(value: &Value, label: &str) -> Result<Vec<f32>> {
    let array = value.as_array().ok_or_else(|| {
        RecallError::provider(format!("Invalid {} response: embedding is not an array", label))
    })?;
    Ok(array
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

fn check_count(embeddings: &[Vec<f32>], expected: usize, label: &str) -> Result<()> {
    if embeddings.len() != expected {
        return Err(RecallError::provider(format!(
            "{} returned {} embeddings for {} inputs",
            label,
            embeddings.len(),
            expected
        )));
    }
    Ok(())
}

// ============ OpenAI Provider ============

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Embedding provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable at construction.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config, "OpenAI")?;
        let dims = required_dims(config, "OpenAI")?;
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RecallError::configuration("OPENAI_API_KEY environment variable not set")
        })?;

        Ok(Self {
            model,
            dims,
            api_key,
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingOutput> {
        let body = serde_json::json!({ "model": self.model, "input": inputs });
        let json = post_with_backoff(
            &self.client,
            OPENAI_EMBEDDINGS_URL,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        let output = parse_openai_response(&json, &self.model)?;
        check_count(&output.embeddings, inputs.len(), "OpenAI")?;
        Ok(output)
    }
}

/// Extract `data[].embedding` (ordered by `index`) and `usage.total_tokens`.
fn parse_openai_response(json: &Value, requested_model: &str) -> Result<EmbeddingOutput> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RecallError::provider("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| RecallError::provider("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    let tokens = json
        .get("usage")
        .and_then(|u| u.get("total_tokens").or_else(|| u.get("prompt_tokens")))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let model = json
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();

    Ok(EmbeddingOutput {
        embeddings: indexed.into_iter().map(|(_, v)| v).collect(),
        model,
        tokens,
    })
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = required_model(config, "Ollama")?;
        let dims = required_dims(config, "Ollama")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url: url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingOutput> {
        let body = serde_json::json!({ "model": self.model, "input": inputs });
        let endpoint = format!("{}/api/embed", self.url);
        let json = post_with_backoff(
            &self.client,
            &endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        let output = parse_ollama_response(&json, &self.model)?;
        check_count(&output.embeddings, inputs.len(), "Ollama")?;
        Ok(output)
    }
}

fn parse_ollama_response(json: &Value, model: &str) -> Result<EmbeddingOutput> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RecallError::provider("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| parse_vector(e, "Ollama"))
        .collect::<Result<Vec<_>>>()?;

    Ok(EmbeddingOutput {
        embeddings,
        model: model.to_string(),
        tokens: json
            .get("prompt_eval_count")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    })
}

// ============ Local Provider (fastembed) ============

/// Embedding provider for local inference via fastembed.
///
/// Models are downloaded from Hugging Face on first use and cached; after
/// that, embeddings run offline.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        // Validate the name up front so misconfiguration fails at startup.
        config_to_fastembed_model(&model_name)?;
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "bge-base-en-v1.5" | "nomic-embed-text-v1.5" | "multilingual-e5-base" => 768,
            "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
            _ => 384,
        });
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        other => Err(RecallError::configuration(format!(
            "Unknown local embedding model: '{}'",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingOutput> {
        let fastembed_model = config_to_fastembed_model(&self.model_name)?;
        let batch_size = self.batch_size;
        let texts = inputs.to_vec();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| {
                RecallError::provider(format!("Failed to initialize local embedding model: {}", e))
            })?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| RecallError::provider(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RecallError::provider(format!("local embedding task failed: {}", e)))??;

        Ok(EmbeddingOutput {
            embeddings,
            model: self.model_name.clone(),
            tokens: 0,
        })
    }
}
