//! Embedding producer.
//!
//! Wraps an [`EmbeddingProvider`] with the input discipline every caller
//! needs: sanitization, a character budget under the provider's token
//! ceiling, provider-safe batching, and chunk-and-average embedding for
//! text that does not fit in one call.
//!
//! # Character budget
//!
//! Budgets assume the worst case of one token per character, so the
//! character budget is the provider's token ceiling minus a fixed safety
//! margin. Truncated input ends with the sanitizer's truncation marker.
//!
//! # Failure policy
//!
//! | Operation | On provider error |
//! |-----------|-------------------|
//! | [`Embedder::embed_one`] | propagate (fail-closed) |
//! | [`Embedder::embed_batch`] | propagate; earlier batches are discarded |
//! | [`Embedder::embed_long_text`] | retry the failing chunk once at half size, then propagate |

use std::sync::Arc;
use std::time::Duration;

use context_recall_core::chunk::{split_text, ChunkOptions};
use context_recall_core::embedding::{mean_pool, EmbeddingProvider};
use context_recall_core::error::{RecallError, Result};
use context_recall_core::sanitize::{sanitize_text, truncate_chars};

use crate::config::{EmbeddingConfig, MAX_EMBEDDING_BATCH};

/// Tokens held back from the provider ceiling.
pub const TOKEN_SAFETY_MARGIN: usize = 200;

/// A single embedding with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub embedding: Vec<f32>,
    pub model: String,
    pub token_usage: u64,
}

/// Embeddings for a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEmbedding {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub token_usage: u64,
}

pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    char_budget: usize,
    batch_size: usize,
    batch_pause: Duration,
}

/// Character budget for a provider with the given token ceiling.
pub fn char_budget_for(max_input_tokens: usize) -> usize {
    max_input_tokens
        .saturating_sub(TOKEN_SAFETY_MARGIN)
        .max(max_input_tokens / 2)
        .max(1)
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::with_limits(
            provider,
            char_budget_for(config.max_input_tokens),
            config.batch_size,
            config.batch_pause(),
        )
    }

    pub fn with_limits(
        provider: Arc<dyn EmbeddingProvider>,
        char_budget: usize,
        batch_size: usize,
        batch_pause: Duration,
    ) -> Self {
        Self {
            provider,
            char_budget: char_budget.max(1),
            batch_size: batch_size.clamp(1, MAX_EMBEDDING_BATCH),
            batch_pause,
        }
    }

    pub fn char_budget(&self) -> usize {
        self.char_budget
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Sanitize and truncate text to the character budget.
    pub fn prepare(&self, text: &str) -> Result<String> {
        let clean = sanitize_text(text)?;
        let (prepared, truncated) = truncate_chars(&clean, self.char_budget);
        if truncated {
            tracing::debug!(
                original_chars = clean.chars().count(),
                budget = self.char_budget,
                "truncated embedding input"
            );
        }
        Ok(prepared)
    }

    /// Embed one text with a single provider call.
    ///
    /// # Errors
    ///
    /// [`RecallError::Validation`] for text that is empty after
    /// sanitization; provider errors propagate unchanged.
    pub async fn embed_one(&self, text: &str) -> Result<Embedding> {
        let prepared = self.prepare(text)?;
        self.call_single(prepared).await
    }

    async fn call_single(&self, input: String) -> Result<Embedding> {
        let output = self.provider.embed(&[input]).await?;
        let embedding = output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::provider("Empty embedding response"))?;
        Ok(Embedding {
            embedding,
            model: output.model,
            token_usage: output.tokens,
        })
    }

    /// Embed independent texts in sequential provider-safe batches.
    ///
    /// Each text is truncated individually. A cooperative pause separates
    /// consecutive batch calls.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<BatchEmbedding> {
        let prepared = texts
            .iter()
            .map(|t| self.prepare(t))
            .collect::<Result<Vec<_>>>()?;

        let mut embeddings = Vec::with_capacity(prepared.len());
        let mut token_usage = 0;
        let mut model = self.provider.model_name().to_string();
        let batch_count = prepared.len().div_ceil(self.batch_size);

        for (i, batch) in prepared.chunks(self.batch_size).enumerate() {
            if i > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            tracing::debug!(batch = i + 1, of = batch_count, size = batch.len(), "embedding batch");

            let output = self.provider.embed(batch).await?;
            if output.embeddings.len() != batch.len() {
                return Err(RecallError::provider(format!(
                    "provider returned {} embeddings for a batch of {}",
                    output.embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(output.embeddings);
            token_usage += output.tokens;
            model = output.model;
        }

        Ok(BatchEmbedding {
            embeddings,
            model,
            token_usage,
        })
    }

    /// Embed text that may exceed the character budget.
    ///
    /// Text within budget is embedded directly. Longer text is split with
    /// the chunker and every chunk is embedded in its own call; a failing
    /// chunk is retried once truncated to half its length. The chunk
    /// vectors are averaged into one, which discards position and weights
    /// every chunk equally.
    pub async fn embed_long_text(&self, text: &str) -> Result<Embedding> {
        let clean = sanitize_text(text)?;
        if clean.chars().count() <= self.char_budget {
            return self.call_single(clean).await;
        }

        let pieces = split_text(&clean, &ChunkOptions::new(self.char_budget, 0));
        tracing::debug!(chunks = pieces.len(), "embedding long text piecewise");

        let mut vectors = Vec::with_capacity(pieces.len());
        let mut token_usage = 0;
        let mut model = self.provider.model_name().to_string();

        for (i, piece) in pieces.into_iter().enumerate() {
            let half = (piece.chars().count() / 2).max(1);
            let embedded = match self.call_single(piece.clone()).await {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!(
                        chunk = i,
                        error = %err,
                        "chunk embedding failed; retrying truncated"
                    );
                    let (shorter, _) = truncate_chars(&piece, half);
                    self.call_single(shorter).await?
                }
            };
            token_usage += embedded.token_usage;
            model = embedded.model;
            vectors.push(embedded.embedding);
        }

        Ok(Embedding {
            embedding: mean_pool(&vectors)?,
            model,
            token_usage,
        })
    }
}
