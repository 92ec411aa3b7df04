//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helpers for similarity and chunk pooling.
//!
//! Network providers (OpenAI, Ollama) and the local fastembed provider
//! live in the `context-recall` app crate. [`HashEmbeddingProvider`] is a
//! deterministic, offline provider for tests and local experiments.

use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RecallError, Result};

/// Output of a single provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingOutput {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Model that produced the vectors.
    pub model: String,
    /// Tokens billed for the call (0 when the provider does not report usage).
    pub tokens: u64,
}

/// Trait for embedding providers.
///
/// Implementations take already-sanitized, already-truncated input. One
/// call embeds the whole slice; callers are responsible for keeping the
/// slice within the provider's batch limit.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed every input in one provider call.
    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingOutput>;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` when either vector has zero
/// magnitude.
///
/// # Errors
///
/// [`RecallError::DimensionMismatch`] when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RecallError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Average vectors dimension by dimension.
///
/// This is a lossy summary of a chunked document: every chunk weighs the
/// same and positional information is discarded. It is used so that a
/// long document still yields one vector when embedded piecewise.
///
/// # Errors
///
/// - [`RecallError::Validation`] for an empty input.
/// - [`RecallError::DimensionMismatch`] if the vectors disagree in length.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| RecallError::validation("cannot pool zero embeddings"))?;
    let dims = first.len();
    let mut sum = vec![0.0f32; dims];

    for v in vectors {
        if v.len() != dims {
            return Err(RecallError::DimensionMismatch {
                left: dims,
                right: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += x;
        }
    }

    let n = vectors.len() as f32;
    Ok(sum.into_iter().map(|x| x / n).collect())
}

/// Deterministic feature-hashing provider.
///
/// Each whitespace token is hashed into one of `dims` buckets, so texts
/// sharing words point in similar directions. Every call is recorded,
/// and inputs containing a configured marker fail, which makes it
/// suitable for exercising retry and fail-open paths.
pub struct HashEmbeddingProvider {
    dims: usize,
    fail_marker: Option<String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl HashEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self {
            dims: dims.max(1),
            fail_marker: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail any call whose inputs contain `marker`.
    pub fn failing_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_marker = Some(marker.into());
        self
    }

    /// Every batch this provider has been asked to embed, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// The vector this provider produces for `text`.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, inputs: &[String]) -> Result<EmbeddingOutput> {
        self.calls
            .lock()
            .map_err(|_| RecallError::provider("hash provider call log poisoned"))?
            .push(inputs.to_vec());

        if let Some(marker) = &self.fail_marker {
            if inputs.iter().any(|t| t.contains(marker.as_str())) {
                return Err(RecallError::provider(format!(
                    "hash provider refused input containing '{}'",
                    marker
                )));
            }
        }

        let tokens = inputs
            .iter()
            .map(|t| t.split_whitespace().count() as u64)
            .sum();
        Ok(EmbeddingOutput {
            embeddings: inputs.iter().map(|t| self.vector_for(t)).collect(),
            model: self.model_name().to_string(),
            tokens,
        })
    }
}
