//! Embedder Gateway
//!
//! Front door for all embedding work: batches inputs up to the provider
//! ceiling, caches vectors by `(content_hash, model_id)`, retries failed
//! batches with exponential backoff, and honors the caller's deadline.
//! Inputs still unresolved after retries are reported as pending; they never
//! block ingestion.

mod provider;

#[cfg(feature = "local-inference")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-inference")))]
pub mod local;

pub use provider::{EmbeddingProvider, HashEmbedding};

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::EmbedConfig;
use crate::deadline::Deadline;
use crate::memory::content_hash;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbedError {
    /// Provider could not be reached; retryable
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned something unusable; fatal to the batch
    #[error("embedding provider returned malformed output: {0}")]
    ProviderMalformed(String),
    /// Invalid input (empty batch, oversized text)
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Batched, cached, retrying embedding front-end
pub struct EmbedderGateway {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<(u64, String), Vec<f32>>>,
    config: EmbedConfig,
}

impl EmbedderGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbedConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    /// Active model id (drives retrieval gating)
    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    /// Vector dimension of the active model
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed every text; `None` entries are pending (abandoned on deadline or
    /// failed after retries). Returns `ProviderUnavailable` only when the
    /// provider failed and not a single vector was produced in this call.
    pub async fn embed_texts(
        &self,
        texts: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Option<Vec<f32>>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock().expect("embed cache lock poisoned");
            for (i, text) in texts.iter().enumerate() {
                let key = (content_hash(text), self.provider.model_id().to_string());
                match cache.get(&key) {
                    Some(vector) => results[i] = Some(vector.clone()),
                    None => misses.push(i),
                }
            }
        }

        if misses.is_empty() {
            return Ok(results);
        }

        let batch_size = self.config.max_batch.min(self.provider.max_batch()).max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_inflight.max(1)));
        let mut join_set: JoinSet<(Vec<usize>, Result<Vec<Vec<f32>>, EmbedError>)> = JoinSet::new();

        for chunk in misses.chunks(batch_size) {
            let indices: Vec<usize> = chunk.to_vec();
            let batch: Vec<String> = indices.iter().map(|&i| texts[i].clone()).collect();
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config;
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                let outcome = embed_batch_with_retry(provider, &batch, config, deadline).await;
                (indices, outcome)
            });
        }

        let mut provider_failed = false;
        while let Some(joined) = join_set.join_next().await {
            let Ok((indices, outcome)) = joined else {
                provider_failed = true;
                continue;
            };
            match outcome {
                Ok(vectors) => {
                    let mut cache = self.cache.lock().expect("embed cache lock poisoned");
                    for (slot, vector) in indices.into_iter().zip(vectors) {
                        let key = (
                            content_hash(&texts[slot]),
                            self.provider.model_id().to_string(),
                        );
                        cache.put(key, vector.clone());
                        results[slot] = Some(vector);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embedding batch unresolved, items left pending");
                    provider_failed = true;
                }
            }
        }

        if provider_failed && results.iter().all(|r| r.is_none()) {
            return Err(EmbedError::ProviderUnavailable(
                "no vectors produced in this call".to_string(),
            ));
        }
        Ok(results)
    }

    /// Embed a single text
    pub async fn embed_one(
        &self,
        text: &str,
        deadline: Deadline,
    ) -> Result<Option<Vec<f32>>, EmbedError> {
        let mut vectors = self.embed_texts(&[text.to_string()], deadline).await?;
        Ok(vectors.pop().flatten())
    }
}

/// Retry loop for one batch. Unavailable errors back off exponentially up to
/// the retry budget; malformed output and deadline expiry abandon the batch.
async fn embed_batch_with_retry(
    provider: Arc<dyn EmbeddingProvider>,
    batch: &[String],
    config: EmbedConfig,
    deadline: Deadline,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut attempt: u32 = 0;
    loop {
        if deadline.expired() {
            return Err(EmbedError::ProviderUnavailable(
                "deadline expired before batch completed".to_string(),
            ));
        }

        let call = provider.embed(batch);
        let outcome = match deadline.remaining() {
            Some(remaining) => match tokio::time::timeout(remaining, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(EmbedError::ProviderUnavailable(
                        "deadline expired mid-batch".to_string(),
                    ));
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(vectors) => {
                validate_batch(&vectors, batch.len(), provider.dimensions())?;
                return Ok(vectors);
            }
            Err(EmbedError::ProviderUnavailable(reason)) => {
                if attempt >= config.max_retries {
                    return Err(EmbedError::ProviderUnavailable(reason));
                }
                let backoff = config.base_backoff * 2u32.saturating_pow(attempt);
                let sleep = match deadline.remaining() {
                    Some(remaining) => backoff.min(remaining),
                    None => backoff,
                };
                tokio::time::sleep(sleep).await;
                attempt += 1;
            }
            Err(fatal) => return Err(fatal),
        }
    }
}

/// One vector per input, right dimension, finite nonzero norm
fn validate_batch(
    vectors: &[Vec<f32>],
    expected_len: usize,
    expected_dim: usize,
) -> Result<(), EmbedError> {
    if vectors.len() != expected_len {
        return Err(EmbedError::ProviderMalformed(format!(
            "expected {expected_len} vectors, got {}",
            vectors.len()
        )));
    }
    for vector in vectors {
        if vector.len() != expected_dim {
            return Err(EmbedError::ProviderMalformed(format!(
                "expected dimension {expected_dim}, got {}",
                vector.len()
            )));
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            return Err(EmbedError::ProviderMalformed(
                "vector has invalid L2 norm".to_string(),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
