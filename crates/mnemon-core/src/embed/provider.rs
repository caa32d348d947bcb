//! Embedding providers
//!
//! The gateway talks to any backend through `EmbeddingProvider`. The
//! deterministic `HashEmbedding` provider needs no model files and is the
//! default for tests and air-gapped deployments.

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use super::EmbedError;

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A backend capable of producing fixed-dimension embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable model identifier; vectors are keyed by it
    fn model_id(&self) -> &str;

    /// Output dimension of every vector
    fn dimensions(&self) -> usize;

    /// Provider-imposed batch ceiling
    fn max_batch(&self) -> usize {
        128
    }

    /// One vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

// ============================================================================
// HASH EMBEDDING (deterministic)
// ============================================================================

/// Feature-hashing embedder: each word hashes to a signed slot, the result is
/// L2-normalized. Texts sharing vocabulary land near each other; identical
/// texts embed identically. Deterministic across processes.
pub struct HashEmbedding {
    dims: usize,
    model_id: String,
}

impl HashEmbedding {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            model_id: "hash-embed-v1".to_string(),
        }
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let h = xxh3_64(word.to_ascii_lowercase().as_bytes());
            let slot = (h % self.dims as u64) as usize;
            let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
            vector[slot] += sign;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        } else {
            // Empty text still needs a unit vector
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
