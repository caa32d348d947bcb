//! Scripted embedding provider
//!
//! Returns pinned vectors for exact texts and falls back to the
//! deterministic hash embedder otherwise. Lets a test stage precise cosine
//! similarities between specific materials.

use std::collections::HashMap;

use async_trait::async_trait;
use mnemon_core::{EmbedError, EmbeddingProvider, HashEmbedding};

/// Provider with per-text pinned vectors
pub struct ScriptedEmbedding {
    dims: usize,
    pins: HashMap<String, Vec<f32>>,
    fallback: HashEmbedding,
}

impl ScriptedEmbedding {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            pins: HashMap::new(),
            fallback: HashEmbedding::new(dims),
        }
    }

    /// Pin the vector returned for an exact text; the vector is padded with
    /// zeros to the provider dimension and L2-normalized
    pub fn pin(mut self, text: impl Into<String>, vector: &[f32]) -> Self {
        let mut padded = vector.to_vec();
        padded.resize(self.dims, 0.0);
        let norm: f32 = padded.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut padded {
                *x /= norm;
            }
        }
        self.pins.insert(text.into(), padded);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedding {
    fn model_id(&self) -> &str {
        "scripted-v1"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            match self.pins.get(text) {
                Some(vector) => out.push(vector.clone()),
                None => {
                    let mut fallback = self.fallback.embed(std::slice::from_ref(text)).await?;
                    out.push(fallback.pop().expect("one vector per input"));
                }
            }
        }
        Ok(out)
    }
}
