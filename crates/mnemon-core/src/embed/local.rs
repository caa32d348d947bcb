//! Local embedding provider
//!
//! On-device inference through fastembed (ONNX). Model weights are fetched on
//! first use and cached under `MNEMON_FASTEMBED_CACHE` or the current
//! directory. Vectors are Matryoshka-truncated from 768 to 256 dimensions and
//! renormalized.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbedError, EmbeddingProvider};

/// Dimensions after Matryoshka truncation (768 → 256)
pub const LOCAL_EMBEDDING_DIMENSIONS: usize = 256;

/// Model identifier stored with every vector
pub const LOCAL_EMBEDDING_MODEL: &str = "nomic-ai/nomic-embed-text-v1.5";

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("MNEMON_FASTEMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbedError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let dir = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!("failed to create fastembed cache dir {:?}: {}", dir, e);
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(dir);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize {LOCAL_EMBEDDING_MODEL}: {e}"))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbedError::ProviderUnavailable(format!("model lock poisoned: {e}"))),
        Err(err) => Err(EmbedError::ProviderUnavailable(err.clone())),
    }
}

/// Truncate to the leading dimensions and renormalize (the first N dims of a
/// Matryoshka embedding are the N-dim representation)
fn matryoshka_truncate(mut vector: Vec<f32>, dims: usize) -> Vec<f32> {
    vector.truncate(dims);
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

// ============================================================================
// PROVIDER
// ============================================================================

/// fastembed-backed `EmbeddingProvider`
pub struct LocalEmbedding {
    _unused: (),
}

impl LocalEmbedding {
    pub fn new() -> Self {
        Self { _unused: () }
    }

    /// Eagerly initialize the model (downloads on first use)
    pub fn init(&self) -> Result<(), EmbedError> {
        get_model().map(|_| ())
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    fn model_id(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSIONS
    }

    fn max_batch(&self) -> usize {
        32
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let inputs: Vec<String> = texts.to_vec();
        // Inference is CPU-bound; keep it off the async scheduler
        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = get_model()?;
            model
                .embed(inputs, None)
                .map_err(|e| EmbedError::ProviderUnavailable(format!("inference failed: {e}")))
        })
        .await
        .map_err(|e| EmbedError::ProviderUnavailable(format!("inference task failed: {e}")))??;

        Ok(vectors
            .into_iter()
            .map(|v| matryoshka_truncate(v, LOCAL_EMBEDDING_DIMENSIONS))
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
