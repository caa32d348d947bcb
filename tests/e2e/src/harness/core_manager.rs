//! Test Core Manager
//!
//! Provides isolated `MemoryCore` instances for testing:
//! - Temporary databases that are automatically cleaned up
//! - Configurable embedding providers and core configuration
//! - Concurrent test isolation (one database per instance)

use std::sync::Arc;

use mnemon_core::{CoreConfig, EmbeddingProvider, HashEmbedding, MemoryCore};
use tempfile::TempDir;

/// Manager for an isolated core instance
///
/// The backing database lives in a temporary directory that is deleted when
/// the manager is dropped.
pub struct TestCore {
    /// The core under test
    pub core: MemoryCore,
    /// Temporary directory (kept alive to prevent premature deletion)
    _temp_dir: TempDir,
}

impl TestCore {
    /// Core with the default configuration and the deterministic hash
    /// embedding provider
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    /// Core with a custom configuration and the hash provider
    pub fn with_config(config: CoreConfig) -> Self {
        Self::with_provider(Arc::new(HashEmbedding::new(config.embedding_dim)), config)
    }

    /// Core with a custom provider and configuration
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>, config: CoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let core = MemoryCore::open(&temp_dir.path().join("mnemon.db"), provider, config)
            .expect("failed to open test core");
        Self {
            core,
            _temp_dir: temp_dir,
        }
    }
}

impl Default for TestCore {
    fn default() -> Self {
        Self::new()
    }
}
