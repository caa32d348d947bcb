//! # Mnemon Core
//!
//! Workspace-isolated context memory for LLM-driven tooling:
//!
//! - **Ingestion**: chat transcripts, code diffs, and execution logs are
//!   redacted, split into typed candidate items, and consolidated against
//!   existing memory (content-hash dedup, near-duplicate merge, supersession
//!   of contradicted decisions)
//! - **Recall**: items are retrieved by cosine similarity against a stated
//!   purpose, scored under weighted signals (similarity, salience, recency,
//!   usage, kind prior, freshness), and packed under a hard token budget
//! - **Working sets**: a deterministic, structured context package (mission,
//!   constraints, decisions, tasks, runbook, citations) for downstream LLM
//!   calls
//! - **Feedback**: helpful/not-helpful/outdated/duplicate signals adjust
//!   salience with saturating arithmetic and are journaled append-only
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mnemon_core::{CoreConfig, HashEmbedding, Materials, MemoryCore, RecallFilters};
//!
//! let core = MemoryCore::open(
//!     "mnemon.db".as_ref(),
//!     Arc::new(HashEmbedding::new(256)),
//!     CoreConfig::default(),
//! )?;
//!
//! // Ingest a conversation
//! let result = core
//!     .ingest("default", "thread-1", Materials::chat("User: We must use JWT."), None)
//!     .await?;
//!
//! // Recall against a purpose under a token budget
//! let recall = core
//!     .recall("default", "thread-1", "implement auth", 4000, RecallFilters::default(), None)
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `local-inference`: on-device embedding provider backed by fastembed

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod consolidate;
mod core;
pub mod deadline;
pub mod embed;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod index;
pub mod memory;
pub mod rank;
pub mod redact;
pub mod store;
pub mod working_set;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Façade
pub use crate::core::{
    BackfillReport, ExpandForm, Expanded, IngestResult, ItemRecord, ItemSummary, Materials,
    MemoryCore, RecallFilters, RecallResult,
};

// Data model
pub use memory::{
    content_hash, id_sort_key, item_content_hash, normalize_for_hash, truncate_graphemes,
    Artifact, ContentType, FeedbackRecord, FeedbackSignal, ItemKind, ItemMutation, ItemState,
    ItemSubtype, Link, LinkType, MemoryItem, MemoryStats, SourceSpan,
};

// Configuration
pub use config::{
    ConsolidationConfig, CoreConfig, DeadlineConfig, EmbedConfig, RankConfig, RankWeights,
    TokenEstimator, WorkingSetConfig,
};

// Errors & deadlines
pub use deadline::Deadline;
pub use error::{MemoryError, Result};

// Embedding
pub use embed::{EmbedError, EmbedderGateway, EmbeddingProvider, HashEmbedding};

#[cfg(feature = "local-inference")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-inference")))]
pub use embed::local::{LocalEmbedding, LOCAL_EMBEDDING_DIMENSIONS, LOCAL_EMBEDDING_MODEL};

// Vector index
pub use index::{cosine_similarity, IndexError, SearchFilter, VectorIndex, VectorMeta};

// Storage
pub use store::{MemoryStore, NewItem, StoreError, StoreResult};

// Pipeline stages
pub use consolidate::{ConsolidationReport, Consolidator, RejectedCandidate};
pub use extract::{extract, Candidate, SUMMARY_MAX_GRAPHEMES};
pub use feedback::{FeedbackApplier, FeedbackOutcome};
pub use rank::{PurposeCues, RankedItem, Ranker};
pub use working_set::{ArtifactInfo, ArtifactRef, WorkingSet, WorkingSetBuilder};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CoreConfig, Deadline, ExpandForm, Expanded, FeedbackSignal, HashEmbedding, IngestResult,
        ItemKind, ItemState, ItemSubtype, Materials, MemoryCore, MemoryError, MemoryItem,
        RecallFilters, RecallResult, Result, WorkingSet,
    };
}
