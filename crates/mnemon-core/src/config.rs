//! Core configuration
//!
//! One plain struct carrying every recognized option, validated once at
//! construction. Components borrow the slices they need.

use std::time::Duration;

use crate::error::{MemoryError, Result};

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Token estimator used for working-set budgeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenEstimator {
    /// `ceil(chars / 4)` - cheap and model-agnostic
    #[default]
    CharsOver4,
    /// Whitespace-separated token count
    WhitespaceTokens,
}

impl TokenEstimator {
    /// Estimate the token cost of `text`
    pub fn estimate(&self, text: &str) -> usize {
        match self {
            TokenEstimator::CharsOver4 => text.chars().count().div_ceil(4),
            TokenEstimator::WhitespaceTokens => text.split_whitespace().count(),
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "chars_over_4" => Some(TokenEstimator::CharsOver4),
            "whitespace_tokens" => Some(TokenEstimator::WhitespaceTokens),
            _ => None,
        }
    }
}

// ============================================================================
// RANK WEIGHTS
// ============================================================================

/// Weights of the ranking signals; must sum to 1.0 (± 0.01)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankWeights {
    pub similarity: f64,
    pub salience: f64,
    pub recency: f64,
    pub usage: f64,
    pub kind: f64,
    pub freshness: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.45,
            salience: 0.15,
            recency: 0.15,
            usage: 0.10,
            kind: 0.10,
            freshness: 0.05,
        }
    }
}

impl RankWeights {
    pub fn sum(&self) -> f64 {
        self.similarity + self.salience + self.recency + self.usage + self.kind + self.freshness
    }
}

// ============================================================================
// SECTION CONFIGS
// ============================================================================

/// Consolidation similarity thresholds
#[derive(Debug, Clone, Copy)]
pub struct ConsolidationConfig {
    /// Exact-duplicate threshold; 1.0 means content-hash equality only
    pub exact_threshold: f64,
    /// Near-duplicate merge threshold
    pub near_threshold: f64,
    /// Weak-association threshold
    pub refer_threshold: f64,
    /// Contradictory-decision supersession threshold
    pub supersede_threshold: f64,
    /// Neighbors fetched per candidate
    pub neighbor_limit: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 1.0,
            near_threshold: 0.94,
            refer_threshold: 0.86,
            supersede_threshold: 0.88,
            neighbor_limit: 16,
        }
    }
}

/// Ranking parameters beyond the weights
#[derive(Debug, Clone)]
pub struct RankConfig {
    pub weights: RankWeights,
    /// Recency half-life driver for semantic items (seconds)
    pub tau_semantic_seconds: u64,
    /// Recency half-life driver for episodic items (seconds)
    pub tau_episodic_seconds: u64,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            weights: RankWeights::default(),
            tau_semantic_seconds: 604_800,
            tau_episodic_seconds: 129_600,
        }
    }
}

/// Embedder gateway tuning
#[derive(Debug, Clone, Copy)]
pub struct EmbedConfig {
    /// Batch ceiling; the provider's own maximum also applies
    pub max_batch: usize,
    /// Retry attempts per batch before marking inputs pending
    pub max_retries: u32,
    /// Base of the exponential backoff between retries
    pub base_backoff: Duration,
    /// Concurrent in-flight batches per ingestion call
    pub max_inflight: usize,
    /// LRU cache capacity (entries)
    pub cache_capacity: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            max_batch: 128,
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_inflight: 8,
            cache_capacity: 4096,
        }
    }
}

/// Working-set assembly options
#[derive(Debug, Clone)]
pub struct WorkingSetConfig {
    pub token_estimator: TokenEstimator,
    /// Token ceiling for the mission paragraph
    pub mission_max_tokens: usize,
    /// Phrases that mark a requirement as an open question
    pub uncertainty_lexicon: Vec<String>,
}

impl Default for WorkingSetConfig {
    fn default() -> Self {
        Self {
            token_estimator: TokenEstimator::default(),
            mission_max_tokens: 120,
            uncertainty_lexicon: vec![
                "tbd".to_string(),
                "unclear".to_string(),
                "unknown".to_string(),
                "not sure".to_string(),
                "to be decided".to_string(),
                "open question".to_string(),
            ],
        }
    }
}

/// Per-operation default deadlines
#[derive(Debug, Clone, Copy)]
pub struct DeadlineConfig {
    pub ingest: Duration,
    pub recall: Duration,
    pub build_working_set: Duration,
    pub feedback: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            ingest: Duration::from_secs(30),
            recall: Duration::from_secs(5),
            build_working_set: Duration::from_secs(1),
            feedback: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// CORE CONFIG
// ============================================================================

/// Complete configuration for a `MemoryCore` instance
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Active embedding model; `None` follows the provider's model id
    pub embedding_model_id: Option<String>,
    /// Must equal the provider's output dimension
    pub embedding_dim: usize,
    /// Extra `(name, regex)` redaction patterns appended to the defaults
    pub redaction_patterns: Vec<(String, String)>,
    pub consolidation: ConsolidationConfig,
    pub rank: RankConfig,
    pub working_set: WorkingSetConfig,
    pub embed: EmbedConfig,
    pub deadlines: DeadlineConfig,
    /// Hard cap on `k` per vector-index search
    pub topk_cap: usize,
    /// Ranker candidate pool size
    pub pool_size: usize,
    /// Whether ranking may consider items from other threads in the workspace
    pub cross_thread: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding_model_id: None,
            embedding_dim: 256,
            redaction_patterns: Vec::new(),
            consolidation: ConsolidationConfig::default(),
            rank: RankConfig::default(),
            working_set: WorkingSetConfig::default(),
            embed: EmbedConfig::default(),
            deadlines: DeadlineConfig::default(),
            topk_cap: 256,
            pool_size: 64,
            cross_thread: false,
        }
    }
}

impl CoreConfig {
    /// Validate invariants the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        let sum = self.rank.weights.sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(MemoryError::InputInvalid(format!(
                "rank weights must sum to 1.0 +/- 0.01, got {sum:.4}"
            )));
        }
        if self.embedding_dim == 0 {
            return Err(MemoryError::InputInvalid(
                "embedding_dim must be positive".to_string(),
            ));
        }
        for (threshold, name) in [
            (self.consolidation.near_threshold, "near_threshold"),
            (self.consolidation.refer_threshold, "refer_threshold"),
            (self.consolidation.supersede_threshold, "supersede_threshold"),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(MemoryError::InputInvalid(format!(
                    "consolidation.{name} must lie in [0, 1], got {threshold}"
                )));
            }
        }
        if self.pool_size == 0 || self.topk_cap == 0 {
            return Err(MemoryError::InputInvalid(
                "pool_size and topk_cap must be positive".to_string(),
            ));
        }
        for (name, pattern) in &self.redaction_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(MemoryError::InputInvalid(format!(
                    "redaction pattern {name:?} is not a valid regex"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
