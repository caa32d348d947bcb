//! Ranker
//!
//! Scores candidate items against a purpose under weighted signals, all in
//! [0, 1] before weighting. Ties break by ascending item identifier so the
//! ordering is deterministic.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::RankConfig;
use crate::memory::{id_sort_key, ItemKind, ItemState, ItemSubtype, MemoryItem};

static EPISODIC_CUES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:fix|error|bug)\b").expect("episodic cue pattern is valid"));

static DECISION_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:plan|design|decide)\b").expect("decision cue pattern is valid")
});

/// Kind prior boost applied when the purpose carries matching cue words
const KIND_BOOST: f64 = 0.2;

/// Saturation point of the usage signal: log2(1 + usage) / 6
const USAGE_LOG_DIVISOR: f64 = 6.0;

// ============================================================================
// PURPOSE CUES
// ============================================================================

/// Purpose-conditioned kind prior
#[derive(Debug, Clone, Copy, Default)]
pub struct PurposeCues {
    pub boost_episodic: bool,
    pub boost_decision: bool,
}

impl PurposeCues {
    pub fn from_purpose(purpose: &str) -> Self {
        Self {
            boost_episodic: EPISODIC_CUES.is_match(purpose),
            boost_decision: DECISION_CUES.is_match(purpose),
        }
    }
}

// ============================================================================
// RANKED ITEM
// ============================================================================

/// An item with its final score and per-signal breakdown
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub item: MemoryItem,
    pub score: f64,
    pub similarity: f64,
}

// ============================================================================
// RANKER
// ============================================================================

/// Multi-signal scoring against a purpose
pub struct Ranker<'a> {
    config: &'a RankConfig,
}

impl<'a> Ranker<'a> {
    pub fn new(config: &'a RankConfig) -> Self {
        Self { config }
    }

    /// Score and order a candidate pool. `similarity` is the cosine from the
    /// index where available; items without a vector contribute 0.
    pub fn rank(
        &self,
        pool: Vec<(MemoryItem, Option<f32>)>,
        purpose: &str,
        now: DateTime<Utc>,
    ) -> Vec<RankedItem> {
        let cues = PurposeCues::from_purpose(purpose);

        let mut ranked: Vec<RankedItem> = pool
            .into_iter()
            .map(|(item, similarity)| {
                let similarity = similarity.map(f64::from).unwrap_or(0.0).clamp(0.0, 1.0);
                let score = self.score(&item, similarity, cues, now);
                RankedItem {
                    item,
                    score,
                    similarity,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_sort_key(&a.item.id).cmp(&id_sort_key(&b.item.id)))
        });
        ranked
    }

    fn score(
        &self,
        item: &MemoryItem,
        similarity: f64,
        cues: PurposeCues,
        now: DateTime<Utc>,
    ) -> f64 {
        let weights = &self.config.weights;

        let s_sim = similarity;
        let s_sal = item.salience.clamp(0.0, 1.0);
        let s_rec = self.recency(item, now);
        let s_use = usage_signal(item.usage_count);
        let s_kind = kind_prior(item, cues);
        let s_fresh = if item.state == ItemState::Superseded {
            0.0
        } else {
            1.0
        };

        weights.similarity * s_sim
            + weights.salience * s_sal
            + weights.recency * s_rec
            + weights.usage * s_use
            + weights.kind * s_kind
            + weights.freshness * s_fresh
    }

    /// `exp(-Δt / τ)` with per-kind τ
    fn recency(&self, item: &MemoryItem, now: DateTime<Utc>) -> f64 {
        let tau = match item.kind {
            ItemKind::Semantic => self.config.tau_semantic_seconds,
            ItemKind::Episodic => self.config.tau_episodic_seconds,
        } as f64;
        if tau <= 0.0 {
            return 0.0;
        }
        let elapsed = (now - item.last_accessed_at).num_seconds().max(0) as f64;
        (-elapsed / tau).exp()
    }
}

/// `min(1, log2(1 + usage) / 6)`
fn usage_signal(usage_count: i64) -> f64 {
    let usage = usage_count.max(0) as f64;
    ((1.0 + usage).log2() / USAGE_LOG_DIVISOR).min(1.0)
}

fn kind_prior(item: &MemoryItem, cues: PurposeCues) -> f64 {
    if cues.boost_episodic && item.kind == ItemKind::Episodic {
        return KIND_BOOST;
    }
    if cues.boost_decision && item.subtype == ItemSubtype::Decision {
        return KIND_BOOST;
    }
    0.0
}

// ============================================================================
// TESTS
// ============================================================================
