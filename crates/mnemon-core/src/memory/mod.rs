//! Memory module - Core types and data structures
//!
//! Implements the context memory data model:
//! - Memory items (semantic + episodic) with a shared envelope
//! - Typed links between items (duplicate_of, supersedes, refers_to, caused_by)
//! - Immutable artifacts holding redacted source material
//! - Append-only feedback records

mod hash;
mod item;

pub use hash::{content_hash, item_content_hash, normalize_for_hash, truncate_graphemes};
pub use item::{Artifact, ItemMutation, MemoryItem, SourceSpan};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ITEM KINDS
// ============================================================================

/// The two memory systems an item can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Durable knowledge distilled from materials
    #[default]
    Semantic,
    /// A time-bounded event or observation
    Episodic,
}

impl ItemKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Semantic => "semantic",
            ItemKind::Episodic => "episodic",
        }
    }

    /// Identifier prefix for minted ids (`S###` / `E###`)
    pub fn id_prefix(&self) -> char {
        match self {
            ItemKind::Semantic => 'S',
            ItemKind::Episodic => 'E',
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" => Some(ItemKind::Semantic),
            "episodic" => Some(ItemKind::Episodic),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ITEM SUBTYPES
// ============================================================================

/// Subtype of a memory item; determines its kind and initial salience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSubtype {
    // Semantic subtypes
    Decision,
    Requirement,
    Constraint,
    Task,
    Entity,
    Preference,
    // Episodic subtypes
    Error,
    Log,
    TestFailure,
    Attempt,
    Observation,
}

impl ItemSubtype {
    /// The kind this subtype belongs to
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemSubtype::Decision
            | ItemSubtype::Requirement
            | ItemSubtype::Constraint
            | ItemSubtype::Task
            | ItemSubtype::Entity
            | ItemSubtype::Preference => ItemKind::Semantic,
            ItemSubtype::Error
            | ItemSubtype::Log
            | ItemSubtype::TestFailure
            | ItemSubtype::Attempt
            | ItemSubtype::Observation => ItemKind::Episodic,
        }
    }

    /// Salience assigned to freshly extracted candidates of this subtype
    pub fn initial_salience(&self) -> f64 {
        match self {
            ItemSubtype::Decision => 0.8,
            ItemSubtype::Requirement => 0.75,
            ItemSubtype::Constraint => 0.7,
            ItemSubtype::Task => 0.6,
            ItemSubtype::Entity => 0.5,
            ItemSubtype::Preference => 0.55,
            ItemSubtype::Error => 0.75,
            ItemSubtype::TestFailure => 0.8,
            ItemSubtype::Log => 0.4,
            ItemSubtype::Attempt => 0.5,
            ItemSubtype::Observation => 0.45,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemSubtype::Decision => "decision",
            ItemSubtype::Requirement => "requirement",
            ItemSubtype::Constraint => "constraint",
            ItemSubtype::Task => "task",
            ItemSubtype::Entity => "entity",
            ItemSubtype::Preference => "preference",
            ItemSubtype::Error => "error",
            ItemSubtype::Log => "log",
            ItemSubtype::TestFailure => "test_failure",
            ItemSubtype::Attempt => "attempt",
            ItemSubtype::Observation => "observation",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "decision" => Some(ItemSubtype::Decision),
            "requirement" => Some(ItemSubtype::Requirement),
            "constraint" => Some(ItemSubtype::Constraint),
            "task" => Some(ItemSubtype::Task),
            "entity" => Some(ItemSubtype::Entity),
            "preference" => Some(ItemSubtype::Preference),
            "error" => Some(ItemSubtype::Error),
            "log" => Some(ItemSubtype::Log),
            "test_failure" => Some(ItemSubtype::TestFailure),
            "attempt" => Some(ItemSubtype::Attempt),
            "observation" => Some(ItemSubtype::Observation),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemSubtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ITEM STATE
// ============================================================================

/// Lifecycle state of an item
///
/// `active → superseded` when a newer decision supersedes it,
/// `active|superseded → retired` via feedback or external cleanup.
/// `retired` is terminal for ranking and retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Active,
    Superseded,
    Retired,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Active => "active",
            ItemState::Superseded => "superseded",
            ItemState::Retired => "retired",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(ItemState::Active),
            "superseded" => Some(ItemState::Superseded),
            "retired" => Some(ItemState::Retired),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// LINKS
// ============================================================================

/// Type of a directed edge between two items in the same workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Equivalence pointer to a canonical item; chains are resolved on write
    DuplicateOf,
    /// Newer decision invalidates an older one; forms a forest, never a cycle
    Supersedes,
    /// Weak association
    RefersTo,
    /// Episodic → semantic causation
    CausedBy,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::DuplicateOf => "duplicate_of",
            LinkType::Supersedes => "supersedes",
            LinkType::RefersTo => "refers_to",
            LinkType::CausedBy => "caused_by",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "duplicate_of" => Some(LinkType::DuplicateOf),
            "supersedes" => Some(LinkType::Supersedes),
            "refers_to" => Some(LinkType::RefersTo),
            "caused_by" => Some(LinkType::CausedBy),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed typed edge between two items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub from_id: String,
    pub to_id: String,
    pub link_type: LinkType,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// ARTIFACT CONTENT TYPES
// ============================================================================

/// Content type tag of an ingested artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Chat,
    Diff,
    Logs,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Chat => "chat",
            ContentType::Diff => "diff",
            ContentType::Logs => "logs",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Some(ContentType::Chat),
            "diff" => Some(ContentType::Diff),
            "logs" => Some(ContentType::Logs),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// FEEDBACK
// ============================================================================

/// Client feedback signal on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSignal {
    Helpful,
    NotHelpful,
    Outdated,
    Duplicate,
}

impl FeedbackSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackSignal::Helpful => "helpful",
            FeedbackSignal::NotHelpful => "not_helpful",
            FeedbackSignal::Outdated => "outdated",
            FeedbackSignal::Duplicate => "duplicate",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "helpful" => Some(FeedbackSignal::Helpful),
            "not_helpful" => Some(FeedbackSignal::NotHelpful),
            "outdated" => Some(FeedbackSignal::Outdated),
            "duplicate" => Some(FeedbackSignal::Duplicate),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in the append-only feedback journal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub item_id: String,
    pub signal: FeedbackSignal,
    /// Signal magnitude in [-1, +1]
    pub magnitude: f64,
    pub at: DateTime<Utc>,
    pub actor: String,
}

// ============================================================================
// IDENTIFIER ORDERING
// ============================================================================

/// Sort key for minted identifiers: `S2` orders before `S10`.
///
/// Identifiers are a letter prefix plus a decimal ordinal; lexicographic
/// comparison would misorder them past nine.
pub fn id_sort_key(id: &str) -> (&str, u64) {
    let split = id
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(id.len());
    let (prefix, digits) = id.split_at(split);
    (prefix, digits.parse().unwrap_or(0))
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Aggregate statistics for one workspace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_items: i64,
    pub semantic_items: i64,
    pub episodic_items: i64,
    pub active_items: i64,
    pub superseded_items: i64,
    pub retired_items: i64,
    pub total_artifacts: i64,
    pub items_with_embeddings: i64,
    pub embeddings_pending: i64,
    pub feedback_records: i64,
    pub oldest_item: Option<DateTime<Utc>>,
    pub newest_item: Option<DateTime<Utc>>,
}

// ============================================================================
// TESTS
// ============================================================================
