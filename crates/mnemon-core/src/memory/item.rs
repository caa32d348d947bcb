//! Memory Item - the atomic unit of memory
//!
//! Two variants (semantic, episodic) share a common envelope and are
//! distinguished by `kind` + `subtype`. Items always carry a span reference
//! into the immutable artifact they were extracted from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentType, ItemKind, ItemState, ItemSubtype};

// ============================================================================
// SOURCE SPAN
// ============================================================================

/// Byte range into the redacted body of a source artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

// ============================================================================
// MEMORY ITEM
// ============================================================================

/// A memory item record
///
/// The summary and body are stored redacted; `content_hash` is computed over
/// the normalized redacted text. `embedding_model_id` is `None` while the
/// item's vector is still pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Minted identifier (`S###` or `E###`), unique per workspace
    pub id: String,
    pub workspace_id: String,
    pub thread_id: String,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    /// Redacted summary, at most 280 graphemes
    pub summary: String,
    /// Redacted full text of the relevant span
    pub body: String,
    /// Accumulated relevance weight in [0, 1]
    pub salience: f64,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<DateTime<Utc>>,
    pub state: ItemState,
    /// Subtype-specific structured attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub source_artifact_id: String,
    pub source_span: SourceSpan,
    /// 64-bit hash over normalized summary + body
    pub content_hash: u64,
    /// Model that produced the stored vector; `None` = embedding pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model_id: Option<String>,
}

impl MemoryItem {
    /// Whether the item participates in retrieval
    pub fn is_retrievable(&self) -> bool {
        self.state != ItemState::Retired
    }

    /// Whether the item is still awaiting its embedding vector
    pub fn embedding_pending(&self) -> bool {
        self.embedding_model_id.is_none()
    }
}

// ============================================================================
// ITEM MUTATION
// ============================================================================

/// Typed mutation applied atomically to a single item
///
/// Delta fields saturate at their bounds; `supersedes` names an item that
/// this item supersedes and is routed through link validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ItemMutation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience_delta: Option<f64>,
    #[serde(default)]
    pub usage_increment: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Refresh `last_accessed_at` to now
    #[serde(default)]
    pub touch_accessed: bool,
}

impl ItemMutation {
    /// A mutation that only bumps the usage counter
    pub fn usage_bump() -> Self {
        Self {
            usage_increment: 1,
            ..Default::default()
        }
    }

    /// A mutation that only refreshes the last-accessed timestamp
    pub fn touch() -> Self {
        Self {
            touch_accessed: true,
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.summary.is_none()
            && self.body.is_none()
            && self.salience_delta.is_none()
            && self.usage_increment == 0
            && self.retired.is_none()
            && self.supersedes.is_none()
            && self.payload.is_none()
            && !self.touch_accessed
    }
}

// ============================================================================
// ARTIFACT
// ============================================================================

/// Immutable raw source material a cluster of items was extracted from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Minted identifier (`A###`), unique per workspace
    pub id: String,
    pub workspace_id: String,
    pub thread_id: String,
    pub content_type: ContentType,
    /// Redacted raw text
    pub body: String,
    /// Hash over the normalized redacted body, used to dedup re-ingestion
    pub content_hash: u64,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
