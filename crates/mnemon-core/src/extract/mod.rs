//! Extractor
//!
//! Parses raw materials (chat transcripts, unified diffs, execution logs)
//! into ordered candidate items with typed subtypes, byte-offset spans into
//! the source artifact, and initial salience. Extraction is pure and
//! deterministic: identical redacted input yields an identical candidate
//! list.

mod chat;
mod diff;
mod logs;

/// Cue checks shared with the consolidator's polarity detection
pub(crate) mod chat_cues {
    pub(crate) use super::chat::{is_negated, mentions_replacement};
}

use crate::memory::{truncate_graphemes, Artifact, ContentType, ItemKind, ItemSubtype, SourceSpan};

/// Maximum summary length in grapheme clusters
pub const SUMMARY_MAX_GRAPHEMES: usize = 280;

// ============================================================================
// CANDIDATE
// ============================================================================

/// A candidate item produced by extraction, not yet consolidated
#[derive(Debug, Clone)]
pub struct Candidate {
    pub subtype: ItemSubtype,
    /// Cleaned representation, at most 280 graphemes
    pub summary: String,
    /// Full relevant span text
    pub body: String,
    /// Byte offsets into the artifact body
    pub span: SourceSpan,
    pub salience: f64,
    /// Subtype-specific attributes
    pub payload: Option<serde_json::Value>,
}

impl Candidate {
    /// Build a candidate from a span of the artifact, deriving summary,
    /// salience and kind-consistent defaults from the subtype
    pub(crate) fn from_span(
        subtype: ItemSubtype,
        body: &str,
        span: SourceSpan,
        payload: Option<serde_json::Value>,
    ) -> Self {
        let cleaned = body.split_whitespace().collect::<Vec<_>>().join(" ");
        Self {
            subtype,
            summary: truncate_graphemes(&cleaned, SUMMARY_MAX_GRAPHEMES),
            body: body.to_string(),
            span,
            salience: subtype.initial_salience(),
            payload,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.subtype.kind()
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Extract candidates from an artifact's redacted body
pub fn extract(artifact: &Artifact) -> Vec<Candidate> {
    match artifact.content_type {
        ContentType::Chat => chat::extract(&artifact.body),
        ContentType::Diff => diff::extract(&artifact.body),
        ContentType::Logs => logs::extract(&artifact.body),
    }
}

// ============================================================================
// TESTS
// ============================================================================
