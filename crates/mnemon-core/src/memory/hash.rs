//! Content hashing and text normalization
//!
//! The content hash must be stable across whitespace and case variants:
//! Unicode NFC, ASCII-lowercase fold, whitespace runs collapsed to a single
//! space, then trimmed, hashed with xxh3 (64-bit).

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;
use xxhash_rust::xxh3::xxh3_64;

/// Normalize text for hashing: NFC, ASCII-lowercase, collapsed whitespace, trimmed
pub fn normalize_for_hash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.nfc() {
        if c.is_whitespace() {
            in_whitespace = true;
            continue;
        }
        if in_whitespace && !out.is_empty() {
            out.push(' ');
        }
        in_whitespace = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// 64-bit content hash over the normalized form of `text`
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(normalize_for_hash(text).as_bytes())
}

/// Content hash of an item: normalized summary + body
pub fn item_content_hash(summary: &str, body: &str) -> u64 {
    content_hash(&format!("{summary}\n{body}"))
}

/// Truncate to at most `max` grapheme clusters
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut end = text.len();
    let mut count = 0usize;
    for (offset, _grapheme) in text.grapheme_indices(true) {
        if count == max {
            end = offset;
            break;
        }
        count += 1;
    }
    text[..end].to_string()
}

// ============================================================================
// TESTS
// ============================================================================
