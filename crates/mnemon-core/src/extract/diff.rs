//! Unified diff extraction
//!
//! Walks hunks and emits one `entity` candidate per distinct changed symbol,
//! detected with language-agnostic declaration patterns. Each candidate
//! carries the file path and hunk coordinates in its payload.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::memory::{ItemSubtype, SourceSpan};

use super::Candidate;

static FILE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+\+\+\s+(?:b/)?(\S+)").expect("file header pattern is valid")
});

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@\s+-(\d+)(?:,\d+)?\s+\+(\d+)(?:,\d+)?\s+@@").expect("hunk header pattern is valid")
});

static SYMBOL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    // Function declarations, class/struct/interface keywords, top-level bindings
    Regex::new(
        r"(?x)
        \b(?:fn|func|function|def|class|struct|interface|trait|impl|enum|type|const|static|let|var)
        \s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("symbol pattern is valid")
});

struct Hunk {
    file: String,
    old_start: u64,
    new_start: u64,
    span: SourceSpan,
    symbols: Vec<String>,
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract candidates from a unified diff
pub fn extract(body: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for hunk in hunks(body) {
        for symbol in &hunk.symbols {
            if !seen.insert((hunk.file.clone(), symbol.clone())) {
                continue;
            }
            let payload = serde_json::json!({
                "file": hunk.file,
                "symbol": symbol,
                "hunk": { "oldStart": hunk.old_start, "newStart": hunk.new_start },
            });
            let summary = format!("{symbol} changed in {}", hunk.file);
            let mut candidate = Candidate::from_span(
                ItemSubtype::Entity,
                &body[hunk.span.start..hunk.span.end],
                hunk.span,
                Some(payload),
            );
            candidate.summary = summary;
            candidates.push(candidate);
        }
    }

    candidates
}

/// Parse hunks with their byte spans and changed symbols
fn hunks(body: &str) -> Vec<Hunk> {
    let mut out: Vec<Hunk> = Vec::new();
    let mut current_file = String::new();
    let mut offset = 0usize;

    for line in body.split_inclusive('\n') {
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        let line_start = offset;
        offset += line.len();

        if let Some(caps) = FILE_HEADER.captures(trimmed) {
            current_file = caps[1].to_string();
            continue;
        }

        if let Some(caps) = HUNK_HEADER.captures(trimmed) {
            let old_start = caps[1].parse().unwrap_or(0);
            let new_start = caps[2].parse().unwrap_or(0);
            out.push(Hunk {
                file: current_file.clone(),
                old_start,
                new_start,
                span: SourceSpan::new(line_start, offset),
                symbols: Vec::new(),
            });
            continue;
        }

        // Changed lines extend the current hunk
        if let Some(hunk) = out.last_mut() {
            let is_change = trimmed.starts_with('+') || trimmed.starts_with('-');
            let is_context = trimmed.starts_with(' ') || trimmed.is_empty();
            if is_change || is_context {
                hunk.span = SourceSpan::new(hunk.span.start, offset);
                if is_change {
                    for caps in SYMBOL_DECL.captures_iter(&trimmed[1..]) {
                        let symbol = caps[1].to_string();
                        if !hunk.symbols.contains(&symbol) {
                            hunk.symbols.push(symbol);
                        }
                    }
                }
            }
        }
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================
