//! Chat transcript extraction
//!
//! Splits the transcript into turns on line-leading role markers, then emits
//! one candidate per distinct proposition within each turn. Cue phrases
//! decide the subtype; negations are checked before modals so `must not`
//! reads as a constraint, and modals before decision cues so `must use X`
//! reads as a requirement.

use std::sync::LazyLock;

use regex::Regex;

use crate::memory::{ItemSubtype, SourceSpan};

use super::Candidate;

static TURN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^(user|assistant|system)\s*:").expect("turn marker pattern is valid")
});

static CONSTRAINT_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:do\s+not|don't|must\s+not|never|only)\b")
        .expect("constraint cue pattern is valid")
});

static REQUIREMENT_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:must|need(?:s)?\s+to|should|required\s+to|have\s+to)\b")
        .expect("requirement cue pattern is valid")
});

static DECISION_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\blet'?s\b|\blet\s+us\b|\bwe\s+will\b|\bwe'll\b|\bswitch\s+to\b|\binstead\s+of\b|\bwe\s+decided\b|\bgoing\s+with\b|\buse\s+\S+\s+for\b)",
    )
    .expect("decision cue pattern is valid")
});

static PREFERENCE_CUES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:prefer|rather|favorite|ideally|nice\s+to\s+have)\b")
        .expect("preference cue pattern is valid")
});

static ENTITY_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    // Code symbols, paths, dotted/colon-separated identifiers, CamelCase
    Regex::new(r"`[^`]+`|\w+::\w+|\w+\.\w+\(|[a-z0-9]+_[a-z0-9_]+|\b[A-Z][a-z]+[A-Z]\w*\b")
        .expect("entity marker pattern is valid")
});

/// Imperative verbs that open a task addressed to an agent
const TASK_VERBS: &[&str] = &[
    "add", "build", "check", "create", "deploy", "document", "ensure", "fix", "implement",
    "investigate", "migrate", "refactor", "remove", "rename", "run", "test", "update", "verify",
    "write",
];

/// Minimum words for a sentence to count as a proposition
const MIN_PROPOSITION_WORDS: usize = 3;

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract candidates from a chat transcript
pub fn extract(body: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for (turn_start, turn_end, role) in turns(body) {
        let content = &body[turn_start..turn_end];
        for (sentence_start, sentence_end) in sentences(content) {
            let abs_start = turn_start + sentence_start;
            let abs_end = turn_start + sentence_end;
            let sentence = &body[abs_start..abs_end];
            if word_count(sentence) < MIN_PROPOSITION_WORDS {
                continue;
            }
            let subtype = classify(sentence);
            let payload = serde_json::json!({
                "role": role,
                "negated": is_negated(sentence),
                "replacement": mentions_replacement(sentence),
            });
            candidates.push(Candidate::from_span(
                subtype,
                sentence.trim(),
                SourceSpan::new(abs_start, abs_end),
                Some(payload),
            ));
        }
    }

    candidates
}

/// Turn content ranges `(start, end, role)`, excluding the role marker itself
fn turns(body: &str) -> Vec<(usize, usize, String)> {
    let markers: Vec<(usize, usize, String)> = TURN_MARKER
        .captures_iter(body)
        .map(|caps| {
            let full = caps.get(0).expect("match has group 0");
            let role = caps
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default();
            (full.start(), full.end(), role)
        })
        .collect();

    let mut out = Vec::with_capacity(markers.len());
    for (i, (_, content_start, role)) in markers.iter().enumerate() {
        let content_end = markers
            .get(i + 1)
            .map_or(body.len(), |(next_start, _, _)| *next_start);
        out.push((*content_start, content_end, role.clone()));
    }
    out
}

/// Sentence ranges within `content`, split on terminal punctuation or newlines
fn sentences(content: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut last_non_space = 0usize;

    for (offset, c) in content.char_indices() {
        let is_terminal = matches!(c, '.' | '!' | '?' | '\n');
        if is_terminal {
            let end = if c == '\n' { offset } else { offset + c.len_utf8() };
            if end > start && content[start..end].trim().len() > 1 {
                out.push(trimmed_range(content, start, end));
            }
            start = offset + c.len_utf8();
        } else if !c.is_whitespace() {
            last_non_space = offset + c.len_utf8();
        }
    }

    if last_non_space > start {
        out.push(trimmed_range(content, start, last_non_space));
    }

    out.retain(|(s, e)| e > s);
    out
}

/// Shrink a range to exclude leading/trailing whitespace
fn trimmed_range(content: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &content[start..end];
    let trimmed = slice.trim_start();
    let lead = slice.len() - trimmed.len();
    let trimmed = trimmed.trim_end();
    (start + lead, start + lead + trimmed.len())
}

fn word_count(sentence: &str) -> usize {
    sentence.split_whitespace().count()
}

/// Cue-phrase classification, most restrictive first
fn classify(sentence: &str) -> ItemSubtype {
    if CONSTRAINT_CUES.is_match(sentence) {
        return ItemSubtype::Constraint;
    }
    if REQUIREMENT_CUES.is_match(sentence) {
        return ItemSubtype::Requirement;
    }
    if DECISION_CUES.is_match(sentence) {
        return ItemSubtype::Decision;
    }
    if is_task(sentence) {
        return ItemSubtype::Task;
    }
    if PREFERENCE_CUES.is_match(sentence) {
        return ItemSubtype::Preference;
    }
    if ENTITY_MARKERS.is_match(sentence) || has_proper_noun(sentence) {
        return ItemSubtype::Entity;
    }
    ItemSubtype::Preference
}

/// Verb-initial action phrase addressed to an agent
fn is_task(sentence: &str) -> bool {
    sentence
        .split_whitespace()
        .next()
        .map(|first| {
            let word = first
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_ascii_lowercase();
            TASK_VERBS.contains(&word.as_str())
        })
        .unwrap_or(false)
}

/// A capitalized word past the sentence start
fn has_proper_noun(sentence: &str) -> bool {
    sentence
        .split_whitespace()
        .skip(1)
        .any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
}

pub(crate) fn is_negated(sentence: &str) -> bool {
    CONSTRAINT_CUES.is_match(sentence)
}

pub(crate) fn mentions_replacement(sentence: &str) -> bool {
    let lower = sentence.to_ascii_lowercase();
    lower.contains("instead of") || lower.contains("switch to") || lower.contains("rather than")
}

// ============================================================================
// TESTS
// ============================================================================
