//! Execution log extraction
//!
//! Splits on timestamped log lines. Lines carrying `ERROR`/`FATAL`/`CRITICAL`
//! become `error` candidates, recognized test failures become
//! `test_failure`, everything else becomes `log`. Untimestamped continuation
//! lines extend the preceding record.

use std::sync::LazyLock;

use regex::Regex;

use crate::memory::{ItemSubtype, SourceSpan};

use super::Candidate;

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[?\d{4}-\d{2}-\d{2}[T ]?\d{0,2}:?\d{0,2}:?\d{0,2}")
        .expect("timestamp pattern is valid")
});

static SEVERITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(ERROR|FATAL|CRITICAL)\b").expect("severity pattern is valid")
});

static FAILURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfail(?:ed|ure)?\b").expect("failure pattern is valid"));

static TEST_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btest[s]?\b|::|\w+_test\b|\btest_\w+").expect("test ident pattern is valid")
});

struct LogRecord {
    span: SourceSpan,
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Extract candidates from execution logs
pub fn extract(body: &str) -> Vec<Candidate> {
    let records = split_records(body);
    let mut candidates = Vec::with_capacity(records.len());

    for record in records {
        let text = &body[record.span.start..record.span.end];
        let subtype = classify(text);
        let severity = SEVERITY
            .captures(text)
            .map(|caps| caps[1].to_string());
        let payload = serde_json::json!({ "severity": severity });
        candidates.push(Candidate::from_span(
            subtype,
            text,
            record.span,
            Some(payload),
        ));
    }

    candidates
}

/// Record spans: one per timestamped line plus its continuations. Input with
/// no timestamps at all is treated as a single record.
fn split_records(body: &str) -> Vec<LogRecord> {
    let mut records: Vec<LogRecord> = Vec::new();
    let mut offset = 0usize;
    let mut saw_timestamp = false;

    for line in body.split_inclusive('\n') {
        let trimmed = line.strip_suffix('\n').unwrap_or(line);
        let line_start = offset;
        offset += line.len();
        let line_end = line_start + trimmed.len();

        if TIMESTAMP.is_match(trimmed) {
            saw_timestamp = true;
            records.push(LogRecord {
                span: SourceSpan::new(line_start, line_end),
            });
        } else if saw_timestamp && !trimmed.trim().is_empty() {
            if let Some(last) = records.last_mut() {
                last.span = SourceSpan::new(last.span.start, line_end);
            }
        }
    }

    if !saw_timestamp {
        let trimmed = body.trim();
        if !trimmed.is_empty() {
            let start = body.len() - body.trim_start().len();
            records.push(LogRecord {
                span: SourceSpan::new(start, start + trimmed.len()),
            });
        }
    }

    records
}

/// Test failures win over plain severity: a failing test that also logs
/// `ERROR` is the more specific event
fn classify(text: &str) -> ItemSubtype {
    if FAILURE.is_match(text) && TEST_IDENT.is_match(text) {
        return ItemSubtype::TestFailure;
    }
    if SEVERITY.is_match(text) {
        return ItemSubtype::Error;
    }
    ItemSubtype::Log
}

// ============================================================================
// TESTS
// ============================================================================
