//! Redactor
//!
//! Scrubs sensitive patterns from every textual field before persistence and
//! before embedding. Matches are replaced by `[REDACTED_<CATEGORY>]`.
//! Redaction is idempotent: re-running it over already-redacted text yields
//! identical output, because replacement tokens never match any pattern.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MemoryError, Result};

// ============================================================================
// BUILT-IN PATTERNS
// ============================================================================

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    // key=value or key: value where the key names a secret
    Regex::new(r#"(?i)\b(password|secret|token|api[_-]?key)\b\s*[=:]\s*\S+"#)
        .expect("key-value pattern is valid")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email pattern is valid")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    // E.164-like: + followed by 8-15 digits
    Regex::new(r"\+[1-9]\d{7,14}\b").expect("phone pattern is valid")
});

static SSN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern is valid"));

static CARD: LazyLock<Regex> = LazyLock::new(|| {
    // 13-19 digit runs, optional single space/dash separators; Luhn-verified
    Regex::new(r"\b\d(?:[ -]?\d){12,18}\b").expect("card pattern is valid")
});

static BEARER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Bearer\s+[A-Za-z0-9._~+/=-]{8,}|sk-[A-Za-z0-9_-]{8,}|ghp_[A-Za-z0-9]{8,}|gho_[A-Za-z0-9]{8,}|xox[baprs]-[A-Za-z0-9-]{8,}|AKIA[A-Z0-9]{12,})",
    )
    .expect("bearer pattern is valid")
});

/// 13-19 digit sequence passing the Luhn checksum
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

// ============================================================================
// REDACTOR
// ============================================================================

enum PatternKind {
    /// Straight replacement with a fixed category
    Plain,
    /// Category derived from the captured secret key name
    KeyValue,
    /// Replacement only when the digit run passes the Luhn check
    Luhn,
}

struct RedactionPattern {
    category: String,
    regex: Regex,
    kind: PatternKind,
}

/// Sensitive-pattern scrubber applied to all ingested text
pub struct Redactor {
    patterns: Vec<RedactionPattern>,
}

impl Redactor {
    /// Build the default pattern set plus `extra` `(name, regex)` patterns
    pub fn new(extra: &[(String, String)]) -> Result<Self> {
        let mut patterns = vec![
            RedactionPattern {
                category: String::new(),
                regex: KEY_VALUE.clone(),
                kind: PatternKind::KeyValue,
            },
            RedactionPattern {
                category: "EMAIL".to_string(),
                regex: EMAIL.clone(),
                kind: PatternKind::Plain,
            },
            RedactionPattern {
                category: "PHONE".to_string(),
                regex: PHONE.clone(),
                kind: PatternKind::Plain,
            },
            RedactionPattern {
                category: "SSN".to_string(),
                regex: SSN.clone(),
                kind: PatternKind::Plain,
            },
            RedactionPattern {
                category: "CREDIT_CARD".to_string(),
                regex: CARD.clone(),
                kind: PatternKind::Luhn,
            },
            RedactionPattern {
                category: "TOKEN".to_string(),
                regex: BEARER_TOKEN.clone(),
                kind: PatternKind::Plain,
            },
        ];

        for (name, pattern) in extra {
            let regex = Regex::new(pattern).map_err(|e| {
                MemoryError::InputInvalid(format!("redaction pattern {name:?}: {e}"))
            })?;
            patterns.push(RedactionPattern {
                category: name.to_ascii_uppercase().replace([' ', '-'], "_"),
                regex,
                kind: PatternKind::Plain,
            });
        }

        Ok(Self { patterns })
    }

    /// Replace every sensitive match with its `[REDACTED_<CATEGORY>]` token
    pub fn redact(&self, text: &str) -> String {
        let mut current = Cow::Borrowed(text);
        for pattern in &self.patterns {
            let replaced = match pattern.kind {
                PatternKind::Plain => {
                    let token = format!("[REDACTED_{}]", pattern.category);
                    pattern.regex.replace_all(&current, token.as_str())
                }
                PatternKind::KeyValue => {
                    pattern.regex.replace_all(&current, |caps: &regex::Captures| {
                        let key = caps
                            .get(1)
                            .map(|m| m.as_str())
                            .unwrap_or("secret")
                            .to_ascii_uppercase()
                            .replace('-', "_");
                        format!("[REDACTED_{key}]")
                    })
                }
                PatternKind::Luhn => {
                    pattern.regex.replace_all(&current, |caps: &regex::Captures| {
                        let matched = &caps[0];
                        if luhn_valid(matched) {
                            format!("[REDACTED_{}]", pattern.category)
                        } else {
                            matched.to_string()
                        }
                    })
                }
            };
            current = Cow::Owned(replaced.into_owned());
        }
        current.into_owned()
    }
}

// ============================================================================
// TESTS
// ============================================================================
