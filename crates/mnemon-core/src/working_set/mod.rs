//! Working-Set Builder
//!
//! Assembles the budgeted, structured context package from ranked items.
//! Items are appended in rank order to the section their subtype dictates;
//! an item that would blow the budget is skipped while the scan continues
//! down the ranking to maximize packing. Output is byte-deterministic for
//! identical inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{TokenEstimator, WorkingSetConfig};
use crate::memory::{ContentType, ItemSubtype};
use crate::rank::RankedItem;

// ============================================================================
// OUTPUT TYPES
// ============================================================================

/// Artifact reference included in a working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub artifact_id: String,
    pub title: String,
    pub description: String,
}

/// The structured context package emitted for downstream LLM consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingSet {
    /// Bounded restatement of the purpose
    pub mission: String,
    pub constraints: Vec<String>,
    pub focus_decisions: Vec<String>,
    pub focus_tasks: Vec<String>,
    /// Numbered task summaries; requirements fill up to three entries
    pub runbook: Vec<String>,
    pub artifacts: Vec<ArtifactRef>,
    /// Section name → ordered contributing item ids
    pub citations: BTreeMap<String, Vec<String>>,
    pub open_questions: Vec<String>,
    pub tokens_used: usize,
    pub tokens_available: usize,
}

/// Artifact fields the builder needs for the `artifacts` section
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub content_type: ContentType,
    pub first_line: String,
}

/// Minimum runbook length before requirements stop filling in
const RUNBOOK_MIN_ENTRIES: usize = 3;

// ============================================================================
// BUILDER
// ============================================================================

/// Deterministic budget-aware working-set assembly
pub struct WorkingSetBuilder<'a> {
    config: &'a WorkingSetConfig,
}

impl<'a> WorkingSetBuilder<'a> {
    pub fn new(config: &'a WorkingSetConfig) -> Self {
        Self { config }
    }

    /// Assemble a working set from ranked items under a hard token budget
    pub fn build(
        &self,
        ranked: &[RankedItem],
        purpose: &str,
        budget: usize,
        artifacts: &BTreeMap<String, ArtifactInfo>,
    ) -> WorkingSet {
        let estimator = self.config.token_estimator;
        let mission = truncate_to_tokens(
            purpose.trim(),
            self.config.mission_max_tokens,
            estimator,
        );

        let mission_cost = estimator.estimate(&mission);
        if mission_cost > budget {
            // Budget below the mission: truncated mission, nothing else
            let mission = truncate_to_tokens(&mission, budget, estimator);
            let tokens_used = estimator.estimate(&mission);
            return WorkingSet {
                mission,
                constraints: Vec::new(),
                focus_decisions: Vec::new(),
                focus_tasks: Vec::new(),
                runbook: Vec::new(),
                artifacts: Vec::new(),
                citations: BTreeMap::new(),
                open_questions: Vec::new(),
                tokens_used,
                tokens_available: 0,
            };
        }

        let mut tokens_used = mission_cost;
        let mut constraints = Vec::new();
        let mut focus_decisions = Vec::new();
        let mut focus_tasks = Vec::new();
        let mut open_questions = Vec::new();
        let mut citations: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut task_entries: Vec<(String, String)> = Vec::new();
        let mut filler_entries: Vec<(String, String)> = Vec::new();
        let mut artifact_order: Vec<String> = Vec::new();

        for ranked_item in ranked {
            let item = &ranked_item.item;
            let placement = match item.subtype {
                ItemSubtype::Constraint => Some(Placement::Constraints),
                ItemSubtype::Decision => Some(Placement::Decisions),
                ItemSubtype::Task => Some(Placement::Tasks),
                ItemSubtype::Requirement => {
                    if self.is_open_question(&item.body) {
                        Some(Placement::OpenQuestions)
                    } else if task_entries.len() + filler_entries.len() < RUNBOOK_MIN_ENTRIES {
                        Some(Placement::RunbookFiller)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            let Some(placement) = placement else {
                continue;
            };

            let cost = estimator.estimate(&item.summary);
            if tokens_used + cost > budget {
                // Skip, but keep scanning lower-ranked items
                continue;
            }
            tokens_used += cost;

            match placement {
                Placement::Constraints => {
                    constraints.push(item.summary.clone());
                    citations
                        .entry("constraints".to_string())
                        .or_default()
                        .push(item.id.clone());
                }
                Placement::Decisions => {
                    focus_decisions.push(item.summary.clone());
                    citations
                        .entry("focus_decisions".to_string())
                        .or_default()
                        .push(item.id.clone());
                }
                Placement::Tasks => {
                    focus_tasks.push(item.summary.clone());
                    citations
                        .entry("focus_tasks".to_string())
                        .or_default()
                        .push(item.id.clone());
                    task_entries.push((item.id.clone(), item.summary.clone()));
                }
                Placement::OpenQuestions => {
                    open_questions.push(item.summary.clone());
                    citations
                        .entry("open_questions".to_string())
                        .or_default()
                        .push(item.id.clone());
                }
                Placement::RunbookFiller => {
                    filler_entries.push((item.id.clone(), item.summary.clone()));
                }
            }

            if !artifact_order.contains(&item.source_artifact_id) {
                artifact_order.push(item.source_artifact_id.clone());
            }
        }

        // Runbook: tasks in rank order, requirements topping up to three
        let mut runbook = Vec::new();
        let mut runbook_ids = Vec::new();
        for (id, summary) in task_entries.iter().chain(
            filler_entries
                .iter()
                .take(RUNBOOK_MIN_ENTRIES.saturating_sub(task_entries.len())),
        ) {
            runbook.push(format!("{}. {}", runbook.len() + 1, summary));
            runbook_ids.push(id.clone());
        }
        if !runbook_ids.is_empty() {
            citations.insert("runbook".to_string(), runbook_ids);
        }

        let artifact_refs = artifact_order
            .into_iter()
            .filter_map(|id| {
                artifacts.get(&id).map(|info| ArtifactRef {
                    artifact_id: id,
                    title: format!("{} material", info.content_type),
                    description: info.first_line.clone(),
                })
            })
            .collect();

        WorkingSet {
            mission,
            constraints,
            focus_decisions,
            focus_tasks,
            runbook,
            artifacts: artifact_refs,
            citations,
            open_questions,
            tokens_used,
            tokens_available: budget.saturating_sub(tokens_used),
        }
    }

    /// Interrogative marker or a hit in the uncertainty lexicon
    fn is_open_question(&self, body: &str) -> bool {
        if body.contains('?') {
            return true;
        }
        let lower = body.to_lowercase();
        self.config
            .uncertainty_lexicon
            .iter()
            .any(|phrase| lower.contains(phrase.as_str()))
    }
}

enum Placement {
    Constraints,
    Decisions,
    Tasks,
    OpenQuestions,
    RunbookFiller,
}

/// Truncate so the estimator sees at most `max_tokens`
fn truncate_to_tokens(text: &str, max_tokens: usize, estimator: TokenEstimator) -> String {
    match estimator {
        TokenEstimator::CharsOver4 => {
            let max_chars = max_tokens.saturating_mul(4);
            if text.chars().count() <= max_chars {
                text.to_string()
            } else {
                text.chars().take(max_chars).collect()
            }
        }
        TokenEstimator::WhitespaceTokens => {
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.len() <= max_tokens {
                text.to_string()
            } else {
                words[..max_tokens].join(" ")
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
