//! Consolidator
//!
//! Deduplicates and links freshly extracted candidates against existing
//! memory in the same workspace. Processing is strictly sequential so
//! candidate N observes the effects of candidates 1..N-1. A persistence
//! failure skips the one candidate and never aborts the batch.

use serde_json::json;

use crate::config::ConsolidationConfig;
use crate::deadline::Deadline;
use crate::error::MemoryError;
use crate::extract::{chat_cues, Candidate};
use crate::index::{SearchFilter, VectorIndex, VectorMeta};
use crate::memory::{item_content_hash, ItemMutation, ItemSubtype, LinkType, MemoryItem};
use crate::store::{MemoryStore, NewItem};

// ============================================================================
// REPORT
// ============================================================================

/// A candidate the consolidator could not persist
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedCandidate {
    pub summary: String,
    pub reason: String,
}

/// Outcome of consolidating one extraction batch
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    /// Items persisted for new candidates
    pub created: Vec<MemoryItem>,
    /// Existing items that absorbed a candidate (usage bump or merge)
    pub updated: Vec<String>,
    /// Candidates skipped, with reasons
    pub rejected: Vec<RejectedCandidate>,
    /// Whether the deadline cut the batch short
    pub cancelled: bool,
}

// ============================================================================
// CONSOLIDATOR
// ============================================================================

/// Sequential candidate-vs-memory reconciliation
pub struct Consolidator<'a> {
    store: &'a MemoryStore,
    index: &'a VectorIndex,
    config: &'a ConsolidationConfig,
    model_id: &'a str,
}

impl<'a> Consolidator<'a> {
    pub fn new(
        store: &'a MemoryStore,
        index: &'a VectorIndex,
        config: &'a ConsolidationConfig,
        model_id: &'a str,
    ) -> Self {
        Self {
            store,
            index,
            config,
            model_id,
        }
    }

    /// Consolidate candidates in extraction order. Each candidate arrives
    /// with its vector, or `None` when its embedding is still pending.
    pub fn consolidate(
        &self,
        workspace: &str,
        thread: &str,
        artifact_id: &str,
        batch: Vec<(Candidate, Option<Vec<f32>>)>,
        deadline: Deadline,
    ) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();

        for (candidate, vector) in batch {
            if deadline.expired() {
                report.cancelled = true;
                report.rejected.push(RejectedCandidate {
                    summary: candidate.summary,
                    reason: "deadline exceeded".to_string(),
                });
                continue;
            }

            match self.consolidate_one(workspace, thread, artifact_id, &candidate, vector.as_deref())
            {
                Ok(Action::Created(item)) => report.created.push(item),
                Ok(Action::Absorbed(id)) => {
                    if !report.updated.contains(&id) {
                        report.updated.push(id);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, summary = %candidate.summary, "candidate skipped");
                    report.rejected.push(RejectedCandidate {
                        summary: candidate.summary,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }

    fn consolidate_one(
        &self,
        workspace: &str,
        thread: &str,
        artifact_id: &str,
        candidate: &Candidate,
        vector: Option<&[f32]>,
    ) -> Result<Action, MemoryError> {
        let hash = item_content_hash(&candidate.summary, &candidate.body);

        // Exact duplicate: bump the canonical item and drop the candidate
        if let Some(existing) = self.store.find_by_hash(workspace, hash)? {
            self.store
                .update_item(workspace, &existing.id, &ItemMutation::usage_bump())?;
            return Ok(Action::Absorbed(existing.id));
        }

        let mut refers_to: Vec<String> = Vec::new();
        let mut supersede_target: Option<String> = None;

        if let Some(query) = vector {
            let filter = SearchFilter {
                kind: Some(candidate.kind()),
                ..Default::default()
            };
            let neighbors =
                self.index
                    .search(workspace, query, self.config.neighbor_limit, &filter)
                    .map_err(|e| MemoryError::internal(e.to_string()))?;

            for (neighbor_id, similarity) in neighbors {
                let similarity = similarity as f64;
                if similarity < self.config.refer_threshold {
                    break;
                }
                let Some(neighbor) = self.store.get_item(workspace, &neighbor_id)? else {
                    continue;
                };

                // Fuzzy exact matching, only when the threshold is overridden
                // below content-hash equality
                if self.config.exact_threshold < 1.0 && similarity >= self.config.exact_threshold {
                    self.store
                        .update_item(workspace, &neighbor.id, &ItemMutation::usage_bump())?;
                    return Ok(Action::Absorbed(neighbor.id));
                }

                if similarity >= self.config.near_threshold && neighbor.subtype == candidate.subtype
                {
                    self.merge_into(workspace, &neighbor, candidate)?;
                    return Ok(Action::Absorbed(neighbor.id));
                }

                if similarity >= self.config.supersede_threshold
                    && candidate.subtype == ItemSubtype::Decision
                    && neighbor.subtype == ItemSubtype::Decision
                    && contradictory(candidate, &neighbor)
                    && supersede_target.is_none()
                {
                    supersede_target = Some(neighbor.id);
                    continue;
                }

                refers_to.push(neighbor.id);
            }
        }

        // Not dropped: persist as a new item
        let mut item = self.store.create_item(NewItem {
            workspace_id: workspace.to_string(),
            thread_id: thread.to_string(),
            subtype: candidate.subtype,
            summary: candidate.summary.clone(),
            body: candidate.body.clone(),
            salience: candidate.salience,
            payload: candidate.payload.clone(),
            source_artifact_id: artifact_id.to_string(),
            source_span: candidate.span,
            content_hash: hash,
        })?;

        if let Some(query) = vector {
            self.store
                .upsert_vector(workspace, &item.id, self.model_id, query)?;
            self.index
                .upsert(
                    workspace,
                    &item.id,
                    query.to_vec(),
                    self.model_id,
                    VectorMeta {
                        thread_id: thread.to_string(),
                        kind: item.kind,
                        subtype: item.subtype,
                        retired: false,
                    },
                )
                .map_err(|e| MemoryError::internal(e.to_string()))?;
            item.embedding_model_id = Some(self.model_id.to_string());
        }

        if let Some(target) = supersede_target {
            match self
                .store
                .add_link(workspace, &item.id, &target, LinkType::Supersedes)
            {
                Ok(_) => {}
                Err(e) => {
                    // Target already superseded elsewhere: weaken to a reference
                    tracing::warn!(error = %e, from = %item.id, to = %target, "supersede downgraded");
                    let _ = self
                        .store
                        .add_link(workspace, &item.id, &target, LinkType::RefersTo);
                }
            }
        }
        for target in refers_to {
            if let Err(e) = self
                .store
                .add_link(workspace, &item.id, &target, LinkType::RefersTo)
            {
                tracing::warn!(error = %e, from = %item.id, to = %target, "refers_to link skipped");
            }
        }

        Ok(Action::Created(item))
    }

    /// Near-duplicate: keep the better summary, stash the body delta under a
    /// `revisions` payload, bump usage
    fn merge_into(
        &self,
        workspace: &str,
        neighbor: &MemoryItem,
        candidate: &Candidate,
    ) -> Result<(), MemoryError> {
        let summary = if candidate.summary.len() >= neighbor.summary.len() {
            Some(candidate.summary.clone())
        } else {
            None
        };

        let mut map = match neighbor.payload.clone() {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        let revisions = map
            .entry("revisions".to_string())
            .or_insert_with(|| json!([]));
        if let Some(array) = revisions.as_array_mut() {
            array.push(json!({
                "summary": candidate.summary,
                "body": candidate.body,
            }));
        }

        self.store.update_item(
            workspace,
            &neighbor.id,
            &ItemMutation {
                summary,
                payload: Some(serde_json::Value::Object(map)),
                usage_increment: 1,
                ..Default::default()
            },
        )?;
        Ok(())
    }
}

enum Action {
    Created(MemoryItem),
    Absorbed(String),
}

/// Contradictory decision polarity: explicit replacement phrasing, or a
/// negation-cue flip between the two texts
fn contradictory(candidate: &Candidate, neighbor: &MemoryItem) -> bool {
    chat_cues::mentions_replacement(&candidate.body)
        || chat_cues::is_negated(&candidate.body) != chat_cues::is_negated(&neighbor.body)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ItemState, SourceSpan};
    use tempfile::TempDir;

    fn setup() -> (MemoryStore, VectorIndex, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::open(&dir.path().join("test.db")).unwrap();
        let index = VectorIndex::new(3, "m1", 256);
        (store, index, dir)
    }

    fn candidate(subtype: ItemSubtype, text: &str) -> Candidate {
        Candidate {
            subtype,
            summary: text.to_string(),
            body: text.to_string(),
            span: SourceSpan::new(0, text.len()),
            salience: subtype.initial_salience(),
            payload: None,
        }
    }

    fn unit(x: f32, y: f32, z: f32) -> Vec<f32> {
        let norm = (x * x + y * y + z * z).sqrt();
        vec![x / norm, y / norm, z / norm]
    }

    #[test]
    fn test_new_candidate_created_with_vector() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(
                candidate(ItemSubtype::Decision, "use sqlite for storage"),
                Some(unit(1.0, 0.0, 0.0)),
            )],
            Deadline::none(),
        );

        assert_eq!(report.created.len(), 1);
        assert!(report.updated.is_empty());
        let item = &report.created[0];
        assert_eq!(item.usage_count, 1);
        assert_eq!(item.embedding_model_id.as_deref(), Some("m1"));
        assert_eq!(index.len("w1"), 1);
    }

    #[test]
    fn test_exact_duplicate_bumps_usage() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let run = |c: &Consolidator<'_>| {
            c.consolidate(
                "w1",
                "t1",
                "A1",
                vec![(
                    candidate(ItemSubtype::Decision, "use sqlite for storage"),
                    Some(unit(1.0, 0.0, 0.0)),
                )],
                Deadline::none(),
            )
        };

        let first = run(&consolidator);
        assert_eq!(first.created.len(), 1);
        let id = first.created[0].id.clone();

        let second = run(&consolidator);
        assert!(second.created.is_empty());
        assert_eq!(second.updated, vec![id.clone()]);

        let item = store.get_item("w1", &id).unwrap().unwrap();
        assert_eq!(item.usage_count, 2);
    }

    #[test]
    fn test_exact_duplicate_matches_whitespace_variant() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(candidate(ItemSubtype::Decision, "Use SQLite for storage"), None)],
            Deadline::none(),
        );
        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A2",
            vec![(candidate(ItemSubtype::Decision, "use   sqlite for STORAGE"), None)],
            Deadline::none(),
        );
        assert!(report.created.is_empty());
        assert_eq!(report.updated.len(), 1);
    }

    #[test]
    fn test_near_duplicate_merges() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let first = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(
                candidate(ItemSubtype::Decision, "use sqlite"),
                Some(unit(1.0, 0.0, 0.0)),
            )],
            Deadline::none(),
        );
        let id = first.created[0].id.clone();

        // Same direction, same subtype: near-duplicate with longer summary
        let second = consolidator.consolidate(
            "w1",
            "t1",
            "A2",
            vec![(
                candidate(ItemSubtype::Decision, "use sqlite for the persistence layer"),
                Some(unit(1.0, 0.001, 0.0)),
            )],
            Deadline::none(),
        );
        assert!(second.created.is_empty());
        assert_eq!(second.updated, vec![id.clone()]);

        let merged = store.get_item("w1", &id).unwrap().unwrap();
        assert_eq!(merged.summary, "use sqlite for the persistence layer");
        assert_eq!(merged.usage_count, 2);
        let revisions = &merged.payload.unwrap()["revisions"];
        assert_eq!(revisions.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_near_duplicate_subtype_mismatch_not_merged() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(
                candidate(ItemSubtype::Constraint, "only use sqlite"),
                Some(unit(1.0, 0.0, 0.0)),
            )],
            Deadline::none(),
        );
        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A2",
            vec![(
                candidate(ItemSubtype::Entity, "sqlite is in use"),
                Some(unit(1.0, 0.001, 0.0)),
            )],
            Deadline::none(),
        );
        // Different kind (both semantic here, different subtype): no merge
        assert_eq!(report.created.len(), 1);
    }

    #[test]
    fn test_contradictory_decision_supersedes() {
        let (store, index, _dir) = setup();
        let mut config = ConsolidationConfig::default();
        // Direction differs slightly; keep merge out of the way
        config.near_threshold = 0.9999;
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let first = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(
                candidate(ItemSubtype::Decision, "Let's use JWT"),
                Some(unit(1.0, 0.0, 0.0)),
            )],
            Deadline::none(),
        );
        let old_id = first.created[0].id.clone();

        let second = consolidator.consolidate(
            "w1",
            "t1",
            "A2",
            vec![(
                candidate(
                    ItemSubtype::Decision,
                    "Instead of JWT, use opaque session tokens",
                ),
                Some(unit(1.0, 0.05, 0.0)),
            )],
            Deadline::none(),
        );
        assert_eq!(second.created.len(), 1);
        let new_id = second.created[0].id.clone();

        let links = store
            .links_from("w1", &new_id, Some(LinkType::Supersedes))
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to_id, old_id);

        let old = store.get_item("w1", &old_id).unwrap().unwrap();
        assert_eq!(old.state, ItemState::Superseded);
    }

    #[test]
    fn test_weak_association_links_refer_to() {
        let (store, index, _dir) = setup();
        let mut config = ConsolidationConfig::default();
        config.refer_threshold = 0.80;
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let first = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(
                candidate(ItemSubtype::Entity, "the auth service"),
                Some(unit(1.0, 0.0, 0.0)),
            )],
            Deadline::none(),
        );
        let old_id = first.created[0].id.clone();

        let second = consolidator.consolidate(
            "w1",
            "t1",
            "A2",
            vec![(
                candidate(ItemSubtype::Entity, "the auth gateway"),
                Some(unit(1.0, 0.5, 0.0)),
            )],
            Deadline::none(),
        );
        let new_id = second.created[0].id.clone();

        let links = store
            .links_from("w1", &new_id, Some(LinkType::RefersTo))
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].to_id, old_id);
    }

    #[test]
    fn test_pending_embedding_still_persists() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![(candidate(ItemSubtype::Error, "connection refused"), None)],
            Deadline::none(),
        );
        assert_eq!(report.created.len(), 1);
        assert!(report.created[0].embedding_model_id.is_none());
        assert_eq!(index.len("w1"), 0);
        let _ = store;
    }

    #[test]
    fn test_sequential_visibility_within_batch() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        // Identical candidates in one batch: the second sees the first
        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![
                (candidate(ItemSubtype::Task, "fix the login test"), None),
                (candidate(ItemSubtype::Task, "fix the login test"), None),
            ],
            Deadline::none(),
        );
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.updated.len(), 1);
        let _ = store;
    }

    #[test]
    fn test_expired_deadline_rejects_remainder() {
        let (store, index, _dir) = setup();
        let config = ConsolidationConfig::default();
        let consolidator = Consolidator::new(&store, &index, &config, "m1");

        let report = consolidator.consolidate(
            "w1",
            "t1",
            "A1",
            vec![
                (candidate(ItemSubtype::Task, "one thing to do"), None),
                (candidate(ItemSubtype::Task, "another thing to do"), None),
            ],
            Deadline::after(std::time::Duration::from_millis(0)),
        );
        assert!(report.cancelled);
        assert!(report.created.is_empty());
        assert_eq!(report.rejected.len(), 2);
        let _ = store;
    }
}
