//! Context memory façade
//!
//! `MemoryCore` wires the redactor, embedder gateway, vector index, store,
//! extractor, consolidator, ranker, working-set builder, and feedback
//! applier into the five public operations, all scoped by workspace and
//! bounded by per-operation deadlines.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::consolidate::{Consolidator, RejectedCandidate};
use crate::deadline::Deadline;
use crate::embed::{EmbedderGateway, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::extract::{self, Candidate};
use crate::feedback::{FeedbackApplier, FeedbackOutcome};
use crate::index::{SearchFilter, VectorIndex, VectorMeta};
use crate::memory::{
    ContentType, FeedbackSignal, ItemKind, ItemMutation, ItemState, ItemSubtype, MemoryItem,
    MemoryStats,
};
use crate::rank::Ranker;
use crate::redact::Redactor;
use crate::store::MemoryStore;
use crate::working_set::{ArtifactInfo, WorkingSet, WorkingSetBuilder};

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// Raw interaction materials for one ingestion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Materials {
    pub chat: Option<String>,
    pub diffs: Option<String>,
    pub logs: Option<String>,
}

impl Materials {
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            chat: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn diffs(text: impl Into<String>) -> Self {
        Self {
            diffs: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn logs(text: impl Into<String>) -> Self {
        Self {
            logs: Some(text.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        let blank = |m: &Option<String>| m.as_deref().map_or(true, |t| t.trim().is_empty());
        blank(&self.chat) && blank(&self.diffs) && blank(&self.logs)
    }
}

/// Result of one ingestion call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub artifact_ids: Vec<String>,
    pub created_item_ids: Vec<String>,
    pub updated_item_ids: Vec<String>,
    pub rejected: Vec<RejectedCandidate>,
    /// True when the deadline cut ingestion short; persisted items are kept
    pub cancelled: bool,
}

/// Optional recall restrictions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecallFilters {
    pub include_kinds: Option<Vec<ItemKind>>,
    #[serde(default)]
    pub exclude_subtypes: Vec<ItemSubtype>,
    #[serde(default)]
    pub include_retired: bool,
    #[serde(default)]
    pub cross_thread: bool,
}

/// One recalled item, budget-packed in rank order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: String,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    pub summary: String,
    pub score: f64,
    pub salience: f64,
    pub usage_count: i64,
    pub state: ItemState,
    pub source_artifact_id: String,
}

/// Result of a recall call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    pub items: Vec<ItemSummary>,
    pub tokens_used: usize,
    pub tokens_available: usize,
}

/// Which form `expand` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandForm {
    Summary,
    Full,
}

/// Item record with its resolution links
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub item: MemoryItem,
    pub superseded_by: Option<String>,
    pub duplicate_of: Option<String>,
}

/// Expansion result: a structured record or the raw redacted text
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expanded {
    Item(Box<ItemRecord>),
    Raw(String),
}

/// Result of re-driving pending embeddings through the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub resolved: usize,
    pub still_pending: usize,
}

// ============================================================================
// PER-ITEM LOCK TABLE
// ============================================================================

/// Bounded lock table keyed by `(workspace, item_id)`; entries are evicted
/// once idle and the table grows past its watermark.
struct LockTable {
    inner: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

const LOCK_TABLE_SWEEP_WATERMARK: usize = 1024;

impl LockTable {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, workspace: &str, item_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().expect("lock table poisoned");
            if map.len() > LOCK_TABLE_SWEEP_WATERMARK {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            map.entry((workspace.to_string(), item_id.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

// ============================================================================
// MEMORY CORE
// ============================================================================

/// The context memory core
///
/// All methods take `&self`; the core is `Send + Sync` and shared as
/// `Arc<MemoryCore>`.
pub struct MemoryCore {
    store: Arc<MemoryStore>,
    index: Arc<VectorIndex>,
    embedder: Arc<EmbedderGateway>,
    redactor: Redactor,
    config: CoreConfig,
    model_id: String,
    locks: LockTable,
}

impl MemoryCore {
    /// Open the core over a SQLite file and an embedding provider
    pub fn open(
        db_path: &Path,
        provider: Arc<dyn EmbeddingProvider>,
        config: CoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        if provider.dimensions() != config.embedding_dim {
            return Err(MemoryError::InputInvalid(format!(
                "embedding_dim {} does not match provider dimension {}",
                config.embedding_dim,
                provider.dimensions()
            )));
        }

        let model_id = config
            .embedding_model_id
            .clone()
            .unwrap_or_else(|| provider.model_id().to_string());
        let redactor = Redactor::new(&config.redaction_patterns)?;
        let store = Arc::new(MemoryStore::open(db_path)?);
        let index = Arc::new(VectorIndex::new(
            config.embedding_dim,
            model_id.clone(),
            config.topk_cap,
        ));
        let embedder = Arc::new(EmbedderGateway::new(provider, config.embed));

        let core = Self {
            store,
            index,
            embedder,
            redactor,
            config,
            model_id,
            locks: LockTable::new(),
        };
        core.load_index()?;
        Ok(core)
    }

    /// Load persisted vectors into the in-memory index
    fn load_index(&self) -> Result<()> {
        for row in self.store.load_vectors()? {
            if row.vector.len() != self.config.embedding_dim {
                tracing::warn!(
                    item_id = %row.item_id,
                    model_id = %row.model_id,
                    "skipping vector with foreign dimension"
                );
                continue;
            }
            let meta = VectorMeta {
                thread_id: row.thread_id,
                kind: row.kind,
                subtype: row.subtype,
                retired: row.retired,
            };
            if let Err(e) =
                self.index
                    .upsert(&row.workspace_id, &row.item_id, row.vector, &row.model_id, meta)
            {
                tracing::warn!(item_id = %row.item_id, error = %e, "vector not loaded");
            }
        }
        Ok(())
    }

    /// Active embedding model id
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Workspace statistics
    pub fn stats(&self, workspace: &str) -> Result<MemoryStats> {
        Ok(self.store.stats(workspace)?)
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Ingest raw materials into a thread
    ///
    /// On deadline expiry the items persisted so far are kept and returned;
    /// `cancelled` marks the truncation.
    pub async fn ingest(
        &self,
        workspace: &str,
        thread: &str,
        materials: Materials,
        deadline: Option<Deadline>,
    ) -> Result<IngestResult> {
        validate_scope(workspace, thread)?;
        if materials.is_empty() {
            return Err(MemoryError::InputInvalid(
                "at least one material (chat, diffs, logs) must be present".to_string(),
            ));
        }
        let deadline = deadline.unwrap_or_else(|| Deadline::after(self.config.deadlines.ingest));

        let mut result = IngestResult::default();
        let parts: [(ContentType, Option<&String>); 3] = [
            (ContentType::Chat, materials.chat.as_ref()),
            (ContentType::Diff, materials.diffs.as_ref()),
            (ContentType::Logs, materials.logs.as_ref()),
        ];

        for (content_type, body) in parts {
            let Some(body) = body else { continue };
            if body.trim().is_empty() {
                continue;
            }
            if deadline.expired() {
                result.cancelled = true;
                break;
            }

            let redacted = self.redactor.redact(body);
            let (artifact, _created) =
                self.store
                    .create_artifact(workspace, thread, content_type, &redacted)?;
            result.artifact_ids.push(artifact.id.clone());

            let candidates = extract::extract(&artifact);
            if candidates.is_empty() {
                continue;
            }

            let batch = self.embed_candidates(&candidates, deadline).await;
            let consolidator = Consolidator::new(
                &self.store,
                &self.index,
                &self.config.consolidation,
                &self.model_id,
            );
            let report = consolidator.consolidate(workspace, thread, &artifact.id, batch, deadline);

            result
                .created_item_ids
                .extend(report.created.iter().map(|item| item.id.clone()));
            result.updated_item_ids.extend(report.updated);
            result.rejected.extend(report.rejected);
            result.cancelled |= report.cancelled;
        }

        Ok(result)
    }

    /// Embed candidate bodies; failures leave entries pending
    async fn embed_candidates(
        &self,
        candidates: &[Candidate],
        deadline: Deadline,
    ) -> Vec<(Candidate, Option<Vec<f32>>)> {
        let texts: Vec<String> = candidates.iter().map(|c| c.body.clone()).collect();
        let vectors = match self.embedder.embed_texts(&texts, deadline).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!(error = %e, "embedding unavailable, items will be pending");
                vec![None; candidates.len()]
            }
        };
        candidates.iter().cloned().zip(vectors).collect()
    }

    // ========================================================================
    // RECALL
    // ========================================================================

    /// Recall items relevant to a purpose under a token budget
    ///
    /// On deadline expiry recall returns an empty result, never partial.
    pub async fn recall(
        &self,
        workspace: &str,
        thread: &str,
        purpose: &str,
        token_budget: usize,
        filters: RecallFilters,
        deadline: Option<Deadline>,
    ) -> Result<RecallResult> {
        validate_scope(workspace, thread)?;
        validate_purpose(purpose, token_budget)?;
        let deadline = deadline.unwrap_or_else(|| Deadline::after(self.config.deadlines.recall));

        let ranked = match self
            .ranked_pool(workspace, thread, purpose, &filters, deadline)
            .await?
        {
            Some(ranked) => ranked,
            None => return Ok(empty_recall(token_budget)),
        };

        let estimator = self.config.working_set.token_estimator;
        let mut items = Vec::new();
        let mut tokens_used = 0usize;
        for entry in &ranked {
            let cost = estimator.estimate(&entry.item.summary);
            if tokens_used + cost > token_budget {
                continue;
            }
            tokens_used += cost;
            items.push(ItemSummary {
                id: entry.item.id.clone(),
                kind: entry.item.kind,
                subtype: entry.item.subtype,
                summary: entry.item.summary.clone(),
                score: entry.score,
                salience: entry.item.salience,
                usage_count: entry.item.usage_count,
                state: entry.item.state,
                source_artifact_id: entry.item.source_artifact_id.clone(),
            });
        }

        self.touch_items(workspace, items.iter().map(|i| i.id.clone()).collect());

        Ok(RecallResult {
            items,
            tokens_used,
            tokens_available: token_budget.saturating_sub(tokens_used),
        })
    }

    // ========================================================================
    // WORKING SET
    // ========================================================================

    /// Build the structured working set for a purpose under a hard budget
    ///
    /// Assembly is all-or-nothing: on deadline expiry the call fails.
    pub async fn build_working_set(
        &self,
        workspace: &str,
        thread: &str,
        purpose: &str,
        token_budget: usize,
        filters: RecallFilters,
        deadline: Option<Deadline>,
    ) -> Result<WorkingSet> {
        validate_scope(workspace, thread)?;
        validate_purpose(purpose, token_budget)?;
        let deadline =
            deadline.unwrap_or_else(|| Deadline::after(self.config.deadlines.build_working_set));

        let ranked = self
            .ranked_pool(workspace, thread, purpose, &filters, deadline)
            .await?
            .ok_or(MemoryError::Cancelled)?;
        deadline.check()?;

        let mut artifacts: BTreeMap<String, ArtifactInfo> = BTreeMap::new();
        for entry in &ranked {
            let id = &entry.item.source_artifact_id;
            if artifacts.contains_key(id) {
                continue;
            }
            if let Some(artifact) = self.store.get_artifact(workspace, id)? {
                artifacts.insert(
                    id.clone(),
                    ArtifactInfo {
                        content_type: artifact.content_type,
                        first_line: artifact.body.lines().next().unwrap_or("").to_string(),
                    },
                );
            }
        }
        deadline.check()?;

        let builder = WorkingSetBuilder::new(&self.config.working_set);
        let working_set = builder.build(&ranked, purpose, token_budget, &artifacts);

        let cited: Vec<String> = working_set
            .citations
            .values()
            .flatten()
            .cloned()
            .collect();
        self.touch_items(workspace, cited);

        Ok(working_set)
    }

    /// Shared candidate-pool construction + ranking.
    ///
    /// Returns `None` when the deadline expired before a pool could be
    /// assembled.
    async fn ranked_pool(
        &self,
        workspace: &str,
        thread: &str,
        purpose: &str,
        filters: &RecallFilters,
        deadline: Deadline,
    ) -> Result<Option<Vec<crate::rank::RankedItem>>> {
        if deadline.expired() {
            return Ok(None);
        }

        let query = match self
            .embedder
            .embed_one(&self.redactor.redact(purpose), deadline)
            .await
        {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!(error = %e, "purpose embedding failed, falling back to store scan");
                None
            }
        };

        let cross_thread = filters.cross_thread || self.config.cross_thread;
        let thread_filter = if cross_thread { None } else { Some(thread) };
        let pool_size = self.config.pool_size;

        let mut pool: Vec<(MemoryItem, Option<f32>)> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        if let Some(query) = &query {
            let index_filter = SearchFilter {
                thread_id: thread_filter.map(str::to_string),
                kind: single_kind(&filters.include_kinds),
                subtype: None,
                include_retired: filters.include_retired,
            };
            let hits = self
                .index
                .search(workspace, query, pool_size, &index_filter)
                .map_err(|e| MemoryError::internal(e.to_string()))?;
            let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
            let similarity: HashMap<&String, f32> =
                hits.iter().map(|(id, sim)| (id, *sim)).collect();
            for item in self.store.get_items(workspace, &ids)? {
                let sim = similarity.get(&item.id).copied();
                seen.push(item.id.clone());
                pool.push((item, sim));
            }
        }

        // Backfill from the store when the index comes up short
        if pool.len() < pool_size / 2 {
            let candidates = self.store.list_candidates(
                workspace,
                thread_filter,
                filters.include_retired,
                pool_size,
            )?;
            for item in candidates {
                if seen.contains(&item.id) {
                    continue;
                }
                seen.push(item.id.clone());
                pool.push((item, None));
            }
        }

        pool.retain(|(item, _)| self.passes_filters(item, filters, thread_filter));

        if deadline.expired() {
            return Ok(None);
        }

        let ranker = Ranker::new(&self.config.rank);
        Ok(Some(ranker.rank(pool, purpose, Utc::now())))
    }

    fn passes_filters(
        &self,
        item: &MemoryItem,
        filters: &RecallFilters,
        thread_filter: Option<&str>,
    ) -> bool {
        if !filters.include_retired && item.state == ItemState::Retired {
            return false;
        }
        if let Some(thread) = thread_filter {
            if item.thread_id != thread {
                return false;
            }
        }
        if let Some(kinds) = &filters.include_kinds {
            if !kinds.contains(&item.kind) {
                return false;
            }
        }
        if filters.exclude_subtypes.contains(&item.subtype) {
            return false;
        }
        true
    }

    /// Refresh `last_accessed_at` on returned items (feeds the recency
    /// signal); failures only log
    fn touch_items(&self, workspace: &str, ids: Vec<String>) {
        for id in ids {
            if let Err(e) = self.store.update_item(workspace, &id, &ItemMutation::touch()) {
                tracing::warn!(item_id = %id, error = %e, "touch failed");
            }
        }
    }

    // ========================================================================
    // EXPAND
    // ========================================================================

    /// Retrieve the stored record or the full raw form of a cited id
    pub async fn expand(
        &self,
        workspace: &str,
        id: &str,
        form: ExpandForm,
    ) -> Result<Expanded> {
        if workspace.trim().is_empty() {
            return Err(MemoryError::InputInvalid("workspace must be non-empty".into()));
        }

        // Artifact ids resolve to their redacted raw material
        if id.starts_with('A') {
            let artifact = self
                .store
                .get_artifact(workspace, id)?
                .ok_or_else(|| MemoryError::NotFound(format!("artifact {id}")))?;
            return Ok(match form {
                ExpandForm::Summary => {
                    Expanded::Raw(artifact.body.lines().next().unwrap_or("").to_string())
                }
                ExpandForm::Full => Expanded::Raw(artifact.body),
            });
        }

        let item = self
            .store
            .get_item(workspace, id)?
            .ok_or_else(|| MemoryError::NotFound(format!("item {id}")))?;

        match form {
            ExpandForm::Summary => {
                let superseded_by = self
                    .store
                    .links_to(workspace, id, Some(crate::memory::LinkType::Supersedes))?
                    .first()
                    .map(|link| link.from_id.clone());
                let duplicate_of = self
                    .store
                    .links_from(workspace, id, Some(crate::memory::LinkType::DuplicateOf))?
                    .first()
                    .map(|link| link.to_id.clone());
                Ok(Expanded::Item(Box::new(ItemRecord {
                    item,
                    superseded_by,
                    duplicate_of,
                })))
            }
            ExpandForm::Full => {
                let _lock = self.locks.acquire(workspace, id).await;
                self.touch_items(workspace, vec![id.to_string()]);
                // Prefer the artifact span the item was extracted from
                if let Some(artifact) = self
                    .store
                    .get_artifact(workspace, &item.source_artifact_id)?
                {
                    let span = item.source_span;
                    if span.end <= artifact.body.len()
                        && artifact.body.is_char_boundary(span.start)
                        && artifact.body.is_char_boundary(span.end)
                    {
                        return Ok(Expanded::Raw(artifact.body[span.start..span.end].to_string()));
                    }
                }
                Ok(Expanded::Raw(item.body))
            }
        }
    }

    // ========================================================================
    // FEEDBACK
    // ========================================================================

    /// Apply a feedback signal to an item
    pub async fn feedback(
        &self,
        workspace: &str,
        item_id: &str,
        signal: FeedbackSignal,
        magnitude: f64,
        canonical: Option<&str>,
        actor: &str,
        deadline: Option<Deadline>,
    ) -> Result<FeedbackOutcome> {
        if workspace.trim().is_empty() {
            return Err(MemoryError::InputInvalid("workspace must be non-empty".into()));
        }
        let deadline = deadline.unwrap_or_else(|| Deadline::after(self.config.deadlines.feedback));
        deadline.check()?;

        let _lock = self.locks.acquire(workspace, item_id).await;
        deadline.check()?;

        let applier = FeedbackApplier::new(&self.store);
        let (outcome, item) =
            applier.apply(workspace, item_id, signal, magnitude, canonical, actor)?;
        if outcome.retired {
            self.index.mark_retired(workspace, &item.id, true);
        }
        Ok(outcome)
    }

    // ========================================================================
    // EMBEDDING BACKFILL
    // ========================================================================

    /// Re-drive items whose embedding is pending through the gateway
    pub async fn backfill_embeddings(
        &self,
        workspace: &str,
        deadline: Option<Deadline>,
    ) -> Result<BackfillReport> {
        let deadline = deadline.unwrap_or_else(|| Deadline::after(self.config.deadlines.ingest));
        let pending = self
            .store
            .pending_embedding_items(workspace, &self.model_id, 512)?;
        if pending.is_empty() {
            return Ok(BackfillReport::default());
        }

        let texts: Vec<String> = pending.iter().map(|item| item.body.clone()).collect();
        let vectors = self
            .embedder
            .embed_texts(&texts, deadline)
            .await
            .map_err(|e| MemoryError::TransientDependency(e.to_string()))?;

        let mut report = BackfillReport::default();
        for (item, vector) in pending.iter().zip(vectors) {
            match vector {
                Some(vector) => {
                    self.store
                        .upsert_vector(workspace, &item.id, &self.model_id, &vector)?;
                    self.index
                        .upsert(
                            workspace,
                            &item.id,
                            vector,
                            &self.model_id,
                            VectorMeta {
                                thread_id: item.thread_id.clone(),
                                kind: item.kind,
                                subtype: item.subtype,
                                retired: item.state == ItemState::Retired,
                            },
                        )
                        .map_err(|e| MemoryError::internal(e.to_string()))?;
                    report.resolved += 1;
                }
                None => report.still_pending += 1,
            }
        }
        Ok(report)
    }
}

// ============================================================================
// VALIDATION HELPERS
// ============================================================================

fn validate_scope(workspace: &str, thread: &str) -> Result<()> {
    if workspace.trim().is_empty() {
        return Err(MemoryError::InputInvalid("workspace must be non-empty".into()));
    }
    if thread.trim().is_empty() {
        return Err(MemoryError::InputInvalid("thread must be non-empty".into()));
    }
    Ok(())
}

fn validate_purpose(purpose: &str, token_budget: usize) -> Result<()> {
    if purpose.trim().is_empty() {
        return Err(MemoryError::InputInvalid("purpose must be non-empty".into()));
    }
    if token_budget == 0 {
        return Err(MemoryError::InputInvalid(
            "token budget must be positive".into(),
        ));
    }
    Ok(())
}

fn empty_recall(token_budget: usize) -> RecallResult {
    RecallResult {
        items: Vec::new(),
        tokens_used: 0,
        tokens_available: token_budget,
    }
}

fn single_kind(kinds: &Option<Vec<ItemKind>>) -> Option<ItemKind> {
    match kinds.as_deref() {
        Some([kind]) => Some(*kind),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
