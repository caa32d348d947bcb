//! Vector Index
//!
//! Per-workspace storage mapping `item_id → vector` with exact cosine
//! search. Only vectors produced by the active embedding model participate in
//! retrieval; results are ordered by descending similarity with ties broken
//! by ascending item identifier, making searches fully deterministic.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::memory::{id_sort_key, ItemKind, ItemSubtype};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector index error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    /// Vector dimension does not match the index
    #[error("invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity between two vectors; 0.0 on dimension mismatch
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// FILTER & METADATA
// ============================================================================

/// Metadata stored alongside each vector for in-search filtering
#[derive(Debug, Clone)]
pub struct VectorMeta {
    pub thread_id: String,
    pub kind: ItemKind,
    pub subtype: ItemSubtype,
    pub retired: bool,
}

/// Restricts a search to a slice of the workspace
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub thread_id: Option<String>,
    pub kind: Option<ItemKind>,
    pub subtype: Option<ItemSubtype>,
    pub include_retired: bool,
}

impl SearchFilter {
    fn matches(&self, meta: &VectorMeta) -> bool {
        if !self.include_retired && meta.retired {
            return false;
        }
        if let Some(thread) = &self.thread_id {
            if &meta.thread_id != thread {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if meta.kind != kind {
                return false;
            }
        }
        if let Some(subtype) = self.subtype {
            if meta.subtype != subtype {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// VECTOR INDEX
// ============================================================================

struct StoredVector {
    vector: Vec<f32>,
    model_id: String,
    meta: VectorMeta,
}

/// Workspace-partitioned exact-scan vector index
pub struct VectorIndex {
    dimensions: usize,
    active_model: String,
    topk_cap: usize,
    workspaces: Mutex<HashMap<String, HashMap<String, StoredVector>>>,
}

impl VectorIndex {
    pub fn new(dimensions: usize, active_model: impl Into<String>, topk_cap: usize) -> Self {
        Self {
            dimensions,
            active_model: active_model.into(),
            topk_cap,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Vector dimension this index accepts
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Model id whose vectors participate in retrieval
    pub fn active_model(&self) -> &str {
        &self.active_model
    }

    /// Number of vectors stored for a workspace (all models)
    pub fn len(&self, workspace: &str) -> usize {
        self.workspaces
            .lock()
            .expect("vector index lock poisoned")
            .get(workspace)
            .map_or(0, |ws| ws.len())
    }

    pub fn is_empty(&self, workspace: &str) -> bool {
        self.len(workspace) == 0
    }

    /// Insert or replace the vector for `(item_id, model_id)`
    pub fn upsert(
        &self,
        workspace: &str,
        item_id: &str,
        vector: Vec<f32>,
        model_id: &str,
        meta: VectorMeta,
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::InvalidDimensions {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        let mut workspaces = self.workspaces.lock().expect("vector index lock poisoned");
        workspaces.entry(workspace.to_string()).or_default().insert(
            item_id.to_string(),
            StoredVector {
                vector,
                model_id: model_id.to_string(),
                meta,
            },
        );
        Ok(())
    }

    /// Remove an item's vector
    pub fn delete(&self, workspace: &str, item_id: &str) -> bool {
        let mut workspaces = self.workspaces.lock().expect("vector index lock poisoned");
        workspaces
            .get_mut(workspace)
            .is_some_and(|ws| ws.remove(item_id).is_some())
    }

    /// Flip the retired flag so searches can exclude the item
    pub fn mark_retired(&self, workspace: &str, item_id: &str, retired: bool) {
        let mut workspaces = self.workspaces.lock().expect("vector index lock poisoned");
        if let Some(stored) = workspaces.get_mut(workspace).and_then(|ws| ws.get_mut(item_id)) {
            stored.meta.retired = retired;
        }
    }

    /// Nearest neighbors by cosine similarity, length ≤ min(k, cap),
    /// descending similarity, ties by ascending item identifier
    pub fn search(
        &self,
        workspace: &str,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(String, f32)>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::InvalidDimensions {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let workspaces = self.workspaces.lock().expect("vector index lock poisoned");
        let Some(ws) = workspaces.get(workspace) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<(String, f32)> = ws
            .iter()
            .filter(|(_, stored)| stored.model_id == self.active_model)
            .filter(|(_, stored)| filter.matches(&stored.meta))
            .map(|(id, stored)| (id.clone(), cosine_similarity(query, &stored.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| id_sort_key(&a.0).cmp(&id_sort_key(&b.0)))
        });
        scored.truncate(k.min(self.topk_cap));
        Ok(scored)
    }
}

// ============================================================================
// TESTS
// ============================================================================
