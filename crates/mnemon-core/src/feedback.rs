//! Feedback Applier
//!
//! Translates client feedback signals into saturating salience deltas, usage
//! bumps, retirement, and duplicate links, and appends every call to the
//! append-only journal.

use chrono::Utc;

use crate::error::{MemoryError, Result};
use crate::memory::{FeedbackRecord, FeedbackSignal, ItemMutation, LinkType, MemoryItem};
use crate::store::MemoryStore;

/// Salience floor at which an `outdated` item is retired
const RETIRE_SALIENCE_FLOOR: f64 = 0.1;

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of applying one feedback signal
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOutcome {
    pub item_id: String,
    pub previous_salience: f64,
    pub new_salience: f64,
    pub delta: f64,
    /// Whether this call retired the item
    pub retired: bool,
}

// ============================================================================
// APPLIER
// ============================================================================

/// Applies feedback to items and journals every record
pub struct FeedbackApplier<'a> {
    store: &'a MemoryStore,
}

impl<'a> FeedbackApplier<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self { store }
    }

    /// Apply `signal` with `magnitude ∈ [-1, +1]`; `canonical` names the
    /// canonical item for `duplicate` feedback.
    pub fn apply(
        &self,
        workspace: &str,
        item_id: &str,
        signal: FeedbackSignal,
        magnitude: f64,
        canonical: Option<&str>,
        actor: &str,
    ) -> Result<(FeedbackOutcome, MemoryItem)> {
        if !(-1.0..=1.0).contains(&magnitude) || !magnitude.is_finite() {
            return Err(MemoryError::InputInvalid(format!(
                "magnitude must lie in [-1, 1], got {magnitude}"
            )));
        }

        let before = self
            .store
            .get_item(workspace, item_id)?
            .ok_or_else(|| MemoryError::NotFound(format!("item {item_id}")))?;

        let (salience_delta, usage_increment) = match signal {
            FeedbackSignal::Helpful => (0.05 * magnitude, 1),
            FeedbackSignal::NotHelpful => (-0.05 * magnitude.abs(), 0),
            FeedbackSignal::Outdated => (-0.20, 0),
            FeedbackSignal::Duplicate => (-0.10, 0),
        };

        let mut item = self.store.update_item(
            workspace,
            item_id,
            &ItemMutation {
                salience_delta: Some(salience_delta),
                usage_increment,
                ..Default::default()
            },
        )?;

        let mut retired = false;
        if signal == FeedbackSignal::Outdated
            && item.salience <= RETIRE_SALIENCE_FLOOR
            && item.retired_at.is_none()
        {
            item = self.store.update_item(
                workspace,
                item_id,
                &ItemMutation {
                    retired: Some(true),
                    ..Default::default()
                },
            )?;
            retired = true;
        }

        if signal == FeedbackSignal::Duplicate {
            if let Some(canonical) = canonical {
                self.store
                    .add_link(workspace, item_id, canonical, LinkType::DuplicateOf)?;
            }
        }

        self.store.append_feedback(
            workspace,
            &FeedbackRecord {
                item_id: item_id.to_string(),
                signal,
                magnitude,
                at: Utc::now(),
                actor: actor.to_string(),
            },
        )?;

        Ok((
            FeedbackOutcome {
                item_id: item_id.to_string(),
                previous_salience: before.salience,
                new_salience: item.salience,
                delta: item.salience - before.salience,
                retired,
            },
            item,
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
