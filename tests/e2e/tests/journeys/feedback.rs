//! Feedback journeys: salience movement, saturation, retirement, duplicates

use std::sync::Arc;

use mnemon_e2e_tests::harness::TestCore;
use mnemon_core::{
    ExpandForm, Expanded, FeedbackSignal, ItemState, Materials, MemoryError, RecallFilters,
};

async fn seed_item(t: &TestCore) -> String {
    let result = t
        .core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: We will cache embeddings aggressively."),
            None,
        )
        .await
        .unwrap();
    result.created_item_ids[0].clone()
}

async fn item_state(t: &TestCore, id: &str) -> (f64, i64, ItemState) {
    match t.core.expand("default", id, ExpandForm::Summary).await.unwrap() {
        Expanded::Item(record) => (record.item.salience, record.item.usage_count, record.item.state),
        Expanded::Raw(_) => panic!("expected item record"),
    }
}

#[tokio::test]
async fn helpful_feedback_saturates_at_one() {
    let t = TestCore::new();
    let id = seed_item(&t).await;

    for _ in 0..30 {
        let outcome = t
            .core
            .feedback("default", &id, FeedbackSignal::Helpful, 1.0, None, "client", None)
            .await
            .unwrap();
        assert!(outcome.new_salience <= 1.0);
    }

    let (salience, usage, state) = item_state(&t, &id).await;
    assert_eq!(salience, 1.0);
    // One use at creation plus thirty helpful signals
    assert_eq!(usage, 31);
    assert_eq!(state, ItemState::Active);
}

#[tokio::test]
async fn outdated_feedback_retires_at_the_floor() {
    let t = TestCore::new();
    let id = seed_item(&t).await;

    // Initial decision salience is 0.8: four outdated signals reach the floor
    let mut retired = false;
    for _ in 0..4 {
        let outcome = t
            .core
            .feedback("default", &id, FeedbackSignal::Outdated, 1.0, None, "client", None)
            .await
            .unwrap();
        retired = outcome.retired;
    }
    assert!(retired);

    let (salience, _, state) = item_state(&t, &id).await;
    assert!(salience <= 0.1);
    assert_eq!(state, ItemState::Retired);

    // Retired items drop out of recall
    let recall = t
        .core
        .recall(
            "default",
            "T1",
            "cache embeddings",
            1000,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();
    assert!(recall.items.is_empty());

    // Unless explicitly included
    let recall = t
        .core
        .recall(
            "default",
            "T1",
            "cache embeddings",
            1000,
            RecallFilters {
                include_retired: true,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 1);
}

#[tokio::test]
async fn duplicate_feedback_links_to_canonical() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: We will shard by workspace id.\nUser: We will shard the data by the workspace identifier."),
            None,
        )
        .await
        .unwrap();

    t.core
        .feedback(
            "default",
            "S2",
            FeedbackSignal::Duplicate,
            1.0,
            Some("S1"),
            "client",
            None,
        )
        .await
        .unwrap();

    let record = match t.core.expand("default", "S2", ExpandForm::Summary).await.unwrap() {
        Expanded::Item(record) => record,
        Expanded::Raw(_) => panic!("expected item record"),
    };
    assert_eq!(record.duplicate_of.as_deref(), Some("S1"));
}

#[tokio::test]
async fn concurrent_feedback_commutes_and_saturates() {
    let t = Arc::new(TestCore::new());
    let id = seed_item(&t).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let t = Arc::clone(&t);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            t.core
                .feedback("default", &id, FeedbackSignal::Helpful, 1.0, None, "client", None)
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let (salience, usage, _) = item_state(&t, &id).await;
    // 0.8 + 16 * 0.05 saturates at 1.0; usage is exact
    assert_eq!(salience, 1.0);
    assert_eq!(usage, 17);
}

#[tokio::test]
async fn invalid_feedback_rejected() {
    let t = TestCore::new();
    let id = seed_item(&t).await;

    let err = t
        .core
        .feedback("default", &id, FeedbackSignal::Helpful, 2.0, None, "client", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::InputInvalid(_)));

    let err = t
        .core
        .feedback("default", "S99", FeedbackSignal::Helpful, 1.0, None, "client", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn feedback_is_workspace_scoped() {
    let t = TestCore::new();
    let id = seed_item(&t).await;

    let err = t
        .core
        .feedback("other", &id, FeedbackSignal::Helpful, 1.0, None, "client", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}
