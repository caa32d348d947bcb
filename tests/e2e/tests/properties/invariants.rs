//! Cross-cutting invariants exercised through the public operations

use mnemon_e2e_tests::harness::TestCore;
use mnemon_core::{
    content_hash, id_sort_key, CoreConfig, ExpandForm, Materials, MemoryError, RankWeights,
    RecallFilters,
};

#[tokio::test]
async fn workspace_isolation_is_total() {
    let t = TestCore::new();
    t.core
        .ingest("acme", "T1", Materials::chat("User: We must encrypt the ledger."), None)
        .await
        .unwrap();
    t.core
        .ingest("globex", "T1", Materials::chat("User: We must publish the ledger."), None)
        .await
        .unwrap();

    // Recall in one workspace never references the other
    let acme = t
        .core
        .recall("acme", "T1", "the ledger", 1000, RecallFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(acme.items.len(), 1);
    assert!(acme.items[0].summary.contains("encrypt"));

    let globex = t
        .core
        .recall("globex", "T1", "the ledger", 1000, RecallFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(globex.items.len(), 1);
    assert!(globex.items[0].summary.contains("publish"));

    // Ids mint independently per workspace, and cross-workspace expansion
    // reads as not-found
    assert_eq!(acme.items[0].id, "S1");
    assert_eq!(globex.items[0].id, "S1");
    let err = t.core.expand("acme", "A2", ExpandForm::Full).await.unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[tokio::test]
async fn identifiers_mint_monotonically_per_kind() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials {
                chat: Some("User: We must sign releases. Implement the signing step.".to_string()),
                logs: Some("2025-03-01 10:00:00 ERROR signer offline".to_string()),
                diffs: None,
            },
            None,
        )
        .await
        .unwrap();
    t.core
        .ingest(
            "default",
            "T2",
            Materials::chat("User: We will pin the toolchain version."),
            None,
        )
        .await
        .unwrap();

    let stats = t.core.stats("default").unwrap();
    assert_eq!(stats.semantic_items, 3);
    assert_eq!(stats.episodic_items, 1);

    // Semantic ids S1..S3 strictly increasing, episodic E1 independent
    for (earlier, later) in [("S1", "S2"), ("S2", "S3")] {
        assert!(id_sort_key(earlier) < id_sort_key(later));
        assert!(t.core.expand("default", later, ExpandForm::Summary).await.is_ok());
    }
    assert!(t.core.expand("default", "E1", ExpandForm::Summary).await.is_ok());
    assert!(t.core.expand("default", "E2", ExpandForm::Summary).await.is_err());
}

#[test]
fn content_hash_ignores_whitespace_and_case() {
    let base = content_hash("Store refresh tokens in httpOnly cookies");
    assert_eq!(content_hash("  store   REFRESH tokens in httponly cookies "), base);
    assert_eq!(content_hash("store\trefresh\ntokens in httponly cookies"), base);
    assert_ne!(content_hash("store refresh tokens in secure cookies"), base);
}

#[tokio::test]
async fn scores_stay_in_unit_interval() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat(
                "User: We must fix the flaky deploy. Implement a retry wrapper. \
                 We will gate deploys on green builds.",
            ),
            None,
        )
        .await
        .unwrap();

    let recall = t
        .core
        .recall(
            "default",
            "T1",
            "fix the deploy bug and decide the plan",
            4000,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();

    assert!(!recall.items.is_empty());
    for item in &recall.items {
        assert!(
            (0.0..=1.0).contains(&item.score),
            "score {} out of range for {}",
            item.score,
            item.id
        );
        assert!((0.0..=1.0).contains(&item.salience));
    }
}

#[test]
fn custom_rank_weights_must_sum_to_one() {
    let mut config = CoreConfig::default();
    config.rank.weights = RankWeights {
        similarity: 0.5,
        salience: 0.2,
        recency: 0.1,
        usage: 0.1,
        kind: 0.05,
        freshness: 0.05,
    };
    assert!(config.validate().is_ok());

    config.rank.weights.freshness = 0.3;
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn budget_is_never_exceeded() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat(
                "User: We must paginate exports. We must compress archives. \
                 Implement the export worker. We will throttle large tenants.",
            ),
            None,
        )
        .await
        .unwrap();

    for budget in [1usize, 5, 17, 60, 400] {
        let recall = t
            .core
            .recall("default", "T1", "plan exports", budget, RecallFilters::default(), None)
            .await
            .unwrap();
        assert!(recall.tokens_used <= budget, "budget {budget}");

        let ws = t
            .core
            .build_working_set("default", "T1", "plan exports", budget, RecallFilters::default(), None)
            .await
            .unwrap();
        assert!(ws.tokens_used <= budget, "budget {budget}");
    }
}

#[tokio::test]
async fn repeated_recall_is_stable() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: We will adopt feature flags. Implement the flag client."),
            None,
        )
        .await
        .unwrap();

    let first = t
        .core
        .recall("default", "T1", "roll out flags", 1000, RecallFilters::default(), None)
        .await
        .unwrap();
    let second = t
        .core
        .recall("default", "T1", "roll out flags", 1000, RecallFilters::default(), None)
        .await
        .unwrap();

    let ids = |r: &mnemon_core::RecallResult| -> Vec<String> {
        r.items.iter().map(|i| i.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}
