//! Working-set journeys: budget packing and deterministic assembly

use mnemon_e2e_tests::harness::TestCore;
use mnemon_core::{Materials, RecallFilters, TokenEstimator};

/// Twenty task lines, each exactly 280 characters (70 tokens under the
/// default estimator), with mostly disjoint vocabulary so none of them
/// consolidate into each other.
fn twenty_tasks() -> String {
    let mut lines = Vec::new();
    for i in 0..20 {
        let mut line = format!(
            "Implement stage{i:02} covering alpha{i:02} beta{i:02} gamma{i:02} delta{i:02} "
        );
        let pad = 280 - line.len();
        line.push_str(&"z".repeat(pad));
        assert_eq!(line.len(), 280);
        lines.push(line);
    }
    format!("User: {}", lines.join("\n"))
}

#[tokio::test]
async fn budget_packs_exactly_five_of_twenty() {
    let t = TestCore::new();
    t.core
        .ingest("default", "T1", Materials::chat(twenty_tasks()), None)
        .await
        .unwrap();
    assert_eq!(t.core.stats("default").unwrap().total_items, 20);

    let purpose = "plan the migration";
    let mission_cost = TokenEstimator::CharsOver4.estimate(purpose);
    let budget = mission_cost + 5 * 70;

    let ws = t
        .core
        .build_working_set("default", "T1", purpose, budget, RecallFilters::default(), None)
        .await
        .unwrap();

    assert_eq!(ws.focus_tasks.len(), 5);
    assert_eq!(ws.citations["focus_tasks"].len(), 5);
    assert!(ws.tokens_used <= budget);
    assert_eq!(ws.tokens_available, budget - ws.tokens_used);
    // Three or more tasks selected: the runbook is tasks only, numbered
    assert_eq!(ws.runbook.len(), 5);
    assert!(ws.runbook[0].starts_with("1. "));
}

#[tokio::test]
async fn working_set_is_deterministic() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat(
                "User: We must not expose internal ids. We will paginate the listing endpoint. \
                 Implement cursor encoding. Should the cursor embed the sort key?",
            ),
            None,
        )
        .await
        .unwrap();

    let build = || async {
        t.core
            .build_working_set(
                "default",
                "T1",
                "plan the pagination work",
                800,
                RecallFilters::default(),
                None,
            )
            .await
            .unwrap()
    };

    let first = build().await;
    let second = build().await;
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
}

#[tokio::test]
async fn sections_follow_subtypes() {
    let t = TestCore::new();
    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat(
                "User: We must not log raw tokens. We will rotate signing keys weekly. \
                 Implement the rotation scheduler. Should rotation pause during incidents?",
            ),
            None,
        )
        .await
        .unwrap();

    let ws = t
        .core
        .build_working_set(
            "default",
            "T1",
            "plan the key rotation",
            2000,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(ws.constraints.len(), 1);
    assert!(ws.constraints[0].contains("not log raw tokens"));
    assert_eq!(ws.focus_decisions.len(), 1);
    assert_eq!(ws.focus_tasks.len(), 1);
    assert_eq!(ws.open_questions.len(), 1);
    assert!(ws.open_questions[0].contains("pause during incidents"));
    assert_eq!(ws.artifacts.len(), 1);
    assert_eq!(ws.artifacts[0].artifact_id, "A1");
    assert_eq!(ws.artifacts[0].title, "chat material");
}

#[tokio::test]
async fn empty_thread_yields_mission_only() {
    let t = TestCore::new();
    let ws = t
        .core
        .build_working_set(
            "default",
            "T1",
            "bootstrap the project",
            300,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(ws.mission, "bootstrap the project");
    assert!(ws.constraints.is_empty());
    assert!(ws.focus_decisions.is_empty());
    assert!(ws.runbook.is_empty());
    assert!(ws.citations.is_empty());
    assert!(ws.tokens_used <= 300);
}

#[tokio::test]
async fn tiny_budget_truncates_mission() {
    let t = TestCore::new();
    t.core
        .ingest("default", "T1", Materials::chat("User: We must keep budgets honest."), None)
        .await
        .unwrap();

    let ws = t
        .core
        .build_working_set(
            "default",
            "T1",
            "a deliberately verbose purpose statement that cannot fit in a tiny budget",
            4,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();

    assert!(ws.tokens_used <= 4);
    assert_eq!(ws.tokens_available, 0);
    assert!(ws.constraints.is_empty());
    assert!(ws.citations.is_empty());
}

#[tokio::test]
async fn invalid_budget_and_purpose_rejected() {
    let t = TestCore::new();
    assert!(t
        .core
        .build_working_set("default", "T1", "", 100, RecallFilters::default(), None)
        .await
        .is_err());
    assert!(t
        .core
        .build_working_set("default", "T1", "purpose", 0, RecallFilters::default(), None)
        .await
        .is_err());
}
