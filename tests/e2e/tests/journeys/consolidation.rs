//! Consolidation journeys: duplicate ingestion and supersession

use std::sync::Arc;

use mnemon_e2e_tests::harness::TestCore;
use mnemon_e2e_tests::mocks::ScriptedEmbedding;
use mnemon_core::{
    CoreConfig, EmbeddingProvider, ExpandForm, Expanded, ItemState, Materials, RecallFilters,
};

const AUTH_CHAT: &str =
    "User: We must use JWT for auth.\nAssistant: Agreed. We will store refresh tokens in httpOnly cookies.";

#[tokio::test]
async fn duplicate_ingestion_creates_nothing_new() {
    let t = TestCore::new();

    let first = t
        .core
        .ingest("default", "T1", Materials::chat(AUTH_CHAT), None)
        .await
        .unwrap();
    assert_eq!(first.created_item_ids.len(), 2);

    let second = t
        .core
        .ingest("default", "T1", Materials::chat(AUTH_CHAT), None)
        .await
        .unwrap();
    assert!(second.created_item_ids.is_empty());
    assert_eq!(second.updated_item_ids.len(), 2);

    // Both items were used twice: once at creation, once on re-ingestion
    for id in &first.created_item_ids {
        let record = match t.core.expand("default", id, ExpandForm::Summary).await.unwrap() {
            Expanded::Item(record) => record,
            Expanded::Raw(_) => panic!("expected item record"),
        };
        assert_eq!(record.item.usage_count, 2);
    }

    // Identical material also reuses the artifact
    let stats = t.core.stats("default").unwrap();
    assert_eq!(stats.total_artifacts, 1);
    assert_eq!(stats.total_items, 2);
}

#[tokio::test]
async fn whitespace_and_case_variants_are_exact_duplicates() {
    let t = TestCore::new();

    t.core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: We must use JWT for auth."),
            None,
        )
        .await
        .unwrap();
    let second = t
        .core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: we MUST   use jwt for auth."),
            None,
        )
        .await
        .unwrap();

    assert!(second.created_item_ids.is_empty());
    assert_eq!(second.updated_item_ids.len(), 1);
    // The variant material is a new artifact, but the item is the same
    let stats = t.core.stats("default").unwrap();
    assert_eq!(stats.total_items, 1);
    assert_eq!(stats.total_artifacts, 2);
}

#[tokio::test]
async fn contradictory_decision_supersedes_older_one() {
    // Stage the two decisions close together in vector space
    let provider = ScriptedEmbedding::new(256)
        .pin("Let's use JWT.", &[1.0, 0.0, 0.0])
        .pin(
            "Instead of JWT, use opaque session tokens.",
            &[0.9, 0.436, 0.0],
        )
        // Purpose equidistant from both so freshness decides the order
        .pin("session strategy", &[0.97, 0.22, 0.0]);
    let t = TestCore::with_provider(Arc::new(provider), CoreConfig::default());

    let first = t
        .core
        .ingest("default", "T1", Materials::chat("User: Let's use JWT."), None)
        .await
        .unwrap();
    assert_eq!(first.created_item_ids, vec!["S1"]);

    let second = t
        .core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: Instead of JWT, use opaque session tokens."),
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.created_item_ids, vec!["S2"]);

    // The older decision is superseded by the newer one
    let old = match t.core.expand("default", "S1", ExpandForm::Summary).await.unwrap() {
        Expanded::Item(record) => record,
        Expanded::Raw(_) => panic!("expected item record"),
    };
    assert_eq!(old.item.state, ItemState::Superseded);
    assert_eq!(old.superseded_by.as_deref(), Some("S2"));

    // Recall returns both, the superseded one strictly lower
    let recall = t
        .core
        .recall(
            "default",
            "T1",
            "session strategy",
            4000,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 2);
    assert_eq!(recall.items[0].id, "S2");
    assert_eq!(recall.items[1].id, "S1");
}

#[tokio::test]
async fn near_duplicate_merges_instead_of_creating() {
    let provider = ScriptedEmbedding::new(256)
        .pin("Let's use sqlite here.", &[1.0, 0.0, 0.0])
        .pin("Let's use sqlite for all persistence work.", &[1.0, 0.01, 0.0]);
    let t = TestCore::with_provider(Arc::new(provider), CoreConfig::default());

    t.core
        .ingest("default", "T1", Materials::chat("User: Let's use sqlite here."), None)
        .await
        .unwrap();
    let second = t
        .core
        .ingest(
            "default",
            "T1",
            Materials::chat("User: Let's use sqlite for all persistence work."),
            None,
        )
        .await
        .unwrap();

    assert!(second.created_item_ids.is_empty());
    assert_eq!(second.updated_item_ids, vec!["S1"]);

    let merged = match t.core.expand("default", "S1", ExpandForm::Summary).await.unwrap() {
        Expanded::Item(record) => record,
        Expanded::Raw(_) => panic!("expected item record"),
    };
    // Longer, newer summary wins; the delta lands under `revisions`
    assert_eq!(merged.item.summary, "Let's use sqlite for all persistence work.");
    assert_eq!(merged.item.usage_count, 2);
    let revisions = merged.item.payload.as_ref().unwrap()["revisions"]
        .as_array()
        .unwrap();
    assert_eq!(revisions.len(), 1);
}

#[tokio::test]
async fn second_pass_usage_matches_candidate_count() {
    // Consolidation safety: re-ingesting a document bumps each affected
    // item's usage by exactly the number of matching candidates
    let t = TestCore::new();
    let chat = "User: We must encrypt data at rest.\nUser: We must encrypt data in transit.\nUser: Implement the key rotation job.";

    let first = t
        .core
        .ingest("default", "T1", Materials::chat(chat), None)
        .await
        .unwrap();
    assert_eq!(first.created_item_ids.len(), 3);

    let second = t
        .core
        .ingest("default", "T1", Materials::chat(chat), None)
        .await
        .unwrap();
    assert!(second.created_item_ids.is_empty());
    assert_eq!(second.updated_item_ids.len(), 3);

    for id in &first.created_item_ids {
        let record = match t.core.expand("default", id, ExpandForm::Summary).await.unwrap() {
            Expanded::Item(record) => record,
            Expanded::Raw(_) => panic!("expected item record"),
        };
        assert_eq!(record.item.usage_count, 2, "item {id}");
    }
}

#[tokio::test]
async fn embedding_outage_still_persists_items() {
    // A provider that never pins anything and errors on everything
    struct DownProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for DownProvider {
        fn model_id(&self) -> &str {
            "down-v1"
        }
        fn dimensions(&self) -> usize {
            256
        }
        async fn embed(
            &self,
            _texts: &[String],
        ) -> Result<Vec<Vec<f32>>, mnemon_core::EmbedError> {
            Err(mnemon_core::EmbedError::ProviderUnavailable("down".into()))
        }
    }

    let mut config = CoreConfig::default();
    config.embed.max_retries = 0;
    config.embed.base_backoff = std::time::Duration::from_millis(1);
    let t = TestCore::with_provider(Arc::new(DownProvider), config);

    let result = t
        .core
        .ingest("default", "T1", Materials::chat("User: We must ship regardless."), None)
        .await
        .unwrap();
    assert_eq!(result.created_item_ids.len(), 1);

    let stats = t.core.stats("default").unwrap();
    assert_eq!(stats.embeddings_pending, 1);
    assert_eq!(stats.items_with_embeddings, 0);
}

#[tokio::test]
async fn backfill_resolves_pending_embeddings() {
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Provider that is down until flipped healthy
    struct RecoveringProvider {
        healthy: AtomicBool,
        inner: mnemon_core::HashEmbedding,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for RecoveringProvider {
        fn model_id(&self) -> &str {
            "recovering-v1"
        }
        fn dimensions(&self) -> usize {
            256
        }
        async fn embed(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, mnemon_core::EmbedError> {
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(mnemon_core::EmbedError::ProviderUnavailable("warming up".into()));
            }
            self.inner.embed(texts).await
        }
    }

    let provider = Arc::new(RecoveringProvider {
        healthy: AtomicBool::new(false),
        inner: mnemon_core::HashEmbedding::new(256),
    });
    let mut config = CoreConfig::default();
    config.embed.max_retries = 0;
    config.embed.base_backoff = std::time::Duration::from_millis(1);
    let t = TestCore::with_provider(provider.clone(), config);

    t.core
        .ingest("default", "T1", Materials::chat("User: We will batch the embedding calls."), None)
        .await
        .unwrap();
    assert_eq!(t.core.stats("default").unwrap().embeddings_pending, 1);

    provider.healthy.store(true, Ordering::SeqCst);
    let report = t.core.backfill_embeddings("default", None).await.unwrap();
    assert_eq!(report.resolved, 1);
    assert_eq!(report.still_pending, 0);

    let stats = t.core.stats("default").unwrap();
    assert_eq!(stats.embeddings_pending, 0);
    assert_eq!(stats.items_with_embeddings, 1);

    // The backfilled vector participates in retrieval
    let recall = t
        .core
        .recall(
            "default",
            "T1",
            "batch the embedding calls",
            1000,
            RecallFilters::default(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(recall.items.len(), 1);
}
