// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::{axis, entity, insight, kb_store, random_vectors, DIM};
use approx::assert_abs_diff_eq;
use chrono::{Duration, Utc};
use knowledge_store::core::filter::FilterError;
use knowledge_store::{KnowledgeStore, ObjectId, Predicate, QueryRequest, StoreError};
use serde_json::json;

async fn tagged(store: &KnowledgeStore, content: &str, domain: &str, tags: &[&str], v: Vec<f32>) -> ObjectId {
    store
        .insert(
            insight(content, v)
                .with_property("domain", domain)
                .with_property("tags", tags.to_vec()),
        )
        .await
        .unwrap()
}

#[cfg(test)]
mod filter_query_tests {
    use super::*;

    #[tokio::test]
    async fn test_filter_only_keeps_insertion_order() {
        let store = kb_store();
        let a = tagged(&store, "A", "work", &["rag"], axis(0)).await;
        tagged(&store, "B", "personal", &["rag"], axis(1)).await;
        let c = tagged(&store, "C", "work", &[], axis(2)).await;
        let d = tagged(&store, "D", "work", &["ops"], axis(3)).await;

        let result = store
            .query(QueryRequest::new("Insight").with_filter(Predicate::equal("domain", "work")))
            .await
            .unwrap();
        assert!(!result.ranked);
        assert_eq!(result.ids(), vec![a, c, d]);
        assert!(result.hits.iter().all(|h| h.distance.is_none()));

        let limited = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::equal("domain", "work"))
                    .with_limit(2),
            )
            .await
            .unwrap();
        assert_eq!(limited.ids(), vec![a, c]);
    }

    #[tokio::test]
    async fn test_filter_errors_surface() {
        let store = kb_store();
        tagged(&store, "A", "work", &[], axis(0)).await;

        let err = store
            .query(QueryRequest::new("Insight").with_filter(Predicate::like("content", "*A*")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Filter(FilterError::NotFilterable(_))));

        let err = store
            .query(QueryRequest::new("Insight").with_filter(Predicate::equal("domain", "hobby")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Filter(FilterError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_fields_are_filterable() {
        let store = kb_store();
        let old = tagged(&store, "A", "work", &[], axis(0)).await;
        let shelved = tagged(&store, "B", "work", &[], axis(1)).await;
        let new = tagged(&store, "C", "work", &[], axis(2)).await;
        store.archive(shelved).await.unwrap();
        store.supersede(old, new).await.unwrap();

        let archived = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::equal("status", "archived"))
                    .with_history(),
            )
            .await
            .unwrap();
        assert_eq!(archived.ids(), vec![shelved]);

        let replaced = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::equal("superseded_by", new.to_string()))
                    .with_history(),
            )
            .await
            .unwrap();
        assert_eq!(replaced.ids(), vec![old]);

        let recent = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::greater_than("created_at", Utc::now() - Duration::days(7))),
            )
            .await
            .unwrap();
        assert_eq!(recent.ids(), vec![new]);

        let ancient = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::less_than("updated_at", Utc::now() - Duration::days(7)))
                    .with_history(),
            )
            .await
            .unwrap();
        assert!(ancient.hits.is_empty());
    }

    #[tokio::test]
    async fn test_json_combinator_is_anded_with_sibling_fields() {
        let store = kb_store();
        let work = tagged(&store, "A", "work", &[], axis(0)).await;
        tagged(&store, "B", "personal", &[], axis(1)).await;

        let filter = Predicate::from_json(&json!({
            "$or": [{"domain": "work"}, {"domain": "personal"}],
            "domain": "work"
        }))
        .unwrap();
        let result = store
            .query(QueryRequest::new("Insight").with_filter(filter))
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![work]);
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = kb_store();
        tagged(&store, "A", "work", &[], axis(0)).await;

        let result = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::contains("tags", "missing"))
                    .with_vector(axis(0)),
            )
            .await
            .unwrap();
        assert!(result.is_empty());
        assert!(result.ranked);
    }
}

#[cfg(test)]
mod vector_query_tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_vector_ranks_first_at_zero() {
        let store = kb_store();
        let vectors = random_vectors(20, DIM, 9);
        let mut ids = Vec::new();
        for (i, v) in vectors.iter().enumerate() {
            ids.push(store.insert(entity(&format!("E{}", i), v.clone())).await.unwrap());
        }

        let result = store
            .query(QueryRequest::new("Entity").with_vector(vectors[7].clone()).with_k(1))
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![ids[7]]);
        assert_abs_diff_eq!(result.hits[0].distance.unwrap(), 0.0, epsilon = 1e-5);
    }

    #[tokio::test]
    async fn test_ranking_is_ascending_and_k_bounded() {
        let store = kb_store();
        for (i, v) in random_vectors(30, DIM, 10).into_iter().enumerate() {
            store.insert(entity(&format!("E{}", i), v)).await.unwrap();
        }

        let result = store
            .query(QueryRequest::new("Entity").with_vector(axis(0)).with_k(5))
            .await
            .unwrap();
        assert_eq!(result.len(), 5);
        let distances: Vec<f32> = result.hits.iter().map(|h| h.distance.unwrap()).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));

        let defaulted = store
            .query(QueryRequest::new("Entity").with_vector(axis(0)))
            .await
            .unwrap();
        assert_eq!(defaulted.len(), store.config().default_k);
    }

    #[tokio::test]
    async fn test_filter_applied_before_ranking() {
        let store = kb_store();
        tagged(&store, "near personal", "personal", &[], axis(0)).await;
        let work = tagged(&store, "far work", "work", &[], axis(1)).await;

        let result = store
            .query(
                QueryRequest::new("Insight")
                    .with_filter(Predicate::equal("domain", "work"))
                    .with_vector(axis(0))
                    .with_k(5),
            )
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![work]);
    }

    #[tokio::test]
    async fn test_history_scope_for_ranked_queries() {
        let store = kb_store();
        let old = store.insert(insight("v1", axis(0))).await.unwrap();
        let new = store.revise(old, insight("v2", axis(1))).await.unwrap();

        let current = store
            .query(QueryRequest::new("Insight").with_vector(axis(0)).with_k(5))
            .await
            .unwrap();
        assert_eq!(current.ids(), vec![new]);

        let all = store
            .query(QueryRequest::new("Insight").with_vector(axis(0)).with_k(5).with_history())
            .await
            .unwrap();
        assert_eq!(all.ids(), vec![old, new]);
    }

    #[tokio::test]
    async fn test_zero_k_and_bad_dimension() {
        let store = kb_store();
        store.insert(entity("A", axis(0))).await.unwrap();

        let result = store
            .query(QueryRequest::new("Entity").with_vector(axis(0)).with_k(0))
            .await
            .unwrap();
        assert!(result.is_empty());

        assert!(matches!(
            store.query(QueryRequest::new("Entity").with_vector(vec![1.0])).await,
            Err(StoreError::Dimension { .. })
        ));
    }

    #[tokio::test]
    async fn test_collections_are_searched_separately() {
        let store = kb_store();
        store.insert(entity("E", axis(0))).await.unwrap();
        let i = store.insert(insight("I", axis(1))).await.unwrap();

        let result = store
            .query(QueryRequest::new("Insight").with_vector(axis(0)).with_k(10))
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![i]);
    }
}

#[cfg(test)]
mod expansion_tests {
    use super::*;

    #[tokio::test]
    async fn test_requested_slots_attached() {
        let store = kb_store();
        let e1 = store.insert(entity("KPMG", axis(0))).await.unwrap();
        let e2 = store.insert(entity("EY", axis(1))).await.unwrap();
        let i = store
            .insert(insight("Audit", axis(2)).with_reference("relatedEntities", [e2, e1]))
            .await
            .unwrap();

        let result = store
            .query(
                QueryRequest::new("Insight")
                    .with_vector(axis(2))
                    .with_k(1)
                    .expand("relatedEntities")
                    .expand("relatedInsights"),
            )
            .await
            .unwrap();

        let hit = &result.hits[0];
        assert_eq!(hit.object.id, i);
        let names: Vec<_> = hit.references["relatedEntities"]
            .iter()
            .map(|o| o.text("name").unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["EY", "KPMG"]);
        assert!(hit.references["relatedInsights"].is_empty());
    }

    #[tokio::test]
    async fn test_unknown_slot_rejected() {
        let store = kb_store();
        assert!(matches!(
            store
                .query(QueryRequest::new("Entity").expand("relatedEntities"))
                .await,
            Err(StoreError::Slot { .. })
        ));
    }
}
