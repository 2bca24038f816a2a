// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::{axis, entity, insight, kb_store};
use knowledge_store::{NotFound, ObjectId, QueryRequest, Status, StoreError};

#[cfg(test)]
mod supersede_tests {
    use super::*;

    #[tokio::test]
    async fn test_superseded_object_leaves_default_scope() {
        let store = kb_store();
        let i1 = store.insert(insight("A", axis(0))).await.unwrap();
        let i2 = store.insert(insight("B", axis(1))).await.unwrap();

        store.supersede(i1, i2).await.unwrap();

        let old = store.get(i1).await.unwrap();
        assert_eq!(old.status, Status::Superseded);
        assert_eq!(old.superseded_by, Some(i2));

        let current = store.query(QueryRequest::new("Insight")).await.unwrap();
        assert_eq!(current.ids(), vec![i2]);
        assert_eq!(current.hits[0].object.text("content"), Some("B"));

        let history = store
            .query(QueryRequest::new("Insight").with_history())
            .await
            .unwrap();
        assert_eq!(history.ids(), vec![i1, i2]);
        assert_eq!(history.hits[0].object.superseded_by, Some(i2));
    }

    #[tokio::test]
    async fn test_only_active_objects_transition() {
        let store = kb_store();
        let a = store.insert(insight("A", axis(0))).await.unwrap();
        let b = store.insert(insight("B", axis(1))).await.unwrap();
        let c = store.insert(insight("C", axis(2))).await.unwrap();

        store.supersede(a, b).await.unwrap();
        assert!(matches!(
            store.supersede(a, c).await,
            Err(StoreError::State { id, status: Status::Superseded, .. }) if id == a
        ));
        assert!(matches!(store.archive(a).await, Err(StoreError::State { .. })));

        // A retired successor is refused
        store.archive(c).await.unwrap();
        assert!(matches!(
            store.supersede(b, c).await,
            Err(StoreError::State { id, .. }) if id == c
        ));
        assert_eq!(store.get(b).await.unwrap().status, Status::Active);
    }

    #[tokio::test]
    async fn test_self_and_cross_collection_rejected() {
        let store = kb_store();
        let i = store.insert(insight("A", axis(0))).await.unwrap();
        let e = store.insert(entity("KPMG", axis(1))).await.unwrap();

        assert!(matches!(store.supersede(i, i).await, Err(StoreError::State { .. })));
        match store.supersede(i, e).await.unwrap_err() {
            StoreError::CollectionMismatch {
                old_collection,
                new_collection,
                ..
            } => {
                assert_eq!(old_collection, "Insight");
                assert_eq!(new_collection, "Entity");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.get(i).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_unknown_identifiers() {
        let store = kb_store();
        let i = store.insert(insight("A", axis(0))).await.unwrap();
        assert!(matches!(
            store.supersede(i, ObjectId::new()).await,
            Err(StoreError::NotFound(NotFound::Object(_)))
        ));
        assert!(store.get(i).await.unwrap().is_active());
    }
}

#[cfg(test)]
mod revise_tests {
    use super::*;

    #[tokio::test]
    async fn test_revise_inserts_and_supersedes() {
        let store = kb_store();
        let v1 = store.insert(insight("v1", axis(0))).await.unwrap();
        let v2 = store.revise(v1, insight("v2", axis(1))).await.unwrap();

        assert_eq!(store.get(v1).await.unwrap().superseded_by, Some(v2));
        assert!(store.get(v2).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_failed_revise_changes_nothing() {
        let store = kb_store();
        let v1 = store.insert(insight("v1", axis(0))).await.unwrap();
        let e = store.insert(entity("KPMG", axis(1))).await.unwrap();

        // Invalid successor content
        assert!(store.revise(v1, insight("bad", vec![1.0])).await.is_err());
        // Successor in another collection
        assert!(matches!(
            store.revise(v1, entity("EY", axis(2))).await,
            Err(StoreError::CollectionMismatch { .. })
        ));
        // Dangling reference on the successor
        assert!(store
            .revise(
                v1,
                insight("v2", axis(2)).with_reference("relatedEntities", [ObjectId::new()])
            )
            .await
            .is_err());

        assert!(store.get(v1).await.unwrap().is_active());
        assert_eq!(store.count("Insight", true).await.unwrap(), 1);
        assert_eq!(store.count("Entity", true).await.unwrap(), 1);
        assert!(store.inbound_references(e, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revise_superseded_object_rejected() {
        let store = kb_store();
        let v1 = store.insert(insight("v1", axis(0))).await.unwrap();
        store.revise(v1, insight("v2", axis(1))).await.unwrap();

        assert!(matches!(
            store.revise(v1, insight("v3", axis(2))).await,
            Err(StoreError::State { .. })
        ));
        assert_eq!(store.count("Insight", true).await.unwrap(), 2);
    }
}

#[cfg(test)]
mod version_tests {
    use super::*;

    #[tokio::test]
    async fn test_current_version_follows_chain() {
        let store = kb_store();
        let v1 = store.insert(insight("v1", axis(0))).await.unwrap();
        let v2 = store.revise(v1, insight("v2", axis(1))).await.unwrap();
        let v3 = store.revise(v2, insight("v3", axis(2))).await.unwrap();

        assert_eq!(store.current_version(v1).await.unwrap().id, v3);
        assert_eq!(store.current_version(v2).await.unwrap().id, v3);
        assert_eq!(store.current_version(v3).await.unwrap().id, v3);
    }

    #[tokio::test]
    async fn test_version_history_oldest_first() {
        let store = kb_store();
        let v1 = store.insert(insight("v1", axis(0))).await.unwrap();
        let v2 = store.revise(v1, insight("v2", axis(1))).await.unwrap();
        let v3 = store.revise(v2, insight("v3", axis(2))).await.unwrap();

        let history: Vec<_> = store
            .version_history(v3)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(history, vec![v1, v2, v3]);

        let partial: Vec<_> = store
            .version_history(v2)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(partial, vec![v1, v2]);
    }

    #[tokio::test]
    async fn test_archived_object_has_no_successor() {
        let store = kb_store();
        let id = store.insert(insight("retired", axis(0))).await.unwrap();
        store.archive(id).await.unwrap();

        let object = store.current_version(id).await.unwrap();
        assert_eq!(object.status, Status::Archived);
        assert!(object.superseded_by.is_none());
        assert_eq!(store.version_history(id).await.unwrap().len(), 1);
    }
}
