// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::{kb_store, test_config, DIM};
use async_trait::async_trait;
use knowledge_store::core::schema::{CollectionDef, PropertyDef, SchemaRegistry};
use knowledge_store::core::types::Properties;
use knowledge_store::{
    Embedder, IngestError, Ingestor, KnowledgeStore, Predicate, Status, StoreError, TaskHint,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Mutex;

const KEYWORDS: [&str; DIM] = ["agents", "audit", "trust", "garden"];

/// Counts keyword hits per axis and records every hint it was given.
#[derive(Default)]
struct KeywordEmbedder {
    hints: Mutex<Vec<TaskHint>>,
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str, hint: TaskHint) -> Result<Vec<f32>, IngestError> {
        self.hints.lock().unwrap().push(hint);
        let text = text.to_lowercase();
        if text.contains("explode") {
            return Err(IngestError::Embedding("model unavailable".to_string()));
        }
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|k| text.matches(k).count() as f32)
            .collect();
        if vector.iter().all(|x| *x == 0.0) {
            vector[DIM - 1] = 0.1;
        }
        Ok(vector)
    }
}

/// Always returns a vector of the wrong length.
struct ShortEmbedder;

#[async_trait]
impl Embedder for ShortEmbedder {
    async fn embed(&self, _text: &str, _hint: TaskHint) -> Result<Vec<f32>, IngestError> {
        Ok(vec![1.0])
    }
}

fn content(text: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("content".into(), text.into());
    properties
}

#[cfg(test)]
mod ingest_tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_and_search() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let agents = ingestor
            .ingest("Insight", content("Agents need tools and more agents"), BTreeMap::new())
            .await
            .unwrap();
        ingestor
            .ingest("Insight", content("Audit trails build trust"), BTreeMap::new())
            .await
            .unwrap();

        let result = ingestor.search("Insight", "how do agents work", 1, None).await.unwrap();
        assert_eq!(result.ids(), vec![agents]);

        let hints = ingestor.embedder().hints.lock().unwrap().clone();
        assert_eq!(hints, vec![TaskHint::Document, TaskHint::Document, TaskHint::Query]);
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let mut personal = content("Agents for the garden");
        personal.insert("domain".into(), "personal".into());
        let mut work = content("Agents for audit");
        work.insert("domain".into(), "work".into());

        ingestor.ingest("Insight", personal, BTreeMap::new()).await.unwrap();
        let work = ingestor.ingest("Insight", work, BTreeMap::new()).await.unwrap();

        let result = ingestor
            .search(
                "Insight",
                "garden agents",
                5,
                Some(Predicate::equal("domain", "work")),
            )
            .await
            .unwrap();
        assert_eq!(result.ids(), vec![work]);
    }

    #[tokio::test]
    async fn test_ingest_json_with_references() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let kpmg = ingestor
            .ingest_json("Entity", &json!({"name": "KPMG audit", "domain": "work"}), BTreeMap::new())
            .await
            .unwrap();

        let refs = BTreeMap::from([("relatedEntities".to_string(), vec![kpmg])]);
        let insight = ingestor
            .ingest_json(
                "Insight",
                &json!({"content": "Audit builds trust", "tags": ["audit"]}),
                refs,
            )
            .await
            .unwrap();

        let linked = ingestor.store().resolve_slot(insight, "relatedEntities").await.unwrap();
        assert_eq!(linked[0].id, kpmg);
    }

    #[tokio::test]
    async fn test_revise_embeds_successor() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let v1 = ingestor
            .ingest("Insight", content("Trust is slow"), BTreeMap::new())
            .await
            .unwrap();
        let v2 = ingestor
            .revise(v1, content("Trust is earned through audit"), BTreeMap::new())
            .await
            .unwrap();

        let store = ingestor.store();
        assert_eq!(store.get(v1).await.unwrap().status, Status::Superseded);
        assert_eq!(store.current_version(v1).await.unwrap().id, v2);
        let result = ingestor.search("Insight", "trust", 5, None).await.unwrap();
        assert_eq!(result.ids(), vec![v2]);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_properties_rejected_before_embedding() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let err = ingestor
            .ingest("Insight", Properties::new(), BTreeMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store(StoreError::Validation { .. })));
        assert!(ingestor.embedder().hints.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_searchable_text() {
        let mut schema = SchemaRegistry::new();
        schema
            .define_collection(
                CollectionDef::new("Label").property(PropertyDef::text("key").filterable()),
            )
            .unwrap();
        let store = KnowledgeStore::new(test_config(), schema).unwrap();
        let ingestor = Ingestor::new(store, KeywordEmbedder::default());

        let mut properties = Properties::new();
        properties.insert("key".into(), "x".into());
        let err = ingestor.ingest("Label", properties, BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyText(ref c) if c == "Label"));
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let ingestor = Ingestor::new(kb_store(), KeywordEmbedder::default());
        let err = ingestor
            .ingest("Insight", content("This will explode"), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Embedding(_)));
        assert_eq!(ingestor.store().count("Insight", true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_embedding_length() {
        let ingestor = Ingestor::new(kb_store(), ShortEmbedder);
        let err = ingestor
            .ingest("Insight", content("Agents"), BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Store(StoreError::Dimension { expected: DIM, actual: 1 })
        ));
    }
}
