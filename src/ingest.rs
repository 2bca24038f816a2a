// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Text-in, vectors-out boundary around the store
//!
//! The store only ever receives finished vectors. An [`Ingestor`] composes
//! the searchable text of an object, asks an [`Embedder`] for a vector and
//! hands the result to the store.

use crate::core::filter::Predicate;
use crate::core::types::{NewObject, ObjectId, Properties};
use crate::error::StoreError;
use crate::store::{KnowledgeStore, QueryRequest, QueryResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Which side of retrieval a text is embedded for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskHint {
    Document,
    Query,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Collection '{0}' has no searchable text for this object")]
    EmptyText(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, hint: TaskHint) -> Result<Vec<f32>, IngestError>;
}

pub struct Ingestor<E: Embedder> {
    store: KnowledgeStore,
    embedder: E,
}

impl<E: Embedder> Ingestor<E> {
    pub fn new(store: KnowledgeStore, embedder: E) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    async fn prepare(
        &self,
        collection: &str,
        properties: Properties,
        references: BTreeMap<String, Vec<ObjectId>>,
    ) -> Result<NewObject, IngestError> {
        let def = self.store.collection(collection)?;
        // Reject bad input before paying for an embedding
        def.validate_properties(&properties)?;

        let text = def.searchable_text(&properties);
        if text.is_empty() {
            return Err(IngestError::EmptyText(collection.to_string()));
        }
        let vector = self.embedder.embed(&text, TaskHint::Document).await?;
        debug!("Embedded {} chars for {}", text.len(), collection);

        Ok(NewObject {
            collection: collection.to_string(),
            properties,
            vector,
            references,
        })
    }

    pub async fn ingest(
        &self,
        collection: &str,
        properties: Properties,
        references: BTreeMap<String, Vec<ObjectId>>,
    ) -> Result<ObjectId, IngestError> {
        let new = self.prepare(collection, properties, references).await?;
        Ok(self.store.insert(new).await?)
    }

    /// Ingest an untyped JSON property object.
    pub async fn ingest_json(
        &self,
        collection: &str,
        properties: &Value,
        references: BTreeMap<String, Vec<ObjectId>>,
    ) -> Result<ObjectId, IngestError> {
        let typed = self.store.collection(collection)?.properties_from_json(properties)?;
        self.ingest(collection, typed, references).await
    }

    /// Embed and insert a successor to `old`, superseding it.
    pub async fn revise(
        &self,
        old: ObjectId,
        properties: Properties,
        references: BTreeMap<String, Vec<ObjectId>>,
    ) -> Result<ObjectId, IngestError> {
        let collection = self.store.get(old).await?.collection;
        let new = self.prepare(&collection, properties, references).await?;
        Ok(self.store.revise(old, new).await?)
    }

    /// Embed `text` as a query and rank active objects of `collection`.
    pub async fn search(
        &self,
        collection: &str,
        text: &str,
        k: usize,
        filter: Option<Predicate>,
    ) -> Result<QueryResult, IngestError> {
        let vector = self.embedder.embed(text, TaskHint::Query).await?;
        let mut request = QueryRequest::new(collection).with_vector(vector).with_k(k);
        request.filter = filter;
        Ok(self.store.query(request).await?)
    }
}
