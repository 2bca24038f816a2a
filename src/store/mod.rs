// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! The knowledge store handle
//!
//! One `StoreState` (objects, per-collection insertion order, reverse
//! reference index) behind a single lock, plus one vector index per
//! collection behind its own lock. Writers take the state lock first and the
//! index lock second; readers never hold both.

pub mod graph;
pub mod objects;
pub mod persistence;
pub mod query;
pub mod supersession;

pub use graph::{Direction, ReverseIndex, TraversalHit, TraversalOptions};
pub use objects::{BatchInsertResult, BatchItemError, LifecycleUpdate, ReindexReport};
pub use persistence::{PersistenceError, SnapshotManifest, SNAPSHOT_VERSION};
pub use query::{QueryHit, QueryRequest, QueryResult};

use crate::core::config::StoreConfig;
use crate::core::schema::{CollectionDef, SchemaRegistry};
use crate::core::types::{KnowledgeObject, ObjectId, Status};
use crate::error::{NotFound, Result, StoreError};
use crate::hnsw::core::HNSWIndex;
use crate::hnsw::operations::GraphStats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) objects: HashMap<ObjectId, KnowledgeObject>,
    /// Identifiers per collection, in insertion order
    pub(crate) by_collection: HashMap<String, Vec<ObjectId>>,
    pub(crate) reverse: ReverseIndex,
}

impl StoreState {
    pub(crate) fn get(&self, id: &ObjectId) -> Result<&KnowledgeObject> {
        self.objects
            .get(id)
            .ok_or_else(|| StoreError::object_not_found(*id))
    }

    pub(crate) fn get_mut(&mut self, id: &ObjectId) -> Result<&mut KnowledgeObject> {
        self.objects
            .get_mut(id)
            .ok_or_else(|| StoreError::object_not_found(*id))
    }

    pub(crate) fn collection_ids(&self, collection: &str) -> &[ObjectId] {
        self.by_collection
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Objects of a collection in insertion order.
    pub(crate) fn collection_objects<'a>(
        &'a self,
        collection: &str,
    ) -> impl Iterator<Item = &'a KnowledgeObject> + 'a {
        self.collection_ids(collection)
            .iter()
            .filter_map(move |id| self.objects.get(id))
    }

    /// Make a fully validated object visible. Callers hold the write lock.
    pub(crate) fn commit(&mut self, object: KnowledgeObject) {
        self.reverse.add_object(&object);
        self.by_collection
            .entry(object.collection.clone())
            .or_default()
            .push(object.id);
        self.objects.insert(object.id, object);
    }

    pub(crate) fn remove(&mut self, id: &ObjectId) -> Option<KnowledgeObject> {
        let object = self.objects.remove(id)?;
        self.reverse.remove_object(&object);
        if let Some(ids) = self.by_collection.get_mut(&object.collection) {
            ids.retain(|other| other != id);
        }
        Some(object)
    }
}

/// Per-collection object counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub active: usize,
    pub superseded: usize,
    pub archived: usize,
    /// Live nodes in the collection's vector index
    pub indexed: usize,
}

impl CollectionStats {
    pub fn total(&self) -> usize {
        self.active + self.superseded + self.archived
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub collections: BTreeMap<String, CollectionStats>,
    pub total_objects: usize,
    pub reference_edges: usize,
}

pub(crate) struct StoreInner {
    pub(crate) config: StoreConfig,
    pub(crate) schema: Arc<SchemaRegistry>,
    pub(crate) state: RwLock<StoreState>,
    pub(crate) indexes: HashMap<String, RwLock<HNSWIndex>>,
}

/// Cheaply cloneable handle to one knowledge store.
#[derive(Clone)]
pub struct KnowledgeStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl KnowledgeStore {
    pub fn new(config: StoreConfig, schema: SchemaRegistry) -> Result<Self> {
        config.validate()?;

        let indexes = schema
            .collections()
            .iter()
            .map(|def| {
                (
                    def.name.clone(),
                    RwLock::new(HNSWIndex::new(config.hnsw.clone(), config.dimension)),
                )
            })
            .collect();

        info!(
            "Opened knowledge store: {} collections, dimension {}",
            schema.len(),
            config.dimension
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                schema: Arc::new(schema),
                state: RwLock::new(StoreState::default()),
                indexes,
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.inner.schema
    }

    pub fn dimension(&self) -> usize {
        self.inner.config.dimension
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionDef> {
        self.inner.schema.get_collection(name)
    }

    pub(crate) fn index(&self, collection: &str) -> Result<&RwLock<HNSWIndex>> {
        self.inner
            .indexes
            .get(collection)
            .ok_or_else(|| StoreError::NotFound(NotFound::Collection(collection.to_string())))
    }

    pub(crate) fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.inner.config.dimension {
            return Err(StoreError::Dimension {
                expected: self.inner.config.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        {
            let state = self.inner.state.read().await;
            for def in self.inner.schema.collections() {
                let entry = stats.collections.entry(def.name.clone()).or_default();
                for object in state.collection_objects(&def.name) {
                    match object.status {
                        Status::Active => entry.active += 1,
                        Status::Superseded => entry.superseded += 1,
                        Status::Archived => entry.archived += 1,
                    }
                }
            }
            stats.total_objects = state.objects.len();
            stats.reference_edges = state.reverse.edge_count();
        }

        for (name, entry) in stats.collections.iter_mut() {
            if let Some(index) = self.inner.indexes.get(name) {
                entry.indexed = index.read().await.len();
            }
        }
        stats
    }

    /// Shape of a collection's vector index graph.
    pub async fn index_stats(&self, collection: &str) -> Result<GraphStats> {
        Ok(self.index(collection)?.read().await.get_graph_stats())
    }

    /// Number of objects in a collection; active ones only unless
    /// `include_history` is set.
    pub async fn count(&self, collection: &str, include_history: bool) -> Result<usize> {
        self.collection(collection)?;
        let state = self.inner.state.read().await;
        Ok(state
            .collection_objects(collection)
            .filter(|o| include_history || o.is_active())
            .count())
    }
}
