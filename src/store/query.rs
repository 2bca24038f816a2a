// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Query planning: filter first, then rank by similarity, then expand
//! references.

use crate::core::filter::Predicate;
use crate::core::types::{KnowledgeObject, ObjectId};
use crate::error::{Result, StoreError};
use crate::store::{KnowledgeStore, StoreState};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub collection: String,
    pub filter: Option<Predicate>,
    pub vector: Option<Vec<f32>>,
    /// Ranked results to return; `default_k` from the config when unset
    pub k: Option<usize>,
    /// Cap on unranked (filter-only) results
    pub limit: Option<usize>,
    /// Reference slots to resolve and attach to each hit
    pub references: Vec<String>,
    /// Include superseded and archived objects
    pub include_history: bool,
}

impl QueryRequest {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn expand(mut self, slot: impl Into<String>) -> Self {
        self.references.push(slot.into());
        self
    }

    pub fn with_history(mut self) -> Self {
        self.include_history = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub object: KnowledgeObject,
    /// Cosine distance to the query vector; `None` for filter-only queries
    pub distance: Option<f32>,
    /// Resolved targets per requested slot, in stored order
    pub references: BTreeMap<String, Vec<KnowledgeObject>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub hits: Vec<QueryHit>,
    /// True when hits are ordered by ascending distance
    pub ranked: bool,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.hits.iter().map(|h| h.object.id).collect()
    }

    pub fn objects(&self) -> impl Iterator<Item = &KnowledgeObject> {
        self.hits.iter().map(|h| &h.object)
    }
}

impl KnowledgeStore {
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResult> {
        let def = self.collection(&request.collection)?;
        let filter = request
            .filter
            .as_ref()
            .map(|f| f.bind(def))
            .transpose()?;
        for slot in &request.references {
            if def.get_slot(slot).is_none() {
                return Err(StoreError::Slot {
                    collection: def.name.clone(),
                    slot: slot.clone(),
                });
            }
        }
        if let Some(vector) = &request.vector {
            self.check_dimension(vector)?;
        }

        let include_history = request.include_history;
        let admits = |object: &KnowledgeObject| {
            (include_history || object.is_active())
                && filter.as_ref().map_or(true, |f| f.matches(object))
        };

        let Some(vector) = &request.vector else {
            // Filter only: insertion order, optional limit
            let state = self.inner.state.read().await;
            let limit = request.limit.unwrap_or(usize::MAX);
            let hits: Vec<QueryHit> = state
                .collection_objects(&def.name)
                .filter(|&o| admits(o))
                .take(limit)
                .map(|o| hit(&state, o, None, &request.references))
                .collect();

            debug!("Filter query on {} matched {} objects", def.name, hits.len());
            return Ok(QueryResult { hits, ranked: false });
        };

        let k = request.k.unwrap_or(self.inner.config.default_k);
        if k == 0 {
            return Ok(QueryResult {
                hits: Vec::new(),
                ranked: true,
            });
        }

        let candidates: Option<HashSet<ObjectId>> = if include_history && filter.is_none() {
            None
        } else {
            let state = self.inner.state.read().await;
            Some(
                state
                    .collection_objects(&def.name)
                    .filter(|&o| admits(o))
                    .map(|o| o.id)
                    .collect(),
            )
        };
        if candidates.as_ref().map_or(false, HashSet::is_empty) {
            return Ok(QueryResult {
                hits: Vec::new(),
                ranked: true,
            });
        }

        let ranked = {
            let index = self.index(&def.name)?.read().await;
            index.search(vector, k, candidates.as_ref())?
        };

        // The index may lag the state; drop hits that no longer qualify
        let state = self.inner.state.read().await;
        let hits: Vec<QueryHit> = ranked
            .into_iter()
            .filter_map(|r| {
                let object = state.objects.get(&r.id)?;
                admits(object).then(|| hit(&state, object, Some(r.distance), &request.references))
            })
            .collect();

        debug!(
            "Vector query on {} returned {} of k={} ({} candidates)",
            def.name,
            hits.len(),
            k,
            candidates.as_ref().map_or_else(|| "all".to_string(), |c| c.len().to_string())
        );
        Ok(QueryResult { hits, ranked: true })
    }
}

fn hit(
    state: &StoreState,
    object: &KnowledgeObject,
    distance: Option<f32>,
    slots: &[String],
) -> QueryHit {
    let references = slots
        .iter()
        .map(|slot| {
            let targets = object
                .reference_ids(slot)
                .iter()
                .filter_map(|id| state.objects.get(id).cloned())
                .collect();
            (slot.clone(), targets)
        })
        .collect();

    QueryHit {
        object: object.clone(),
        distance,
        references,
    }
}
