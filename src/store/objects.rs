// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::config::DeletePolicy;
use crate::core::schema::{Cardinality, CollectionDef};
use crate::core::types::{KnowledgeObject, NewObject, ObjectId, ReferenceTarget, Status};
use crate::error::{FieldViolation, Result, StoreError};
use crate::hnsw::core::{HNSWError, HNSWIndex};
use crate::store::{KnowledgeStore, StoreState};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A lifecycle-only mutation. Content properties are never updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleUpdate {
    Supersede { successor: ObjectId },
    Archive,
}

impl LifecycleUpdate {
    /// Parse `{"status": ..., "superseded_by": ...}`. Any other key is a
    /// violation.
    pub fn from_json(collection: &str, value: &Value) -> Result<Self> {
        let invalid = |violations: Vec<FieldViolation>| StoreError::Validation {
            collection: collection.to_string(),
            violations,
        };

        let obj = value.as_object().ok_or_else(|| {
            invalid(vec![FieldViolation::new("update", "expected a JSON object")])
        })?;

        let mut violations: Vec<FieldViolation> = obj
            .keys()
            .filter(|k| k.as_str() != "status" && k.as_str() != "superseded_by")
            .map(|k| FieldViolation::new(k, "content properties cannot be updated; supersede instead"))
            .collect();

        let status = match obj.get("status").and_then(Value::as_str) {
            Some(s) => match s.parse::<Status>() {
                Ok(status) => Some(status),
                Err(e) => {
                    violations.push(FieldViolation::new("status", e));
                    None
                }
            },
            None => {
                violations.push(FieldViolation::new("status", "missing or not a string"));
                None
            }
        };

        let successor = match obj.get("superseded_by") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match s.parse::<ObjectId>() {
                Ok(id) => Some(id),
                Err(_) => {
                    violations.push(FieldViolation::new("superseded_by", "not a valid identifier"));
                    None
                }
            },
            Some(_) => {
                violations.push(FieldViolation::new("superseded_by", "expected a string"));
                None
            }
        };

        if !violations.is_empty() {
            return Err(invalid(violations));
        }

        match (status, successor) {
            (Some(Status::Superseded), Some(successor)) => Ok(LifecycleUpdate::Supersede { successor }),
            (Some(Status::Superseded), None) => Err(invalid(vec![FieldViolation::new(
                "superseded_by",
                "required when status is superseded",
            )])),
            (Some(Status::Archived), None) => Ok(LifecycleUpdate::Archive),
            (Some(Status::Archived), Some(_)) => Err(invalid(vec![FieldViolation::new(
                "superseded_by",
                "only allowed when status is superseded",
            )])),
            _ => Err(invalid(vec![FieldViolation::new(
                "status",
                "objects cannot be returned to active",
            )])),
        }
    }
}

/// Failure of one item in a bulk insert
#[derive(Debug)]
pub struct BatchItemError {
    /// Position in the submitted batch
    pub index: usize,
    pub error: StoreError,
}

#[derive(Debug, Default)]
pub struct BatchInsertResult {
    /// `(batch position, assigned identifier)` for every committed item
    pub inserted: Vec<(usize, ObjectId)>,
    pub failed: Vec<BatchItemError>,
    /// Items never attempted because the batch was cancelled
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchInsertResult {
    pub fn ids(&self) -> Vec<ObjectId> {
        self.inserted.iter().map(|(_, id)| *id).collect()
    }

    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    pub collection: String,
    /// Vectors inserted into the rebuilt graph
    pub indexed: usize,
    /// Writes that landed during the build and were applied at swap time
    pub reconciled: usize,
    /// Set when the build was interrupted; the old index stays in place
    pub cancelled: bool,
}

impl KnowledgeStore {
    /// Validate and insert one object, returning its fresh identifier.
    pub async fn insert(&self, new: NewObject) -> Result<ObjectId> {
        let def = self.collection(&new.collection)?;
        self.validate_content(def, &new)?;

        let mut state = self.inner.state.write().await;
        let object = self.stage(&state, def, new)?;
        let id = object.id;
        self.commit(&mut state, object).await?;

        debug!("Inserted {} into {}", id, def.name);
        Ok(id)
    }

    pub async fn get(&self, id: ObjectId) -> Result<KnowledgeObject> {
        let state = self.inner.state.read().await;
        state.get(&id).cloned()
    }

    /// Fetch several objects; missing identifiers are skipped.
    pub async fn get_many(&self, ids: &[ObjectId]) -> Vec<KnowledgeObject> {
        let state = self.inner.state.read().await;
        ids.iter()
            .filter_map(|id| state.objects.get(id).cloned())
            .collect()
    }

    /// Physically remove an object.
    ///
    /// Referrers are objects whose slots target `id` or whose
    /// `superseded_by` points at it. They block the delete under
    /// `DeletePolicy::Reject` and are detached under `CascadeNull`.
    pub async fn delete(&self, id: ObjectId) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let collection = state.get(&id)?.collection.clone();

        let referrers = state.reverse.referrers(&id);
        if !referrers.is_empty() {
            match self.inner.config.delete_policy {
                DeletePolicy::Reject => {
                    return Err(StoreError::ReferenceConflict { id, referrers });
                }
                DeletePolicy::CascadeNull => detach_referrers(&mut state, &id, &referrers),
            }
        }

        state.remove(&id);
        match self.index(&collection)?.write().await.remove(&id) {
            Ok(()) | Err(HNSWError::VectorNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!("Deleted {} from {} ({} referrers detached)", id, collection, referrers.len());
        Ok(())
    }

    /// Apply a lifecycle transition.
    pub async fn update(&self, id: ObjectId, update: LifecycleUpdate) -> Result<()> {
        match update {
            LifecycleUpdate::Supersede { successor } => self.supersede(id, successor).await,
            LifecycleUpdate::Archive => self.archive(id).await,
        }
    }

    /// Parse a JSON lifecycle update against the object's collection and apply it.
    pub async fn update_json(&self, id: ObjectId, value: &Value) -> Result<()> {
        let collection = self.get(id).await?.collection;
        let update = LifecycleUpdate::from_json(&collection, value)?;
        self.update(id, update).await
    }

    /// Insert items one at a time, stopping between items once `cancel` fires.
    ///
    /// Committed items stay committed; nothing is rolled back.
    pub async fn insert_batch(
        &self,
        items: Vec<NewObject>,
        cancel: &CancellationToken,
    ) -> BatchInsertResult {
        let total = items.len();
        let mut result = BatchInsertResult::default();

        for (index, item) in items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                result.skipped = total - index;
                break;
            }
            match self.insert(item).await {
                Ok(id) => result.inserted.push((index, id)),
                Err(error) => result.failed.push(BatchItemError { index, error }),
            }
        }

        if result.cancelled {
            warn!(
                "Batch insert cancelled: {} inserted, {} failed, {} skipped",
                result.inserted.len(),
                result.failed.len(),
                result.skipped
            );
        } else {
            debug!(
                "Batch insert finished: {} inserted, {} failed",
                result.inserted.len(),
                result.failed.len()
            );
        }
        result
    }

    /// Rebuild one collection's vector index without blocking writers.
    ///
    /// The new graph is built from a snapshot of the collection, then swapped
    /// in after reconciling writes that happened in the meantime.
    pub async fn reindex(
        &self,
        collection: &str,
        cancel: &CancellationToken,
    ) -> Result<ReindexReport> {
        self.collection(collection)?;
        let index_lock = self.index(collection)?;

        let snapshot: Vec<(ObjectId, Vec<f32>)> = {
            let state = self.inner.state.read().await;
            state
                .collection_objects(collection)
                .map(|o| (o.id, o.vector.clone()))
                .collect()
        };

        let mut rebuilt = HNSWIndex::new(self.inner.config.hnsw.clone(), self.dimension());
        let mut indexed = 0;
        for (id, vector) in &snapshot {
            if cancel.is_cancelled() {
                warn!(
                    "Reindex of {} cancelled after {} of {} vectors; keeping the old index",
                    collection,
                    indexed,
                    snapshot.len()
                );
                return Ok(ReindexReport {
                    collection: collection.to_string(),
                    indexed,
                    reconciled: 0,
                    cancelled: true,
                });
            }
            rebuilt.insert(*id, vector)?;
            indexed += 1;
            tokio::task::yield_now().await;
        }

        let state = self.inner.state.read().await;
        let mut index = index_lock.write().await;

        let live: HashSet<ObjectId> = state.collection_ids(collection).iter().copied().collect();
        let mut reconciled = 0;
        for (id, _) in &snapshot {
            if !live.contains(id) {
                rebuilt.remove(id)?;
                reconciled += 1;
            }
        }
        for object in state.collection_objects(collection) {
            if !rebuilt.contains(&object.id) {
                rebuilt.insert(object.id, &object.vector)?;
                reconciled += 1;
            }
        }
        rebuilt.vacuum();
        *index = rebuilt;

        info!(
            "Reindexed {}: {} vectors, {} reconciled",
            collection, indexed, reconciled
        );
        Ok(ReindexReport {
            collection: collection.to_string(),
            indexed,
            reconciled,
            cancelled: false,
        })
    }

    /// Checks that need no store state.
    pub(crate) fn validate_content(&self, def: &CollectionDef, new: &NewObject) -> Result<()> {
        def.validate_properties(&new.properties)?;
        self.check_dimension(&new.vector)?;
        if new.vector.iter().any(|x| !x.is_finite()) {
            return Err(StoreError::Validation {
                collection: def.name.clone(),
                violations: vec![FieldViolation::new("vector", "contains a non-finite component")],
            });
        }
        Ok(())
    }

    /// Resolve references against the current state and build the object.
    /// Nothing is written.
    pub(crate) fn stage(
        &self,
        state: &StoreState,
        def: &CollectionDef,
        new: NewObject,
    ) -> Result<KnowledgeObject> {
        let references = resolve_references(state, def, &new.references)?;
        let now = Utc::now();

        Ok(KnowledgeObject {
            id: ObjectId::new(),
            collection: def.name.clone(),
            properties: new.properties,
            vector: new.vector,
            references,
            status: Status::Active,
            superseded_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Make a staged object visible in the state and its vector index.
    pub(crate) async fn commit(&self, state: &mut StoreState, object: KnowledgeObject) -> Result<()> {
        let id = object.id;
        let mut index = self.index(&object.collection)?.write().await;
        index.insert(id, &object.vector)?;
        state.commit(object);
        Ok(())
    }
}

fn resolve_references(
    state: &StoreState,
    def: &CollectionDef,
    requested: &BTreeMap<String, Vec<ObjectId>>,
) -> Result<BTreeMap<String, Vec<ReferenceTarget>>> {
    let mut resolved = BTreeMap::new();

    for (slot_name, ids) in requested {
        let slot = def.get_slot(slot_name).ok_or_else(|| {
            StoreError::reference(
                slot_name,
                format!("collection '{}' declares no such slot", def.name),
            )
        })?;

        let mut seen = HashSet::new();
        let unique: Vec<ObjectId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            continue;
        }
        if slot.cardinality == Cardinality::Single && unique.len() > 1 {
            return Err(StoreError::reference(
                slot_name,
                format!("single-valued slot given {} targets", unique.len()),
            ));
        }

        let mut targets = Vec::with_capacity(unique.len());
        for id in unique {
            let target = state
                .objects
                .get(&id)
                .ok_or_else(|| StoreError::reference(slot_name, format!("target {} does not exist", id)))?;
            if !slot.accepts(&target.collection) {
                return Err(StoreError::reference(
                    slot_name,
                    format!(
                        "target {} is a {}, expected one of [{}]",
                        id,
                        target.collection,
                        slot.targets.join(", ")
                    ),
                ));
            }
            targets.push(ReferenceTarget {
                id,
                collection: target.collection.clone(),
            });
        }
        resolved.insert(slot_name.clone(), targets);
    }

    Ok(resolved)
}

/// Strip every edge and successor pointer into `id`.
fn detach_referrers(state: &mut StoreState, id: &ObjectId, referrers: &[ObjectId]) {
    let now = Utc::now();
    for (slot, source) in state.reverse.edges_into(id) {
        state.reverse.remove_edge(source, &slot, *id);
        if let Some(object) = state.objects.get_mut(&source) {
            if let Some(targets) = object.references.get_mut(&slot) {
                targets.retain(|t| &t.id != id);
                if targets.is_empty() {
                    object.references.remove(&slot);
                }
            }
            object.updated_at = now;
        }
    }

    for predecessor in state.reverse.predecessors(id) {
        state.reverse.clear_successor(predecessor, *id);
        if let Some(object) = state.objects.get_mut(&predecessor) {
            object.superseded_by = None;
            object.updated_at = now;
        }
    }

    debug!("Detached {} referrers from {}", referrers.len(), id);
}
