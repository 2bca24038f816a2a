// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Reference graph: slot resolution, reverse lookup and bounded traversal

use crate::core::types::{KnowledgeObject, ObjectId};
use crate::error::{Result, StoreError};
use crate::store::{KnowledgeStore, StoreState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Inbound edges, maintained incrementally on every write.
#[derive(Debug, Default, Clone)]
pub struct ReverseIndex {
    /// target -> slot -> sources
    inbound: HashMap<ObjectId, BTreeMap<String, BTreeSet<ObjectId>>>,
    /// successor -> objects it superseded
    predecessors: HashMap<ObjectId, BTreeSet<ObjectId>>,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: &KnowledgeObject) {
        for (slot, targets) in &object.references {
            for target in targets {
                self.add_edge(object.id, slot, target.id);
            }
        }
        if let Some(successor) = object.superseded_by {
            self.set_successor(object.id, successor);
        }
    }

    pub fn remove_object(&mut self, object: &KnowledgeObject) {
        for (slot, targets) in &object.references {
            for target in targets {
                self.remove_edge(object.id, slot, target.id);
            }
        }
        if let Some(successor) = object.superseded_by {
            self.clear_successor(object.id, successor);
        }
    }

    pub fn add_edge(&mut self, source: ObjectId, slot: &str, target: ObjectId) {
        self.inbound
            .entry(target)
            .or_default()
            .entry(slot.to_string())
            .or_default()
            .insert(source);
    }

    pub fn remove_edge(&mut self, source: ObjectId, slot: &str, target: ObjectId) {
        if let Some(slots) = self.inbound.get_mut(&target) {
            if let Some(sources) = slots.get_mut(slot) {
                sources.remove(&source);
                if sources.is_empty() {
                    slots.remove(slot);
                }
            }
            if slots.is_empty() {
                self.inbound.remove(&target);
            }
        }
    }

    pub fn set_successor(&mut self, old: ObjectId, new: ObjectId) {
        self.predecessors.entry(new).or_default().insert(old);
    }

    pub fn clear_successor(&mut self, old: ObjectId, new: ObjectId) {
        if let Some(olds) = self.predecessors.get_mut(&new) {
            olds.remove(&old);
            if olds.is_empty() {
                self.predecessors.remove(&new);
            }
        }
    }

    /// Sources referencing `target`, optionally through one slot only.
    pub fn sources(&self, target: &ObjectId, slot: Option<&str>) -> BTreeSet<ObjectId> {
        let Some(slots) = self.inbound.get(target) else {
            return BTreeSet::new();
        };
        match slot {
            Some(name) => slots.get(name).cloned().unwrap_or_default(),
            None => slots.values().flatten().copied().collect(),
        }
    }

    /// `(slot, source)` pairs pointing at `target`.
    pub fn edges_into(&self, target: &ObjectId) -> Vec<(String, ObjectId)> {
        self.inbound
            .get(target)
            .map(|slots| {
                slots
                    .iter()
                    .flat_map(|(slot, sources)| sources.iter().map(move |s| (slot.clone(), *s)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn predecessors(&self, id: &ObjectId) -> BTreeSet<ObjectId> {
        self.predecessors.get(id).cloned().unwrap_or_default()
    }

    /// Everything that would dangle if `id` were removed.
    pub fn referrers(&self, id: &ObjectId) -> Vec<ObjectId> {
        let mut all = self.sources(id, None);
        all.extend(self.predecessors(id));
        all.remove(id);
        all.into_iter().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.inbound
            .values()
            .flat_map(|slots| slots.values())
            .map(BTreeSet::len)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

/// Bounds and filters for a breadth-first walk.
#[derive(Debug, Clone, Default)]
pub struct TraversalOptions {
    pub direction: Direction,
    /// Only follow these slots; all slots when empty
    pub slots: Vec<String>,
    /// Defaults to `max_traversal_hops` from the store config
    pub max_hops: Option<usize>,
    /// Capped at `max_traversal_results` from the store config
    pub limit: Option<usize>,
    /// Walk through and report superseded or archived objects
    pub include_history: bool,
}

impl TraversalOptions {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = Some(max_hops);
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slots.push(slot.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_history(mut self) -> Self {
        self.include_history = true;
        self
    }

    fn follows(&self, slot: &str) -> bool {
        self.slots.is_empty() || self.slots.iter().any(|s| s == slot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraversalHit {
    pub object: KnowledgeObject,
    /// Hops from the start object
    pub depth: usize,
    /// Slot of the edge this object was first reached through
    pub via_slot: String,
    /// Identifiers from the start object to this one, inclusive
    pub path: Vec<ObjectId>,
}

impl KnowledgeStore {
    /// Targets of one slot, in stored order.
    pub async fn resolve_slot(&self, id: ObjectId, slot: &str) -> Result<Vec<KnowledgeObject>> {
        let state = self.inner.state.read().await;
        let object = state.get(&id)?;
        let def = self.collection(&object.collection)?;
        if def.get_slot(slot).is_none() {
            return Err(StoreError::Slot {
                collection: def.name.clone(),
                slot: slot.to_string(),
            });
        }

        Ok(object
            .reference_ids(slot)
            .iter()
            .filter_map(|target| state.objects.get(target).cloned())
            .collect())
    }

    /// Identifiers of objects referencing `id`, optionally through one slot.
    ///
    /// A named slot must be declared by some collection as able to target
    /// `id`'s collection.
    pub async fn inbound_references(
        &self,
        id: ObjectId,
        via_slot: Option<&str>,
    ) -> Result<BTreeSet<ObjectId>> {
        let state = self.inner.state.read().await;
        let object = state.get(&id)?;

        if let Some(slot) = via_slot {
            let declared = self.schema().collections().iter().any(|def| {
                def.get_slot(slot)
                    .map_or(false, |s| s.accepts(&object.collection))
            });
            if !declared {
                return Err(StoreError::Slot {
                    collection: object.collection.clone(),
                    slot: slot.to_string(),
                });
            }
        }

        Ok(state.reverse.sources(&id, via_slot))
    }

    /// Breadth-first walk from `start`. The start object is not reported.
    pub async fn traverse(
        &self,
        start: ObjectId,
        options: TraversalOptions,
    ) -> Result<Vec<TraversalHit>> {
        let max_hops = options
            .max_hops
            .unwrap_or(self.inner.config.max_traversal_hops);
        let limit = options
            .limit
            .unwrap_or(self.inner.config.max_traversal_results)
            .min(self.inner.config.max_traversal_results);

        let state = self.inner.state.read().await;
        state.get(&start)?;

        let mut visited: HashSet<ObjectId> = HashSet::from([start]);
        let mut queue: VecDeque<(ObjectId, usize, Vec<ObjectId>)> = VecDeque::new();
        let mut hits = Vec::new();
        queue.push_back((start, 0, vec![start]));

        while let Some((current, depth, path)) = queue.pop_front() {
            if hits.len() >= limit {
                break;
            }
            if depth >= max_hops {
                continue;
            }

            for (slot, neighbor) in neighbors(&state, &current, &options) {
                if hits.len() >= limit {
                    break;
                }
                if visited.contains(&neighbor) {
                    continue;
                }
                let Some(object) = state.objects.get(&neighbor) else {
                    continue;
                };
                if !options.include_history && !object.is_active() {
                    continue;
                }
                visited.insert(neighbor);

                let mut next_path = path.clone();
                next_path.push(neighbor);
                hits.push(TraversalHit {
                    object: object.clone(),
                    depth: depth + 1,
                    via_slot: slot,
                    path: next_path.clone(),
                });
                queue.push_back((neighbor, depth + 1, next_path));
            }
        }

        tracing::debug!(%start, hits = hits.len(), max_hops, "traversal finished");
        Ok(hits)
    }
}

fn neighbors(
    state: &StoreState,
    id: &ObjectId,
    options: &TraversalOptions,
) -> Vec<(String, ObjectId)> {
    let mut out = Vec::new();

    if matches!(options.direction, Direction::Outgoing | Direction::Both) {
        if let Some(object) = state.objects.get(id) {
            for (slot, targets) in &object.references {
                if options.follows(slot) {
                    out.extend(targets.iter().map(|t| (slot.clone(), t.id)));
                }
            }
        }
    }

    if matches!(options.direction, Direction::Incoming | Direction::Both) {
        out.extend(
            state
                .reverse
                .edges_into(id)
                .into_iter()
                .filter(|(slot, _)| options.follows(slot)),
        );
    }

    out
}
