// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{ObjectId, SearchResult};
use crate::core::vector_ops::{brute_force_rank, normalize, normalized_distance};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HNSWError {
    #[error("Vector with ID {0} already exists")]
    DuplicateVector(ObjectId),

    #[error("Vector not found: {0}")]
    VectorNotFound(ObjectId),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HNSWConfig {
    pub max_connections: usize,
    pub max_connections_layer_0: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    /// Populations at or below this size are ranked by brute force
    pub exact_search_threshold: usize,
    /// Tombstone fraction that triggers a vacuum
    pub vacuum_ratio: f32,
    pub seed: Option<u64>,
}

impl Default for HNSWConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            max_connections_layer_0: 32,
            ef_construction: 200,
            ef_search: 50,
            exact_search_threshold: 512,
            vacuum_ratio: 0.25,
            seed: None,
        }
    }
}

impl HNSWConfig {
    pub fn is_valid(&self) -> bool {
        self.max_connections > 0
            && self.max_connections_layer_0 >= self.max_connections
            && self.ef_construction > 0
            && self.ef_search > 0
            && self.vacuum_ratio > 0.0
            && self.vacuum_ratio <= 1.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HNSWNode {
    id: ObjectId,
    /// Unit-length copy of the inserted vector
    vector: Vec<f32>,
    level: usize,
    neighbors: Vec<HashSet<ObjectId>>, // neighbors[i] = neighbors at layer i
    is_deleted: bool,
}

impl HNSWNode {
    pub fn new(id: ObjectId, vector: Vec<f32>, level: usize) -> Self {
        Self {
            id,
            vector,
            level,
            neighbors: vec![HashSet::new(); level + 1],
            is_deleted: false,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn neighbors(&self, layer: usize) -> &HashSet<ObjectId> {
        &self.neighbors[layer]
    }

    pub fn neighbors_mut(&mut self, layer: usize) -> &mut HashSet<ObjectId> {
        &mut self.neighbors[layer]
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }
}

#[derive(Clone, Copy, PartialEq)]
struct SearchCandidate {
    id: ObjectId,
    distance: f32,
}

impl Eq for SearchCandidate {}

impl PartialOrd for SearchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Approximate nearest-neighbor index over cosine distance.
///
/// Not internally synchronized; the store wraps each index in a lock.
pub struct HNSWIndex {
    config: HNSWConfig,
    dimension: usize,
    nodes: HashMap<ObjectId, HNSWNode>,
    entry_point: Option<ObjectId>,
    rng: StdRng,
    deleted: usize,
}

impl HNSWIndex {
    pub fn new(config: HNSWConfig, dimension: usize) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            dimension,
            nodes: HashMap::new(),
            entry_point: None,
            rng,
            deleted: 0,
        }
    }

    pub fn config(&self) -> &HNSWConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Nodes held, including tombstones.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes visible to search.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted
    }

    pub fn entry_point(&self) -> Option<ObjectId> {
        self.entry_point
    }

    pub fn get_node(&self, id: &ObjectId) -> Option<&HNSWNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.nodes.get(id).map_or(false, |n| !n.is_deleted())
    }

    pub(crate) fn nodes(&self) -> &HashMap<ObjectId, HNSWNode> {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut HashMap<ObjectId, HNSWNode> {
        &mut self.nodes
    }

    pub(crate) fn set_deleted_count(&mut self, deleted: usize) {
        self.deleted = deleted;
    }

    pub(crate) fn set_entry_point(&mut self, id: Option<ObjectId>) {
        self.entry_point = id;
    }

    pub fn assign_level(&mut self) -> usize {
        // Geometric level distribution with p = 1 / ln(M)
        let m = self.config.max_connections.max(2) as f64;
        let ml = 1.0 / m.ln();
        let r: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-r.ln() * ml).floor() as usize
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.max_connections_layer_0
        } else {
            self.config.max_connections
        }
    }

    pub fn insert(&mut self, id: ObjectId, vector: &[f32]) -> Result<(), HNSWError> {
        if vector.len() != self.dimension {
            return Err(HNSWError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        match self.nodes.get(&id) {
            Some(node) if node.is_deleted() => self.purge(&id),
            Some(_) => return Err(HNSWError::DuplicateVector(id)),
            None => {}
        }

        let vector = normalize(vector);
        let level = self.assign_level();
        let mut node = HNSWNode::new(id, vector, level);

        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => {
                self.nodes.insert(id, node);
                self.entry_point = Some(id);
                return Ok(());
            }
        };

        let entry_level = self.nodes.get(&entry_point).map_or(0, |n| n.level());

        // Greedy descent through layers above the new node's level
        let mut current = vec![entry_point];
        for layer in (level + 1..=entry_level).rev() {
            let nearest = self.search_layer(&node.vector, &current, 1, layer);
            if let Some(best) = nearest.first() {
                current = vec![best.id];
            }
        }

        for layer in (0..=level.min(entry_level)).rev() {
            let candidates =
                self.search_layer(&node.vector, &current, self.config.ef_construction, layer);
            let m = self.max_connections(layer);
            for candidate in candidates.iter().take(m) {
                node.neighbors_mut(layer).insert(candidate.id);
            }
            if !candidates.is_empty() {
                current = candidates.iter().map(|c| c.id).collect();
            }
        }

        let links: Vec<(usize, Vec<ObjectId>)> = (0..=level)
            .map(|layer| (layer, node.neighbors(layer).iter().copied().collect()))
            .collect();
        self.nodes.insert(id, node);

        // Add backlinks, pruning neighbors that exceed their budget
        for (layer, neighbor_ids) in links {
            let max_conn = self.max_connections(layer);
            for neighbor_id in neighbor_ids {
                let overflow = match self.nodes.get_mut(&neighbor_id) {
                    Some(neighbor) if neighbor.level() >= layer => {
                        neighbor.neighbors_mut(layer).insert(id);
                        neighbor.neighbors(layer).len() > max_conn
                    }
                    _ => false,
                };
                if overflow {
                    self.prune_neighbors(&neighbor_id, layer, max_conn);
                }
            }
        }

        if level > entry_level {
            self.entry_point = Some(id);
        }

        Ok(())
    }

    fn prune_neighbors(&mut self, id: &ObjectId, layer: usize, max_conn: usize) {
        let kept: Vec<ObjectId> = {
            let node = match self.nodes.get(id) {
                Some(node) => node,
                None => return,
            };
            let mut candidates: Vec<SearchCandidate> = node
                .neighbors(layer)
                .iter()
                .filter_map(|n| {
                    self.nodes.get(n).map(|other| SearchCandidate {
                        id: *n,
                        distance: normalized_distance(node.vector(), other.vector()),
                    })
                })
                .collect();
            candidates.sort();
            candidates.truncate(max_conn);
            candidates.into_iter().map(|c| c.id).collect()
        };

        if let Some(node) = self.nodes.get_mut(id) {
            let neighbors = node.neighbors_mut(layer);
            neighbors.clear();
            neighbors.extend(kept);
        }
    }

    /// Tombstone a node. It keeps routing searches until the next vacuum.
    pub fn remove(&mut self, id: &ObjectId) -> Result<(), HNSWError> {
        match self.nodes.get_mut(id) {
            Some(node) if !node.is_deleted() => {
                node.mark_deleted();
                self.deleted += 1;
            }
            _ => return Err(HNSWError::VectorNotFound(*id)),
        }

        if self.needs_vacuum() {
            self.vacuum();
        }
        Ok(())
    }

    pub fn needs_vacuum(&self) -> bool {
        !self.nodes.is_empty()
            && (self.deleted as f32 / self.nodes.len() as f32) >= self.config.vacuum_ratio
    }

    /// Physically drop one node and every edge pointing at it.
    pub(crate) fn purge(&mut self, id: &ObjectId) {
        let node = match self.nodes.remove(id) {
            Some(node) => node,
            None => return,
        };
        if node.is_deleted() {
            self.deleted -= 1;
        }
        for other in self.nodes.values_mut() {
            for layer in 0..=other.level() {
                other.neighbors_mut(layer).remove(id);
            }
        }
        if self.entry_point == Some(*id) {
            self.entry_point = self.highest_node();
        }
    }

    pub(crate) fn highest_node(&self) -> Option<ObjectId> {
        self.nodes
            .values()
            .max_by(|a, b| a.level().cmp(&b.level()).then_with(|| b.id().cmp(a.id())))
            .map(|n| *n.id())
    }

    /// Top-`k` by ascending cosine distance, ties broken by identifier.
    ///
    /// With `candidates`, only those identifiers are ranked. Populations at or
    /// below `exact_search_threshold` are ranked exactly.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        candidates: Option<&HashSet<ObjectId>>,
    ) -> Result<Vec<SearchResult>, HNSWError> {
        if query.len() != self.dimension {
            return Err(HNSWError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalize(query);
        let population = candidates.map_or(self.len(), |c| c.len());

        if population <= self.config.exact_search_threshold {
            return Ok(self.exact_search(&query, k, candidates));
        }

        let ef = match candidates {
            // Widen the beam in proportion to how selective the restriction is
            Some(set) => {
                let selectivity = (self.len() / set.len().max(1)).max(1);
                self.config.ef_search.max(k).saturating_mul(selectivity).min(self.len())
            }
            None => self.config.ef_search.max(k),
        };

        let mut results: Vec<SearchResult> = self
            .layered_search(&query, ef)
            .into_iter()
            .filter(|c| self.is_visible(&c.id, candidates))
            .map(|c| SearchResult::new(c.id, c.distance))
            .collect();

        let wanted = k.min(population);
        if results.len() < wanted {
            return Ok(self.exact_search(&query, k, candidates));
        }

        results.truncate(k);
        Ok(results)
    }

    fn is_visible(&self, id: &ObjectId, candidates: Option<&HashSet<ObjectId>>) -> bool {
        let live = self.nodes.get(id).map_or(false, |n| !n.is_deleted());
        live && candidates.map_or(true, |c| c.contains(id))
    }

    fn exact_search(
        &self,
        query: &[f32],
        k: usize,
        candidates: Option<&HashSet<ObjectId>>,
    ) -> Vec<SearchResult> {
        match candidates {
            Some(set) => brute_force_rank(
                query,
                set.iter()
                    .filter_map(|id| self.nodes.get(id))
                    .filter(|n| !n.is_deleted())
                    .map(|n| (n.id, n.vector.as_slice())),
                k,
            ),
            None => brute_force_rank(
                query,
                self.nodes
                    .values()
                    .filter(|n| !n.is_deleted())
                    .map(|n| (n.id, n.vector.as_slice())),
                k,
            ),
        }
    }

    fn layered_search(&self, query: &[f32], ef: usize) -> Vec<SearchCandidate> {
        let entry_point = match self.entry_point {
            Some(ep) => ep,
            None => return Vec::new(),
        };
        let top_layer = self.nodes.get(&entry_point).map_or(0, |n| n.level());

        let mut current = vec![entry_point];
        for layer in (1..=top_layer).rev() {
            let nearest = self.search_layer(query, &current, 1, layer);
            if let Some(best) = nearest.first() {
                current = vec![best.id];
            }
        }
        self.search_layer(query, &current, ef, 0)
    }

    /// Beam search within one layer. Tombstoned nodes are traversed but still
    /// returned; callers filter them.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[ObjectId],
        ef: usize,
        layer: usize,
    ) -> Vec<SearchCandidate> {
        let mut visited = HashSet::new();
        let mut candidates = BinaryHeap::new();
        let mut nearest: BinaryHeap<SearchCandidate> = BinaryHeap::new();

        for ep in entry_points {
            if let Some(node) = self.nodes.get(ep) {
                if visited.insert(*ep) {
                    let candidate = SearchCandidate {
                        id: *ep,
                        distance: normalized_distance(query, node.vector()),
                    };
                    candidates.push(Reverse(candidate));
                    nearest.push(candidate);
                }
            }
        }
        while nearest.len() > ef {
            nearest.pop();
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = nearest.peek().map_or(f32::INFINITY, |c| c.distance);
            if nearest.len() >= ef && current.distance > worst {
                break;
            }

            let node = match self.nodes.get(&current.id) {
                Some(node) if node.level() >= layer => node,
                _ => continue,
            };

            for neighbor_id in node.neighbors(layer) {
                if !visited.insert(*neighbor_id) {
                    continue;
                }
                let neighbor = match self.nodes.get(neighbor_id) {
                    Some(neighbor) => neighbor,
                    None => continue,
                };

                let distance = normalized_distance(query, neighbor.vector());
                let worst = nearest.peek().map_or(f32::INFINITY, |c| c.distance);
                if nearest.len() < ef || distance < worst {
                    let candidate = SearchCandidate {
                        id: *neighbor_id,
                        distance,
                    };
                    candidates.push(Reverse(candidate));
                    nearest.push(candidate);
                    if nearest.len() > ef {
                        nearest.pop();
                    }
                }
            }
        }

        nearest.into_sorted_vec()
    }

    /// Get the maximum level across all nodes
    pub fn get_max_level(&self) -> usize {
        self.nodes.values().map(|node| node.level()).max().unwrap_or(0)
    }

    /// Get the number of nodes at each level
    pub fn get_level_distribution(&self) -> Vec<usize> {
        let mut distribution = vec![0; self.get_max_level() + 1];
        for node in self.nodes.values() {
            for count in distribution.iter_mut().take(node.level() + 1) {
                *count += 1;
            }
        }
        distribution
    }
}
