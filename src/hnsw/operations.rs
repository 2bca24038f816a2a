use crate::core::types::ObjectId;
use crate::hnsw::core::{HNSWError, HNSWIndex};
use std::collections::{HashSet, VecDeque};

/// Outcome of a batch insert or removal. Failures do not stop the batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub applied: usize,
    pub errors: Vec<(ObjectId, HNSWError)>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    fn record(&mut self, id: ObjectId, outcome: Result<(), HNSWError>) {
        match outcome {
            Ok(()) => self.applied += 1,
            Err(e) => self.errors.push((id, e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub deleted_nodes: usize,
    pub total_edges: usize,
    pub avg_degree: f32,
    pub max_layer: usize,
    pub connected_components: usize,
}

impl HNSWIndex {
    pub fn batch_insert(&mut self, batch: Vec<(ObjectId, Vec<f32>)>) -> BatchReport {
        let mut report = BatchReport::default();
        for (id, vector) in batch {
            let outcome = self.insert(id, &vector);
            report.record(id, outcome);
        }
        report
    }

    pub fn batch_remove(&mut self, ids: &[ObjectId]) -> BatchReport {
        let mut report = BatchReport::default();
        for id in ids {
            let outcome = self.remove(id);
            report.record(*id, outcome);
        }
        report
    }

    /// Drop every tombstoned node and the edges pointing at them.
    /// Returns how many nodes were removed.
    pub fn vacuum(&mut self) -> usize {
        let deleted_ids: HashSet<ObjectId> = self
            .nodes()
            .iter()
            .filter(|(_, node)| node.is_deleted())
            .map(|(id, _)| *id)
            .collect();

        if deleted_ids.is_empty() {
            return 0;
        }

        let nodes = self.nodes_mut();
        nodes.retain(|id, _| !deleted_ids.contains(id));
        for node in nodes.values_mut() {
            for layer in 0..=node.level() {
                node.neighbors_mut(layer)
                    .retain(|neighbor_id| !deleted_ids.contains(neighbor_id));
            }
        }

        self.set_deleted_count(0);
        let entry_lost = self
            .entry_point()
            .map_or(true, |ep| deleted_ids.contains(&ep));
        if entry_lost {
            let replacement = self.highest_node();
            self.set_entry_point(replacement);
        }

        tracing::debug!(removed = deleted_ids.len(), "vacuumed vector index");
        deleted_ids.len()
    }

    pub fn get_graph_stats(&self) -> GraphStats {
        let active: Vec<_> = self
            .nodes()
            .values()
            .filter(|node| !node.is_deleted())
            .collect();
        let total_nodes = active.len();

        if total_nodes == 0 {
            return GraphStats {
                total_nodes: 0,
                deleted_nodes: self.deleted_count(),
                total_edges: 0,
                avg_degree: 0.0,
                max_layer: 0,
                connected_components: 0,
            };
        }

        // Pruning can leave a link stored on one side only, so count each
        // unordered pair per layer once
        let mut directed_edges = 0;
        let mut edges: HashSet<(usize, ObjectId, ObjectId)> = HashSet::new();
        let mut max_layer = 0;
        for node in &active {
            max_layer = max_layer.max(node.level());
            for layer in 0..=node.level() {
                for neighbor in node.neighbors(layer) {
                    let live = self
                        .nodes()
                        .get(neighbor)
                        .map_or(false, |n| !n.is_deleted());
                    if !live {
                        continue;
                    }
                    directed_edges += 1;
                    let id = *node.id();
                    edges.insert((layer, id.min(*neighbor), id.max(*neighbor)));
                }
            }
        }

        GraphStats {
            total_nodes,
            deleted_nodes: self.deleted_count(),
            total_edges: edges.len(),
            avg_degree: directed_edges as f32 / total_nodes as f32,
            max_layer,
            connected_components: self.count_components(),
        }
    }

    /// Connected components of the layer-0 graph over live nodes.
    fn count_components(&self) -> usize {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut components = 0;

        for (id, node) in self.nodes() {
            if node.is_deleted() || seen.contains(id) {
                continue;
            }
            components += 1;
            let mut queue = VecDeque::from([*id]);
            seen.insert(*id);

            while let Some(current) = queue.pop_front() {
                let Some(node) = self.nodes().get(&current) else {
                    continue;
                };
                for neighbor in node.neighbors(0) {
                    let live = self
                        .nodes()
                        .get(neighbor)
                        .map_or(false, |n| !n.is_deleted());
                    if live && seen.insert(*neighbor) {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        components
    }
}
