// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::common::random_vectors;
use knowledge_store::core::types::ObjectId;
use knowledge_store::hnsw::core::{HNSWConfig, HNSWError, HNSWIndex};

fn config() -> HNSWConfig {
    HNSWConfig {
        seed: Some(3),
        vacuum_ratio: 1.0,
        ..HNSWConfig::default()
    }
}

#[test]
fn test_batch_insert_reports_failures() {
    let mut index = HNSWIndex::new(config(), 4);
    let duplicate = ObjectId::new();
    let mut batch: Vec<(ObjectId, Vec<f32>)> = random_vectors(5, 4, 1)
        .into_iter()
        .map(|v| (ObjectId::new(), v))
        .collect();
    batch.push((duplicate, vec![1.0, 0.0, 0.0, 0.0]));
    batch.push((duplicate, vec![0.0, 1.0, 0.0, 0.0]));
    batch.push((ObjectId::new(), vec![1.0]));

    let result = index.batch_insert(batch);
    assert_eq!(result.applied, 6);
    assert_eq!(result.failed(), 2);
    assert_eq!(result.errors[0], (duplicate, HNSWError::DuplicateVector(duplicate)));
    assert_eq!(index.len(), 6);
}

#[test]
fn test_batch_remove_and_vacuum() {
    let mut index = HNSWIndex::new(config(), 4);
    let batch: Vec<(ObjectId, Vec<f32>)> = random_vectors(20, 4, 2)
        .into_iter()
        .map(|v| (ObjectId::new(), v))
        .collect();
    let ids: Vec<ObjectId> = batch.iter().map(|(id, _)| *id).collect();
    index.batch_insert(batch);

    let missing = ObjectId::new();
    let mut doomed = ids[..5].to_vec();
    doomed.push(missing);
    let result = index.batch_remove(&doomed);
    assert_eq!(result.applied, 5);
    assert_eq!(result.failed(), 1);
    assert_eq!(result.errors[0].1, HNSWError::VectorNotFound(missing));

    let stats = index.get_graph_stats();
    assert_eq!(stats.total_nodes, 15);
    assert_eq!(stats.deleted_nodes, 5);

    assert_eq!(index.vacuum(), 5);
    assert_eq!(index.vacuum(), 0);
    assert_eq!(index.node_count(), 15);
    for id in &ids[5..] {
        let node = index.get_node(id).unwrap();
        for layer in 0..=node.level() {
            assert!(node.neighbors(layer).iter().all(|n| !ids[..5].contains(n)));
        }
    }
    assert!(index.entry_point().map_or(false, |ep| index.contains(&ep)));
}

#[test]
fn test_graph_stats_on_connected_index() {
    let mut index = HNSWIndex::new(config(), 8);
    let batch: Vec<(ObjectId, Vec<f32>)> = random_vectors(100, 8, 4)
        .into_iter()
        .map(|v| (ObjectId::new(), v))
        .collect();
    index.batch_insert(batch);

    let stats = index.get_graph_stats();
    assert_eq!(stats.total_nodes, 100);
    assert_eq!(stats.deleted_nodes, 0);
    assert_eq!(stats.connected_components, 1);
    assert!(stats.total_edges > 0);
    assert!(stats.avg_degree > 1.0);
    assert_eq!(stats.max_layer, index.get_max_level());
}

#[test]
fn test_graph_stats_on_empty_index() {
    let index = HNSWIndex::new(config(), 8);
    let stats = index.get_graph_stats();
    assert_eq!(stats.total_nodes, 0);
    assert_eq!(stats.connected_components, 0);
    assert_eq!(stats.avg_degree, 0.0);
}
