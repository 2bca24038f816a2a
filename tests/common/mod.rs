// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

#![allow(dead_code)]

use knowledge_store::core::presets;
use knowledge_store::{KnowledgeStore, NewObject, StoreConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DIM: usize = 4;

/// Small deterministic config for store tests
pub fn test_config() -> StoreConfig {
    let mut config = StoreConfig::with_dimension(DIM);
    config.hnsw.seed = Some(42);
    config
}

pub fn kb_store() -> KnowledgeStore {
    kb_store_with(test_config())
}

pub fn kb_store_with(config: StoreConfig) -> KnowledgeStore {
    let schema = presets::knowledge_base().expect("preset schema is valid");
    KnowledgeStore::new(config, schema).expect("store opens")
}

/// Unit vector along `axis`
pub fn axis(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[axis % DIM] = 1.0;
    v
}

pub fn entity(name: &str, vector: Vec<f32>) -> NewObject {
    NewObject::new("Entity")
        .with_property("name", name)
        .with_vector(vector)
}

pub fn insight(content: &str, vector: Vec<f32>) -> NewObject {
    NewObject::new("Insight")
        .with_property("content", content)
        .with_vector(vector)
}

pub fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}
