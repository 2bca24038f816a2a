// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::types::{ObjectId, SearchResult};

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mag = magnitude(v);
    if mag == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / mag).collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (mag_a * mag_b)
}

/// `1 - cosine similarity`, clamped to `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Cosine distance for vectors that are already unit length (or zero).
pub fn normalized_distance(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - dot_product(a, b)).clamp(0.0, 2.0)
}

/// Exact ranking of `(id, vector)` pairs against a normalized query.
pub fn brute_force_rank<'a, I>(query: &[f32], vectors: I, k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (ObjectId, &'a [f32])>,
{
    let mut results: Vec<SearchResult> = vectors
        .into_iter()
        .map(|(id, v)| SearchResult::new(id, normalized_distance(query, v)))
        .collect();
    results.sort();
    results.truncate(k);
    results
}
