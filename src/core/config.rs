// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::error::StoreError;
use crate::hnsw::core::HNSWConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// What `delete` does with objects that still reference the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Fail with `ReferenceConflict`
    Reject,
    /// Drop the target from every referring slot, then delete
    CascadeNull,
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(DeletePolicy::Reject),
            "cascade_null" | "cascade-null" | "cascade" => Ok(DeletePolicy::CascadeNull),
            other => Err(format!("unknown delete policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Vector dimension shared by every collection
    pub dimension: usize,
    pub delete_policy: DeletePolicy,
    pub max_traversal_hops: usize,
    pub max_traversal_results: usize,
    /// `k` used by vector queries that do not set one
    pub default_k: usize,
    pub hnsw: HNSWConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            delete_policy: DeletePolicy::Reject,
            max_traversal_hops: 3,
            max_traversal_results: 1000,
            default_k: 10,
            hnsw: HNSWConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Load configuration from `KNOWLEDGE_STORE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let hnsw_defaults = HNSWConfig::default();

        Self {
            dimension: env_or("KNOWLEDGE_STORE_DIMENSION", defaults.dimension),
            delete_policy: env_or("KNOWLEDGE_STORE_DELETE_POLICY", defaults.delete_policy),
            max_traversal_hops: env_or("KNOWLEDGE_STORE_MAX_HOPS", defaults.max_traversal_hops),
            max_traversal_results: env_or(
                "KNOWLEDGE_STORE_MAX_TRAVERSAL_RESULTS",
                defaults.max_traversal_results,
            ),
            default_k: env_or("KNOWLEDGE_STORE_DEFAULT_K", defaults.default_k),
            hnsw: HNSWConfig {
                max_connections: env_or(
                    "KNOWLEDGE_STORE_HNSW_M",
                    hnsw_defaults.max_connections,
                ),
                max_connections_layer_0: env_or(
                    "KNOWLEDGE_STORE_HNSW_M0",
                    hnsw_defaults.max_connections_layer_0,
                ),
                ef_construction: env_or(
                    "KNOWLEDGE_STORE_HNSW_EF_CONSTRUCTION",
                    hnsw_defaults.ef_construction,
                ),
                ef_search: env_or("KNOWLEDGE_STORE_HNSW_EF_SEARCH", hnsw_defaults.ef_search),
                exact_search_threshold: env_or(
                    "KNOWLEDGE_STORE_EXACT_SEARCH_THRESHOLD",
                    hnsw_defaults.exact_search_threshold,
                ),
                vacuum_ratio: env_or("KNOWLEDGE_STORE_VACUUM_RATIO", hnsw_defaults.vacuum_ratio),
                seed: env::var("KNOWLEDGE_STORE_HNSW_SEED")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.dimension == 0 {
            return Err(StoreError::Config("dimension must be positive".to_string()));
        }
        if self.default_k == 0 {
            return Err(StoreError::Config("default_k must be positive".to_string()));
        }
        if self.max_traversal_hops == 0 {
            return Err(StoreError::Config(
                "max_traversal_hops must be positive".to_string(),
            ));
        }
        if !self.hnsw.is_valid() {
            return Err(StoreError::Config(format!(
                "invalid HNSW configuration: {:?}",
                self.hnsw
            )));
        }
        Ok(())
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
