// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use knowledge_store::core::config::{DeletePolicy, StoreConfig};
use knowledge_store::StoreError;
use std::env;

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.dimension, 768);
        assert_eq!(config.delete_policy, DeletePolicy::Reject);
        assert_eq!(config.max_traversal_hops, 3);
        assert_eq!(config.default_k, 10);
        assert_eq!(config.hnsw.max_connections, 16);
        assert_eq!(config.hnsw.max_connections_layer_0, 32);
        assert!(config.hnsw.seed.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = StoreConfig::with_dimension(0);
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));

        config.dimension = 8;
        config.default_k = 0;
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));

        config.default_k = 5;
        config.max_traversal_hops = 0;
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));

        config.max_traversal_hops = 2;
        config.hnsw.max_connections = 0;
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_delete_policy_parsing() {
        assert_eq!("reject".parse::<DeletePolicy>().unwrap(), DeletePolicy::Reject);
        assert_eq!(
            "Cascade-Null".parse::<DeletePolicy>().unwrap(),
            DeletePolicy::CascadeNull
        );
        assert!("drop".parse::<DeletePolicy>().is_err());
    }

    #[test]
    fn test_from_env() {
        // Only test that touches the process environment
        env::set_var("KNOWLEDGE_STORE_DIMENSION", "384");
        env::set_var("KNOWLEDGE_STORE_DELETE_POLICY", "cascade_null");
        env::set_var("KNOWLEDGE_STORE_HNSW_SEED", "7");
        env::set_var("KNOWLEDGE_STORE_DEFAULT_K", "not-a-number");

        let config = StoreConfig::from_env();

        env::remove_var("KNOWLEDGE_STORE_DIMENSION");
        env::remove_var("KNOWLEDGE_STORE_DELETE_POLICY");
        env::remove_var("KNOWLEDGE_STORE_HNSW_SEED");
        env::remove_var("KNOWLEDGE_STORE_DEFAULT_K");

        assert_eq!(config.dimension, 384);
        assert_eq!(config.delete_policy, DeletePolicy::CascadeNull);
        assert_eq!(config.hnsw.seed, Some(7));
        assert_eq!(config.default_k, 10);
    }
}
