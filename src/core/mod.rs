// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod filter;
pub mod presets;
pub mod schema;
pub mod types;
pub mod vector_ops;

pub use config::{DeletePolicy, StoreConfig};
pub use filter::{evaluate, evaluate_in, FilterError, Predicate};
pub use schema::{
    Cardinality, CollectionDef, PropertyDef, PropertyKind, ReferenceSlot, SchemaError,
    SchemaRegistry,
};
pub use types::{
    KnowledgeObject, NewObject, ObjectId, Properties, PropertyValue, ReferenceTarget,
    SearchResult, Status, LIFECYCLE_FIELDS,
};
