// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod core;
pub mod error;
pub mod hnsw;
pub mod ingest;
pub mod storage;
pub mod store;

pub use crate::core::{
    CollectionDef, DeletePolicy, KnowledgeObject, NewObject, ObjectId, Predicate, PropertyDef,
    PropertyValue, ReferenceSlot, SchemaRegistry, Status, StoreConfig,
};
pub use error::{FieldViolation, NotFound, Result, StoreError};
pub use ingest::{Embedder, IngestError, Ingestor, TaskHint};
pub use storage::{BlobStorage, FileStorage, MemoryStorage};
pub use store::{
    CollectionStats, Direction, KnowledgeStore, QueryHit, QueryRequest, QueryResult, StoreStats,
    TraversalHit, TraversalOptions,
};
