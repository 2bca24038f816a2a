// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::config::StoreConfig;
use crate::core::schema::{CollectionDef, SchemaRegistry};
use crate::core::types::KnowledgeObject;
use crate::error::{Result, StoreError};
use crate::storage::BlobStorage;
use crate::store::KnowledgeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const SNAPSHOT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.cbor";
const OBJECTS_FILE: &str = "objects.cbor.zst";
const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Incompatible version: found {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },

    #[error("Data integrity error: {0}")]
    IntegrityError(String),

    #[error("Snapshot not found at {0}")]
    Missing(String),
}

impl From<crate::storage::StorageError> for PersistenceError {
    fn from(e: crate::storage::StorageError) -> Self {
        PersistenceError::StorageError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: u32,
    pub dimension: usize,
    pub object_count: usize,
    pub collections: Vec<String>,
    /// blake3 of the compressed objects blob, hex encoded
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Schema and objects, each collection's objects in insertion order.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotBody {
    collections: Vec<CollectionDef>,
    objects: Vec<KnowledgeObject>,
}

fn blob_key(path: &str, file: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", path, file)
    }
}

impl KnowledgeStore {
    /// Write the schema and every object under `path`.
    pub async fn save<S: BlobStorage + ?Sized>(&self, storage: &S, path: &str) -> Result<SnapshotManifest> {
        let body = {
            let state = self.inner.state.read().await;
            let objects: Vec<KnowledgeObject> = self
                .schema()
                .collections()
                .iter()
                .flat_map(|def| state.collection_objects(&def.name).cloned())
                .collect();
            SnapshotBody {
                collections: self.schema().collections().to_vec(),
                objects,
            }
        };

        let encoded = serde_cbor::to_vec(&body)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;
        let compressed = zstd::encode_all(encoded.as_slice(), COMPRESSION_LEVEL)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        let manifest = SnapshotManifest {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension(),
            object_count: body.objects.len(),
            collections: body.collections.iter().map(|c| c.name.clone()).collect(),
            checksum: hex::encode(blake3::hash(&compressed).as_bytes()),
            created_at: Utc::now(),
        };
        let manifest_bytes = serde_cbor::to_vec(&manifest)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?;

        // Objects first so a manifest never points at a missing blob
        storage
            .put(&blob_key(path, OBJECTS_FILE), compressed)
            .await
            .map_err(PersistenceError::from)?;
        storage
            .put(&blob_key(path, MANIFEST_FILE), manifest_bytes)
            .await
            .map_err(PersistenceError::from)?;

        info!(
            "Saved snapshot to {}: {} objects across {} collections",
            path,
            manifest.object_count,
            manifest.collections.len()
        );
        Ok(manifest)
    }

    /// Rebuild a store from a snapshot written by [`KnowledgeStore::save`].
    ///
    /// The schema comes from the snapshot; `config` supplies everything else
    /// and must agree on the vector dimension.
    pub async fn load<S: BlobStorage + ?Sized>(
        storage: &S,
        path: &str,
        config: StoreConfig,
    ) -> Result<Self> {
        let manifest = read_manifest(storage, path).await?;
        if manifest.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::IncompatibleVersion {
                found: manifest.version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        if manifest.dimension != config.dimension {
            return Err(StoreError::Dimension {
                expected: config.dimension,
                actual: manifest.dimension,
            });
        }

        let objects_key = blob_key(path, OBJECTS_FILE);
        let compressed = storage
            .get(&objects_key)
            .await
            .map_err(PersistenceError::from)?
            .ok_or_else(|| PersistenceError::Missing(objects_key.clone()))?;

        let checksum = hex::encode(blake3::hash(&compressed).as_bytes());
        if checksum != manifest.checksum {
            warn!("Checksum mismatch for snapshot at {}", path);
            return Err(PersistenceError::IntegrityError(format!(
                "checksum mismatch: manifest {}, blob {}",
                manifest.checksum, checksum
            ))
            .into());
        }

        let encoded = zstd::decode_all(compressed.as_slice())
            .map_err(|e| PersistenceError::DeserializationError(e.to_string()))?;
        let body: SnapshotBody = serde_cbor::from_slice(&encoded)
            .map_err(|e| PersistenceError::DeserializationError(e.to_string()))?;

        if body.objects.len() != manifest.object_count {
            return Err(PersistenceError::IntegrityError(format!(
                "manifest lists {} objects, blob holds {}",
                manifest.object_count,
                body.objects.len()
            ))
            .into());
        }

        let mut schema = SchemaRegistry::new();
        for def in body.collections {
            schema.define_collection(def)?;
        }

        let store = KnowledgeStore::new(config, schema)?;
        {
            let mut state = store.inner.state.write().await;
            for object in body.objects {
                store.collection(&object.collection)?;
                store.check_dimension(&object.vector)?;
                store.commit(&mut state, object).await?;
            }
        }

        info!(
            "Loaded snapshot from {}: {} objects",
            path, manifest.object_count
        );
        Ok(store)
    }
}

pub async fn read_manifest<S: BlobStorage + ?Sized>(
    storage: &S,
    path: &str,
) -> std::result::Result<SnapshotManifest, PersistenceError> {
    let key = blob_key(path, MANIFEST_FILE);
    let bytes = storage
        .get(&key)
        .await?
        .ok_or_else(|| PersistenceError::Missing(key.clone()))?;
    serde_cbor::from_slice(&bytes).map_err(|e| PersistenceError::DeserializationError(e.to_string()))
}
