// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::filter::FilterError;
use crate::core::schema::SchemaError;
use crate::core::types::{ObjectId, Status};
use crate::hnsw::core::HNSWError;
use crate::store::persistence::PersistenceError;
use std::fmt;
use thiserror::Error;

/// One offending field of a rejected write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    Object(ObjectId),
    Collection(String),
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::Object(id) => write!(f, "object {}", id),
            NotFound::Collection(name) => write!(f, "collection '{}'", name),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Validation failed for collection '{collection}': {}", join(.violations))]
    Validation {
        collection: String,
        violations: Vec<FieldViolation>,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("Invalid reference in slot '{slot}': {reason}")]
    Reference { slot: String, reason: String },

    #[error("Cannot delete {id}: still referenced by {}", join(.referrers))]
    ReferenceConflict {
        id: ObjectId,
        referrers: Vec<ObjectId>,
    },

    #[error("Not found: {0}")]
    NotFound(NotFound),

    #[error("Collection '{collection}' has no reference slot '{slot}'")]
    Slot { collection: String, slot: String },

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Illegal transition for {id} ({status}): {reason}")]
    State {
        id: ObjectId,
        status: Status,
        reason: String,
    },

    #[error("Cannot supersede {old} ({old_collection}) with {new} ({new_collection})")]
    CollectionMismatch {
        old: ObjectId,
        old_collection: String,
        new: ObjectId,
        new_collection: String,
    },

    #[error("Vector index error: {0}")]
    Index(#[from] HNSWError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn object_not_found(id: ObjectId) -> Self {
        StoreError::NotFound(NotFound::Object(id))
    }

    pub(crate) fn reference(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Reference {
            slot: slot.into(),
            reason: reason.into(),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, StoreError>;
