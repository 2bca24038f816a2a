// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Collection definitions and the schema registry
//!
//! A collection declares typed properties and typed outgoing reference slots.
//! Collections are defined once, in dependency order, and never redefined.

use crate::core::types::{ObjectId, Properties, PropertyValue, LIFECYCLE_FIELDS};
use crate::error::{FieldViolation, NotFound, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::info;

/// Error types for collection definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Collection '{0}' is already defined")]
    DuplicateCollection(String),

    #[error("Slot '{slot}' of collection '{collection}' targets undefined collection '{target}'")]
    UnknownTargetCollection {
        collection: String,
        slot: String,
        target: String,
    },

    #[error("Unrecognized kind '{kind}' for property '{property}' of collection '{collection}'")]
    UnrecognizedKind {
        collection: String,
        property: String,
        kind: String,
    },

    #[error("Collection '{collection}' declares '{name}' more than once")]
    DuplicateMember { collection: String, name: String },

    #[error("Invalid definition for collection '{collection}': {reason}")]
    InvalidDefinition { collection: String, reason: String },
}

/// Property kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    TextArray,
    Date,
    /// Text restricted to a closed set of values
    Enum(Vec<String>),
    Id,
}

impl PropertyKind {
    /// Parse a declarative type name (`text`, `text[]`, `date`, `enum`, `uuid`).
    pub fn parse(name: &str, values: Option<Vec<String>>) -> Option<Self> {
        match name {
            "text" => Some(PropertyKind::Text),
            "text[]" | "text_array" => Some(PropertyKind::TextArray),
            "date" => Some(PropertyKind::Date),
            "enum" => Some(PropertyKind::Enum(values.unwrap_or_default())),
            "uuid" | "id" => Some(PropertyKind::Id),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyKind::Text => "text",
            PropertyKind::TextArray => "text[]",
            PropertyKind::Date => "date",
            PropertyKind::Enum(_) => "enum",
            PropertyKind::Id => "uuid",
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, PropertyKind::Text | PropertyKind::Enum(_))
    }

    /// Check a typed value against this kind, returning the reason on mismatch.
    pub fn check(&self, value: &PropertyValue) -> Result<(), String> {
        match (self, value) {
            (PropertyKind::Text, PropertyValue::Text(_)) => Ok(()),
            (PropertyKind::TextArray, PropertyValue::TextArray(_)) => Ok(()),
            (PropertyKind::Date, PropertyValue::Date(_)) => Ok(()),
            (PropertyKind::Id, PropertyValue::Id(_)) => Ok(()),
            (PropertyKind::Enum(allowed), PropertyValue::Text(s)) => {
                if allowed.iter().any(|a| a == s) {
                    Ok(())
                } else {
                    Err(format!("'{}' is not one of [{}]", s, allowed.join(", ")))
                }
            }
            (kind, value) => Err(format!(
                "expected {}, found {}",
                kind.type_name(),
                value.type_name()
            )),
        }
    }

    /// Coerce a JSON value into a typed value of this kind.
    pub fn coerce_json(&self, value: &Value) -> Result<PropertyValue, String> {
        let typed = match (self, value) {
            (PropertyKind::Text | PropertyKind::Enum(_), Value::String(s)) => {
                PropertyValue::Text(s.clone())
            }
            (PropertyKind::TextArray, Value::Array(items)) => {
                let mut values = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(s) => values.push(s.to_string()),
                        None => {
                            return Err(format!(
                                "element {} expected text, found {}",
                                index,
                                json_type_name(item)
                            ))
                        }
                    }
                }
                PropertyValue::TextArray(values)
            }
            (PropertyKind::Date, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|d| PropertyValue::Date(d.with_timezone(&Utc)))
                .map_err(|e| format!("invalid RFC 3339 date '{}': {}", s, e))?,
            (PropertyKind::Id, Value::String(s)) => s
                .parse::<ObjectId>()
                .map(PropertyValue::Id)
                .map_err(|e| format!("invalid uuid '{}': {}", s, e))?,
            (kind, value) => {
                return Err(format!(
                    "expected {}, found {}",
                    kind.type_name(),
                    json_type_name(value)
                ))
            }
        };
        self.check(&typed)?;
        Ok(typed)
    }
}

/// Property definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    /// May appear as a filter leaf target
    pub filterable: bool,
    /// Contributes to the embedding source text
    pub searchable: bool,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            filterable: false,
            searchable: false,
            required: false,
            description: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text)
    }

    pub fn text_array(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::TextArray)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Date)
    }

    pub fn id(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Id)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            PropertyKind::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    Many,
}

/// Typed outgoing edge definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSlot {
    pub name: String,
    /// Legal target collections; more than one makes the slot polymorphic
    pub targets: Vec<String>,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ReferenceSlot {
    pub fn many<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            cardinality: Cardinality::Many,
            description: None,
        }
    }

    pub fn single<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cardinality: Cardinality::Single,
            ..Self::many(name, targets)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn accepts(&self, collection: &str) -> bool {
        self.targets.iter().any(|t| t == collection)
    }
}

/// A named object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<PropertyDef>,
    pub references: Vec<ReferenceSlot>,
}

impl CollectionDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            properties: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn reference(mut self, slot: ReferenceSlot) -> Self {
        self.references.push(slot);
        self
    }

    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn get_slot(&self, name: &str) -> Option<&ReferenceSlot> {
        self.references.iter().find(|s| s.name == name)
    }

    /// Validate typed properties, collecting every violation.
    pub fn validate_properties(&self, properties: &Properties) -> Result<(), StoreError> {
        let mut violations = Vec::new();

        for (name, value) in properties {
            match self.get_property(name) {
                Some(def) => {
                    if let Err(reason) = def.kind.check(value) {
                        violations.push(FieldViolation::new(name, reason));
                    }
                }
                None => violations.push(FieldViolation::new(name, "unknown property")),
            }
        }

        for def in self.properties.iter().filter(|p| p.required) {
            if !properties.contains_key(&def.name) {
                violations.push(FieldViolation::new(&def.name, "missing required property"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation {
                collection: self.name.clone(),
                violations,
            })
        }
    }

    /// Coerce a JSON object into typed properties.
    ///
    /// Null members are treated as absent.
    pub fn properties_from_json(&self, value: &Value) -> Result<Properties, StoreError> {
        let obj = value.as_object().ok_or_else(|| StoreError::Validation {
            collection: self.name.clone(),
            violations: vec![FieldViolation::new(
                "properties",
                format!("expected object, found {}", json_type_name(value)),
            )],
        })?;

        let mut properties = Properties::new();
        let mut violations = Vec::new();

        for (name, raw) in obj {
            if raw.is_null() {
                continue;
            }
            match self.get_property(name) {
                Some(def) => match def.kind.coerce_json(raw) {
                    Ok(typed) => {
                        properties.insert(name.clone(), typed);
                    }
                    Err(reason) => violations.push(FieldViolation::new(name, reason)),
                },
                None => violations.push(FieldViolation::new(name, "unknown property")),
            }
        }

        if !violations.is_empty() {
            return Err(StoreError::Validation {
                collection: self.name.clone(),
                violations,
            });
        }

        self.validate_properties(&properties)?;
        Ok(properties)
    }

    /// Compose the embedding source text from searchable properties, in
    /// declaration order.
    pub fn searchable_text(&self, properties: &Properties) -> String {
        self.properties
            .iter()
            .filter(|p| p.searchable)
            .filter_map(|p| {
                properties
                    .get(&p.name)
                    .map(|v| format!("{}: {}", p.name, v.to_plain_text()))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn check_members(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::InvalidDefinition {
                collection: self.name.clone(),
                reason: "collection name must not be empty".to_string(),
            });
        }

        let mut seen = HashSet::new();
        let names = self
            .properties
            .iter()
            .map(|p| &p.name)
            .chain(self.references.iter().map(|s| &s.name));
        for name in names {
            if name.trim().is_empty() {
                return Err(SchemaError::InvalidDefinition {
                    collection: self.name.clone(),
                    reason: "member names must not be empty".to_string(),
                });
            }
            if LIFECYCLE_FIELDS.contains(&name.as_str()) {
                return Err(SchemaError::InvalidDefinition {
                    collection: self.name.clone(),
                    reason: format!("'{}' is a reserved lifecycle field", name),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::DuplicateMember {
                    collection: self.name.clone(),
                    name: name.clone(),
                });
            }
        }

        for property in &self.properties {
            if let PropertyKind::Enum(values) = &property.kind {
                if values.is_empty() {
                    return Err(SchemaError::InvalidDefinition {
                        collection: self.name.clone(),
                        reason: format!("enum property '{}' has no values", property.name),
                    });
                }
            }
        }

        for slot in &self.references {
            if slot.targets.is_empty() {
                return Err(SchemaError::InvalidDefinition {
                    collection: self.name.clone(),
                    reason: format!("slot '{}' has no target collections", slot.name),
                });
            }
        }

        Ok(())
    }
}

/// Declarative property description, as found in schema documents
#[derive(Debug, Clone, Deserialize)]
struct PropertyDoc {
    name: String,
    data_type: String,
    #[serde(default)]
    values: Option<Vec<String>>,
    #[serde(default)]
    filterable: bool,
    #[serde(default)]
    searchable: bool,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReferenceDoc {
    name: String,
    targets: Vec<String>,
    #[serde(default = "default_cardinality")]
    cardinality: Cardinality,
    #[serde(default)]
    description: Option<String>,
}

fn default_cardinality() -> Cardinality {
    Cardinality::Many
}

#[derive(Debug, Clone, Deserialize)]
struct CollectionDoc {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyDoc>,
    #[serde(default)]
    references: Vec<ReferenceDoc>,
}

impl CollectionDoc {
    fn into_def(self) -> Result<CollectionDef, SchemaError> {
        let mut def = CollectionDef::new(self.name.clone());
        def.description = self.description;

        for prop in self.properties {
            let kind = PropertyKind::parse(&prop.data_type, prop.values).ok_or_else(|| {
                SchemaError::UnrecognizedKind {
                    collection: self.name.clone(),
                    property: prop.name.clone(),
                    kind: prop.data_type.clone(),
                }
            })?;
            def.properties.push(PropertyDef {
                name: prop.name,
                kind,
                filterable: prop.filterable,
                searchable: prop.searchable,
                required: prop.required,
                description: prop.description,
            });
        }

        for slot in self.references {
            def.references.push(ReferenceSlot {
                name: slot.name,
                targets: slot.targets,
                cardinality: slot.cardinality,
                description: slot.description,
            });
        }

        Ok(def)
    }
}

/// Process-wide collection registry
///
/// Built once at startup and then shared read-only with the store.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: Vec<CollectionDef>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a collection.
    ///
    /// Every slot target must already be defined, except the collection itself.
    pub fn define_collection(&mut self, def: CollectionDef) -> Result<(), StoreError> {
        if self.index.contains_key(&def.name) {
            return Err(SchemaError::DuplicateCollection(def.name).into());
        }
        def.check_members()?;

        for slot in &def.references {
            for target in &slot.targets {
                if target != &def.name && !self.index.contains_key(target) {
                    return Err(SchemaError::UnknownTargetCollection {
                        collection: def.name.clone(),
                        slot: slot.name.clone(),
                        target: target.clone(),
                    }
                    .into());
                }
            }
        }

        info!(
            "Defined collection {} ({} properties, {} reference slots)",
            def.name,
            def.properties.len(),
            def.references.len()
        );
        self.index.insert(def.name.clone(), self.collections.len());
        self.collections.push(def);
        Ok(())
    }

    /// Define every collection of a JSON schema document, in document order.
    ///
    /// The document is either an array of collections or an object with a
    /// `collections` array.
    pub fn define_from_json(&mut self, document: &Value) -> Result<(), StoreError> {
        let list = match document {
            Value::Array(_) => document,
            Value::Object(map) => map.get("collections").ok_or_else(|| {
                SchemaError::InvalidDefinition {
                    collection: String::new(),
                    reason: "schema document has no 'collections' array".to_string(),
                }
            })?,
            other => {
                return Err(SchemaError::InvalidDefinition {
                    collection: String::new(),
                    reason: format!("expected array or object, found {}", json_type_name(other)),
                }
                .into())
            }
        };

        let docs: Vec<CollectionDoc> =
            serde_json::from_value(list.clone()).map_err(|e| SchemaError::InvalidDefinition {
                collection: String::new(),
                reason: e.to_string(),
            })?;

        for collection in docs {
            self.define_collection(collection.into_def()?)?;
        }
        Ok(())
    }

    pub fn from_json(document: &Value) -> Result<Self, StoreError> {
        let mut registry = Self::new();
        registry.define_from_json(document)?;
        Ok(registry)
    }

    pub fn get_collection(&self, name: &str) -> Result<&CollectionDef, StoreError> {
        self.index
            .get(name)
            .map(|&i| &self.collections[i])
            .ok_or_else(|| StoreError::NotFound(NotFound::Collection(name.to_string())))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Collections in definition order.
    pub fn collections(&self) -> &[CollectionDef] {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
