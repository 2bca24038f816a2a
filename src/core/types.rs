// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique object identifier, shared across every collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(Uuid);

impl ObjectId {
    pub fn new() -> Self {
        ObjectId(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        ObjectId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn short(&self) -> String {
        format!("obj_{}", &self.0.simple().to_string()[..8])
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ObjectId)
    }
}

/// Lifecycle state of a knowledge object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Superseded,
    Archived,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Superseded => "superseded",
            Status::Archived => "archived",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Active)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "superseded" => Ok(Status::Superseded),
            "archived" => Ok(Status::Archived),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    TextArray(Vec<String>),
    Date(DateTime<Utc>),
    Id(ObjectId),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Text(_) => "text",
            PropertyValue::TextArray(_) => "text[]",
            PropertyValue::Date(_) => "date",
            PropertyValue::Id(_) => "uuid",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text_array(&self) -> Option<&[String]> {
        match self {
            PropertyValue::TextArray(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_id(&self) -> Option<ObjectId> {
        match self {
            PropertyValue::Id(id) => Some(*id),
            _ => None,
        }
    }

    /// Render the value as plain text for embedding source composition.
    pub fn to_plain_text(&self) -> String {
        match self {
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::TextArray(values) => values.join(", "),
            PropertyValue::Date(d) => d.to_rfc3339(),
            PropertyValue::Id(id) => id.to_string(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(values: Vec<String>) -> Self {
        PropertyValue::TextArray(values)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(values: Vec<&str>) -> Self {
        PropertyValue::TextArray(values.into_iter().map(String::from).collect())
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<ObjectId> for PropertyValue {
    fn from(value: ObjectId) -> Self {
        PropertyValue::Id(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// A stored reference: the target identifier plus its resolved collection tag,
/// so polymorphic slots never need to probe collections on resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceTarget {
    pub id: ObjectId,
    pub collection: String,
}

/// Lifecycle fields that filters can read like properties. Collections may
/// not declare properties with these names.
pub const LIFECYCLE_FIELDS: [&str; 4] = ["status", "superseded_by", "created_at", "updated_at"];

/// A stored instance of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeObject {
    pub id: ObjectId,
    pub collection: String,
    pub properties: Properties,
    pub vector: Vec<f32>,
    pub references: BTreeMap<String, Vec<ReferenceTarget>>,
    pub status: Status,
    pub superseded_by: Option<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeObject {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_text)
    }

    /// A declared property, or a lifecycle field by its reserved name.
    pub fn field(&self, name: &str) -> Option<Cow<'_, PropertyValue>> {
        match name {
            "status" => Some(Cow::Owned(PropertyValue::Text(self.status.as_str().to_string()))),
            "superseded_by" => self.superseded_by.map(|id| Cow::Owned(PropertyValue::Id(id))),
            "created_at" => Some(Cow::Owned(PropertyValue::Date(self.created_at))),
            "updated_at" => Some(Cow::Owned(PropertyValue::Date(self.updated_at))),
            _ => self.property(name).map(Cow::Borrowed),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Target identifiers of a slot, in stored order.
    pub fn reference_ids(&self, slot: &str) -> Vec<ObjectId> {
        self.references
            .get(slot)
            .map(|targets| targets.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    pub fn references_id(&self, slot: &str, id: &ObjectId) -> bool {
        self.references
            .get(slot)
            .map_or(false, |targets| targets.iter().any(|t| &t.id == id))
    }
}

/// Input for a new object. References are given as bare identifiers and are
/// resolved to their collections at insert time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewObject {
    pub collection: String,
    pub properties: Properties,
    pub vector: Vec<f32>,
    pub references: BTreeMap<String, Vec<ObjectId>>,
}

impl NewObject {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_reference<I>(mut self, slot: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = ObjectId>,
    {
        self.references
            .entry(slot.into())
            .or_default()
            .extend(targets);
        self
    }
}

/// A vector index hit: identifier and cosine distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: ObjectId,
    pub distance: f32,
}

impl SearchResult {
    pub fn new(id: ObjectId, distance: f32) -> Self {
        SearchResult { id, distance }
    }
}

impl Eq for SearchResult {}

impl PartialOrd for SearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Ascending distance, ties broken by identifier.
impl Ord for SearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}
