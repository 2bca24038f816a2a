// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Predicate filtering over typed object properties
//!
//! Predicates are trees of `And`/`Or`/`Not` over leaf comparisons. A predicate
//! is first bound against a collection, which rejects unknown or non-filterable
//! targets and coerces literal values to the property's kind. Evaluation of a
//! bound predicate is pure.
//!
//! Besides declared properties, every collection exposes its lifecycle
//! fields: `status` (enum), `superseded_by` (uuid), `created_at` and
//! `updated_at` (dates).
//!
//! A Mongo-style JSON syntax is accepted as well:
//!
//! ```
//! use serde_json::json;
//! use knowledge_store::core::filter::Predicate;
//!
//! let filter = Predicate::from_json(&json!({
//!     "$and": [
//!         {"domain": "work"},
//!         {"tags": {"$contains": "ai-agents"}},
//!         {"content": {"$like": "*agents*"}}
//!     ]
//! })).unwrap();
//! assert!(matches!(filter, Predicate::And { .. }));
//! ```

use crate::core::schema::{json_type_name, CollectionDef, PropertyKind};
use crate::core::types::{KnowledgeObject, ObjectId, PropertyValue, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::ops::{BitAnd, BitOr, Not};
use thiserror::Error;

/// Errors that can occur during filter parsing or binding
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Collection '{collection}' has no property '{property}'")]
    UnknownProperty { collection: String, property: String },

    #[error("Property '{0}' is not filterable")]
    NotFilterable(String),

    #[error("Operator {operator} cannot be applied to {kind} property '{property}'")]
    TypeMismatch {
        property: String,
        operator: &'static str,
        kind: &'static str,
    },

    #[error("Invalid value for '{property}': {reason}")]
    InvalidValue { property: String, reason: String },

    #[error("Collection '{collection}' has no reference slot '{slot}'")]
    UnknownSlot { collection: String, slot: String },
}

/// Boolean predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    And { operands: Vec<Predicate> },
    Or { operands: Vec<Predicate> },
    Not { operand: Box<Predicate> },
    Equal { property: String, value: PropertyValue },
    NotEqual { property: String, value: PropertyValue },
    /// Array property holds the value
    Contains { property: String, value: String },
    /// Array property holds at least one of the values
    ContainsAny { property: String, values: Vec<String> },
    GreaterThan { property: String, value: DateTime<Utc> },
    LessThan { property: String, value: DateTime<Utc> },
    /// Inclusive on both ends
    Between {
        property: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// `*` and `?` wildcards, case-insensitive; no wildcard means substring
    Like { property: String, pattern: String },
    /// Reference slot contains the identifier
    References { slot: String, id: ObjectId },
}

impl Predicate {
    pub fn and(operands: Vec<Predicate>) -> Self {
        Predicate::And { operands }
    }

    pub fn or(operands: Vec<Predicate>) -> Self {
        Predicate::Or { operands }
    }

    pub fn negate(operand: Predicate) -> Self {
        Predicate::Not {
            operand: Box::new(operand),
        }
    }

    pub fn equal(property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Predicate::Equal {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn not_equal(property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Predicate::NotEqual {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn contains(property: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Contains {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn contains_any<I, S>(property: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::ContainsAny {
            property: property.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn greater_than(property: impl Into<String>, value: DateTime<Utc>) -> Self {
        Predicate::GreaterThan {
            property: property.into(),
            value,
        }
    }

    pub fn less_than(property: impl Into<String>, value: DateTime<Utc>) -> Self {
        Predicate::LessThan {
            property: property.into(),
            value,
        }
    }

    pub fn between(property: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Predicate::Between {
            property: property.into(),
            start,
            end,
        }
    }

    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    pub fn references(slot: impl Into<String>, id: ObjectId) -> Self {
        Predicate::References {
            slot: slot.into(),
            id,
        }
    }

    /// Parse a filter from JSON
    pub fn from_json(value: &JsonValue) -> Result<Self, FilterError> {
        let map = match value {
            JsonValue::Object(map) => map,
            _ => {
                return Err(FilterError::InvalidSyntax(
                    "Filter must be a JSON object".to_string(),
                ))
            }
        };

        if map.is_empty() {
            return Err(FilterError::InvalidSyntax("Empty filter object".to_string()));
        }

        // Every key is one operand of an implicit AND, combinators included
        let mut leaves = Vec::with_capacity(map.len());
        for (key, member) in map {
            let leaf = match key.as_str() {
                "$and" => Predicate::and(Self::parse_list("$and", member)?),
                "$or" => Predicate::or(Self::parse_list("$or", member)?),
                "$not" => Predicate::negate(Self::from_json(member)?),
                "$ref" => Self::parse_ref(member)?,
                op if op.starts_with('$') => {
                    return Err(FilterError::UnsupportedOperator(op.to_string()))
                }
                field => Self::parse_field(field, member)?,
            };
            leaves.push(leaf);
        }
        if leaves.len() == 1 {
            Ok(leaves.remove(0))
        } else {
            Ok(Predicate::and(leaves))
        }
    }

    fn parse_list(op: &str, value: &JsonValue) -> Result<Vec<Predicate>, FilterError> {
        match value {
            JsonValue::Array(items) => items.iter().map(Self::from_json).collect(),
            _ => Err(FilterError::InvalidSyntax(format!("{} must be an array", op))),
        }
    }

    fn parse_ref(value: &JsonValue) -> Result<Self, FilterError> {
        let slot = value.get("slot").and_then(JsonValue::as_str);
        let id = value.get("id").and_then(JsonValue::as_str);
        match (slot, id) {
            (Some(slot), Some(id)) => {
                let id = id.parse::<ObjectId>().map_err(|e| FilterError::InvalidValue {
                    property: slot.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Predicate::references(slot, id))
            }
            _ => Err(FilterError::InvalidSyntax(
                "$ref requires string members 'slot' and 'id'".to_string(),
            )),
        }
    }

    fn parse_field(field: &str, value: &JsonValue) -> Result<Self, FilterError> {
        match value {
            JsonValue::Object(ops) => Self::parse_operators(field, ops),
            _ => Ok(Predicate::Equal {
                property: field.to_string(),
                value: literal(field, value)?,
            }),
        }
    }

    fn parse_operators(field: &str, ops: &Map<String, JsonValue>) -> Result<Self, FilterError> {
        if ops.is_empty() {
            return Err(FilterError::InvalidSyntax(format!(
                "Empty object for field '{}' - must specify an operator",
                field
            )));
        }

        let mut leaves = Vec::with_capacity(ops.len());
        for (op, operand) in ops {
            let leaf = match op.as_str() {
                "$eq" => Predicate::Equal {
                    property: field.to_string(),
                    value: literal(field, operand)?,
                },
                "$ne" => Predicate::NotEqual {
                    property: field.to_string(),
                    value: literal(field, operand)?,
                },
                "$contains" => Predicate::contains(field, text(field, operand)?),
                "$containsAny" => match operand {
                    JsonValue::Array(items) => Predicate::ContainsAny {
                        property: field.to_string(),
                        values: items
                            .iter()
                            .map(|item| text(field, item))
                            .collect::<Result<_, _>>()?,
                    },
                    _ => {
                        return Err(FilterError::InvalidSyntax(
                            "$containsAny value must be an array".to_string(),
                        ))
                    }
                },
                "$gt" => Predicate::greater_than(field, date(field, operand)?),
                "$lt" => Predicate::less_than(field, date(field, operand)?),
                "$between" => match operand.as_array().map(Vec::as_slice) {
                    Some([start, end]) => {
                        Predicate::between(field, date(field, start)?, date(field, end)?)
                    }
                    _ => {
                        return Err(FilterError::InvalidSyntax(
                            "$between value must be a two-element array".to_string(),
                        ))
                    }
                },
                "$like" => Predicate::like(field, text(field, operand)?),
                other => return Err(FilterError::UnsupportedOperator(other.to_string())),
            };
            leaves.push(leaf);
        }

        if leaves.len() == 1 {
            Ok(leaves.remove(0))
        } else {
            Ok(Predicate::and(leaves))
        }
    }

    /// Validate this predicate against a collection and coerce literal values
    /// to the declared property kinds.
    pub fn bind(&self, collection: &CollectionDef) -> Result<Predicate, FilterError> {
        match self {
            Predicate::And { operands } => Ok(Predicate::and(
                operands
                    .iter()
                    .map(|p| p.bind(collection))
                    .collect::<Result<_, _>>()?,
            )),
            Predicate::Or { operands } => Ok(Predicate::or(
                operands
                    .iter()
                    .map(|p| p.bind(collection))
                    .collect::<Result<_, _>>()?,
            )),
            Predicate::Not { operand } => Ok(Predicate::negate(operand.bind(collection)?)),
            Predicate::Equal { property, value } => {
                let kind = leaf_kind(collection, property)?;
                Ok(Predicate::Equal {
                    property: property.clone(),
                    value: coerce(property, &kind, value, "equal")?,
                })
            }
            Predicate::NotEqual { property, value } => {
                let kind = leaf_kind(collection, property)?;
                Ok(Predicate::NotEqual {
                    property: property.clone(),
                    value: coerce(property, &kind, value, "notEqual")?,
                })
            }
            Predicate::Contains { property, .. } | Predicate::ContainsAny { property, .. } => {
                let kind = leaf_kind(collection, property)?;
                require(property, &kind, "contains", |k| *k == PropertyKind::TextArray)?;
                Ok(self.clone())
            }
            Predicate::GreaterThan { property, .. }
            | Predicate::LessThan { property, .. }
            | Predicate::Between { property, .. } => {
                let kind = leaf_kind(collection, property)?;
                require(property, &kind, "range", |k| *k == PropertyKind::Date)?;
                Ok(self.clone())
            }
            Predicate::Like { property, .. } => {
                let kind = leaf_kind(collection, property)?;
                require(property, &kind, "like", PropertyKind::is_textual)?;
                Ok(self.clone())
            }
            Predicate::References { slot, .. } => {
                if collection.get_slot(slot).is_none() {
                    return Err(FilterError::UnknownSlot {
                        collection: collection.name.clone(),
                        slot: slot.clone(),
                    });
                }
                Ok(self.clone())
            }
        }
    }

    /// Check whether an object matches this predicate
    pub fn matches(&self, object: &KnowledgeObject) -> bool {
        match self {
            // Empty AND matches everything (vacuous truth)
            Predicate::And { operands } => operands.iter().all(|p| p.matches(object)),
            // Empty OR matches nothing
            Predicate::Or { operands } => operands.iter().any(|p| p.matches(object)),
            Predicate::Not { operand } => !operand.matches(object),
            Predicate::Equal { property, value } => {
                object.field(property).as_deref() == Some(value)
            }
            Predicate::NotEqual { property, value } => {
                object.field(property).as_deref() != Some(value)
            }
            Predicate::Contains { property, value } => object.field(property).map_or(false, |v| {
                v.as_text_array()
                    .map_or(false, |items| items.iter().any(|item| item == value))
            }),
            Predicate::ContainsAny { property, values } => {
                object.field(property).map_or(false, |v| {
                    v.as_text_array()
                        .map_or(false, |items| items.iter().any(|item| values.contains(item)))
                })
            }
            Predicate::GreaterThan { property, value } => {
                date_of(object, property).map_or(false, |d| d > *value)
            }
            Predicate::LessThan { property, value } => {
                date_of(object, property).map_or(false, |d| d < *value)
            }
            Predicate::Between {
                property,
                start,
                end,
            } => date_of(object, property).map_or(false, |d| *start <= d && d <= *end),
            Predicate::Like { property, pattern } => object.field(property).map_or(false, |v| {
                v.as_text().map_or(false, |text| like_match(pattern, text))
            }),
            Predicate::References { slot, id } => object.references_id(slot, id),
        }
    }
}

/// Evaluate a predicate against an object.
///
/// The predicate is taken as already bound: leaves on unknown or
/// non-filterable properties are not checked. Use [`evaluate_in`] to check it
/// against the collection first.
pub fn evaluate(predicate: &Predicate, object: &KnowledgeObject) -> bool {
    predicate.matches(object)
}

/// Bind a predicate against the collection, then evaluate it.
pub fn evaluate_in(
    collection: &CollectionDef,
    predicate: &Predicate,
    object: &KnowledgeObject,
) -> Result<bool, FilterError> {
    Ok(predicate.bind(collection)?.matches(object))
}

impl BitAnd for Predicate {
    type Output = Predicate;

    fn bitand(self, rhs: Predicate) -> Predicate {
        match self {
            Predicate::And { mut operands } => {
                operands.push(rhs);
                Predicate::and(operands)
            }
            lhs => Predicate::and(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Predicate {
    type Output = Predicate;

    fn bitor(self, rhs: Predicate) -> Predicate {
        match self {
            Predicate::Or { mut operands } => {
                operands.push(rhs);
                Predicate::or(operands)
            }
            lhs => Predicate::or(vec![lhs, rhs]),
        }
    }
}

impl Not for Predicate {
    type Output = Predicate;

    fn not(self) -> Predicate {
        Predicate::negate(self)
    }
}

fn leaf_kind<'a>(
    collection: &'a CollectionDef,
    property: &str,
) -> Result<Cow<'a, PropertyKind>, FilterError> {
    if let Some(kind) = lifecycle_kind(property) {
        return Ok(Cow::Owned(kind));
    }
    let def = collection
        .get_property(property)
        .ok_or_else(|| FilterError::UnknownProperty {
            collection: collection.name.clone(),
            property: property.to_string(),
        })?;
    if !def.filterable {
        return Err(FilterError::NotFilterable(property.to_string()));
    }
    Ok(Cow::Borrowed(&def.kind))
}

/// Kinds of the lifecycle fields every collection exposes to filters.
fn lifecycle_kind(field: &str) -> Option<PropertyKind> {
    match field {
        "status" => Some(PropertyKind::Enum(
            [Status::Active, Status::Superseded, Status::Archived]
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
        )),
        "superseded_by" => Some(PropertyKind::Id),
        "created_at" | "updated_at" => Some(PropertyKind::Date),
        _ => None,
    }
}

fn require(
    property: &str,
    kind: &PropertyKind,
    operator: &'static str,
    accepts: impl Fn(&PropertyKind) -> bool,
) -> Result<(), FilterError> {
    if accepts(kind) {
        Ok(())
    } else {
        Err(FilterError::TypeMismatch {
            property: property.to_string(),
            operator,
            kind: kind.type_name(),
        })
    }
}

fn coerce(
    property: &str,
    kind: &PropertyKind,
    value: &PropertyValue,
    operator: &'static str,
) -> Result<PropertyValue, FilterError> {
    let invalid = |reason: String| FilterError::InvalidValue {
        property: property.to_string(),
        reason,
    };

    let coerced = match (kind, value) {
        (PropertyKind::Date, PropertyValue::Text(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| PropertyValue::Date(d.with_timezone(&Utc)))
            .map_err(|e| invalid(format!("'{}' is not an RFC 3339 date: {}", s, e)))?,
        (PropertyKind::Id, PropertyValue::Text(s)) => s
            .parse::<ObjectId>()
            .map(PropertyValue::Id)
            .map_err(|e| invalid(format!("'{}' is not a uuid: {}", s, e)))?,
        _ => value.clone(),
    };

    kind.check(&coerced).map_err(|_| FilterError::TypeMismatch {
        property: property.to_string(),
        operator,
        kind: kind.type_name(),
    })?;
    Ok(coerced)
}

fn date_of(object: &KnowledgeObject, property: &str) -> Option<DateTime<Utc>> {
    object.field(property).and_then(|v| v.as_date())
}

fn literal(field: &str, value: &JsonValue) -> Result<PropertyValue, FilterError> {
    match value {
        JsonValue::String(s) => Ok(PropertyValue::Text(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| text(field, item))
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::TextArray),
        other => Err(FilterError::InvalidValue {
            property: field.to_string(),
            reason: format!("unsupported literal of type {}", json_type_name(other)),
        }),
    }
}

fn text(field: &str, value: &JsonValue) -> Result<String, FilterError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| FilterError::InvalidValue {
            property: field.to_string(),
            reason: format!("expected string, found {}", json_type_name(value)),
        })
}

fn date(field: &str, value: &JsonValue) -> Result<DateTime<Utc>, FilterError> {
    let s = text(field, value)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| FilterError::InvalidValue {
            property: field.to_string(),
            reason: format!("'{}' is not an RFC 3339 date: {}", s, e),
        })
}

/// Case-insensitive wildcard match. Patterns without wildcards match as substrings.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    if !pattern.iter().any(|c| *c == '*' || *c == '?') {
        if pattern.is_empty() {
            return true;
        }
        return text.windows(pattern.len()).any(|w| w == pattern.as_slice());
    }

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
