// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! The standard five-collection personal knowledge base

use crate::core::schema::{CollectionDef, PropertyDef, ReferenceSlot, SchemaRegistry};
use crate::error::StoreError;

pub const ENTITY: &str = "Entity";
pub const STRATEGY: &str = "Strategy";
pub const INSIGHT: &str = "Insight";
pub const EVENT: &str = "Event";
pub const PROCESS: &str = "Process";

const DOMAINS: [&str; 3] = ["personal", "work", "both"];

fn domain() -> PropertyDef {
    PropertyDef::enumeration("domain", DOMAINS)
        .filterable()
        .describe("Domain filter")
}

pub fn entity() -> CollectionDef {
    CollectionDef::new(ENTITY)
        .describe("Organizations, teams, products, projects and people")
        .property(PropertyDef::text("name").filterable().searchable().required())
        .property(
            PropertyDef::enumeration(
                "entity_type",
                ["company", "team", "product", "project", "conference", "community", "person"],
            )
            .filterable(),
        )
        .property(domain())
        .property(PropertyDef::text("description").searchable())
        .property(PropertyDef::text("notes").searchable())
}

pub fn strategy() -> CollectionDef {
    CollectionDef::new(STRATEGY)
        .describe("Goals, priorities, frameworks, principles and mental models")
        .property(PropertyDef::text("title").filterable().searchable().required())
        .property(PropertyDef::text("content").searchable().required())
        .property(
            PropertyDef::enumeration(
                "strategy_type",
                ["goal", "framework", "principle", "priority", "mental_model", "methodology"],
            )
            .filterable(),
        )
        .property(domain())
        .property(
            PropertyDef::enumeration(
                "time_horizon",
                ["evergreen", "quarterly", "yearly", "project-bound"],
            )
            .filterable(),
        )
        .property(PropertyDef::date("valid_from").filterable())
        .property(PropertyDef::date("valid_until").filterable())
        .reference(ReferenceSlot::many("appliesToEntities", [ENTITY]))
        .reference(
            ReferenceSlot::many("relatedStrategies", [STRATEGY])
                .describe("Parent strategies, supporting frameworks, related goals"),
        )
}

pub fn insight() -> CollectionDef {
    CollectionDef::new(INSIGHT)
        .describe("Atomic, self-contained units of knowledge")
        .property(PropertyDef::text("content").searchable().required())
        .property(PropertyDef::text("source_name").filterable())
        .property(
            PropertyDef::enumeration(
                "source_type",
                ["article", "video", "book", "podcast", "conversation", "reflection", "research"],
            )
            .filterable(),
        )
        .property(domain())
        .property(PropertyDef::text_array("tags").filterable())
        .property(
            PropertyDef::enumeration("confidence", ["high", "medium", "low", "hypothesis"])
                .filterable(),
        )
        .reference(ReferenceSlot::many("relatedStrategies", [STRATEGY]))
        .reference(ReferenceSlot::many("relatedEntities", [ENTITY]))
        .reference(ReferenceSlot::many("relatedInsights", [INSIGHT]))
}

pub fn event() -> CollectionDef {
    CollectionDef::new(EVENT)
        .describe("Meetings, decisions and milestones")
        .property(PropertyDef::text("title").filterable().searchable().required())
        .property(
            PropertyDef::enumeration(
                "event_type",
                ["meeting", "decision", "milestone", "announcement", "workshop", "review"],
            )
            .filterable(),
        )
        .property(PropertyDef::text("summary").searchable())
        .property(PropertyDef::text_array("participants").filterable())
        .property(domain())
        .property(PropertyDef::date("event_date").filterable().required())
        .property(PropertyDef::text("outcomes").searchable())
        .property(PropertyDef::text("action_items"))
        .property(PropertyDef::text("open_questions"))
        .reference(ReferenceSlot::many("involvesEntities", [ENTITY]))
        .reference(ReferenceSlot::many("relatesToStrategies", [STRATEGY]))
        .reference(ReferenceSlot::many("generatedInsights", [INSIGHT]))
        .reference(
            ReferenceSlot::many("mentions", [ENTITY, STRATEGY, INSIGHT])
                .describe("Anything the event touched on"),
        )
}

pub fn process() -> CollectionDef {
    CollectionDef::new(PROCESS)
        .describe("Repeatable workflows and checklists")
        .property(PropertyDef::text("title").filterable().searchable().required())
        .property(PropertyDef::text("content").searchable().required())
        .property(domain())
        .property(PropertyDef::text("triggers").searchable())
        .reference(ReferenceSlot::many("appliesToEntities", [ENTITY]))
        .reference(ReferenceSlot::many("relatedStrategies", [STRATEGY]))
}

/// All five collections, defined in dependency order.
pub fn knowledge_base() -> Result<SchemaRegistry, StoreError> {
    let mut registry = SchemaRegistry::new();
    for def in [entity(), strategy(), insight(), event(), process()] {
        registry.define_collection(def)?;
    }
    Ok(registry)
}
