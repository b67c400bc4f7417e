//! Reference-graph codec.
//!
//! Tracked rows travel as JSON objects keyed by column name. Foreign keys
//! additionally surface as properties:
//!
//! - a *reference* property on the referencing row holds the referenced row
//!   as a nested object (`"department": {...}` next to `"department_id"`)
//! - a *collection* property on the referenced row holds the referencing
//!   rows as an array (`"employee": [...]`)
//!
//! [`GraphWriter`] bounds how deep it follows these properties and writes
//! each instance at most once per writer. [`GraphReader`] resolves keys
//! through the table caches, so a graph read twice yields the same
//! instances.

mod reader;
mod writer;

pub use reader::GraphReader;
pub use writer::GraphWriter;

use crate::error::{CoreError, CoreResult};
use crate::schema::{Reference, Schema, TableSchema};
use serde_json::Value as JsonValue;

/// Outward reference of `table` exposed under `property`.
fn reference_named<'a>(table: &'a TableSchema, property: &str) -> Option<Reference<'a>> {
    table.references().find(|r| r.property() == property)
}

/// Inward reference to `table` exposed as collection `property`.
fn collection_named<'a>(
    schema: &'a Schema,
    table: &'a TableSchema,
    property: &str,
) -> Option<Reference<'a>> {
    schema
        .inward_references(table.name())
        .find(|r| r.collection() == property)
}

/// Discriminator carried by a JSON token: an integer or a numeric string.
fn discriminator_of(table: &TableSchema, json: &JsonValue) -> CoreResult<i64> {
    let parsed = match json {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    let value = parsed.ok_or_else(|| CoreError::UnknownDiscriminator {
        table: table.name().to_string(),
        value: json.to_string(),
    })?;
    if table.item_type(value).is_none() {
        return Err(CoreError::UnknownDiscriminator {
            table: table.name().to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}
