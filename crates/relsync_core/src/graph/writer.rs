//! Graph serialization.

use crate::cache::CacheRegistry;
use crate::config::{WireOptions, WireProfile};
use crate::error::CoreResult;
use crate::row::TrackedRow;
use crate::schema::{ColumnRoles, Schema};
use crate::stats::EngineStats;
use crate::tracking::RowStatus;
use relsync_codec::RowKey;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Writes tracked rows as JSON documents.
///
/// A writer is one serialization operation: each keyed instance is written
/// at most once, and later encounters (including repeated calls to
/// [`GraphWriter::write`]) are omitted.
pub struct GraphWriter<'a> {
    schema: &'a Schema,
    caches: &'a CacheRegistry,
    stats: &'a EngineStats,
    options: WireOptions,
    visited: HashSet<(String, RowKey)>,
}

impl<'a> GraphWriter<'a> {
    /// Creates a writer with an empty visited set.
    #[must_use]
    pub fn new(
        schema: &'a Schema,
        caches: &'a CacheRegistry,
        stats: &'a EngineStats,
        options: WireOptions,
    ) -> Self {
        Self {
            schema,
            caches,
            stats,
            options,
            visited: HashSet::new(),
        }
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &WireOptions {
        &self.options
    }

    /// Returns true if the instance was already written by this writer.
    #[must_use]
    pub fn has_written(&self, row: &TrackedRow) -> bool {
        row.key()
            .is_some_and(|key| self.visited.contains(&(row.table_name().to_string(), key)))
    }

    /// Writes `row` and the rows reachable from it.
    ///
    /// Returns `None` if this writer already wrote the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference points at a table the schema lacks.
    /// The failed instance is not marked written.
    pub fn write(&mut self, row: &TrackedRow) -> CoreResult<Option<JsonValue>> {
        self.write_object(row, 0)
    }

    /// Writes several rows as an array, leaving out omitted ones.
    ///
    /// # Errors
    ///
    /// See [`GraphWriter::write`].
    pub fn write_all<'r, I>(&mut self, rows: I) -> CoreResult<JsonValue>
    where
        I: IntoIterator<Item = &'r Arc<TrackedRow>>,
    {
        let mut documents = Vec::new();
        for row in rows {
            if let Some(document) = self.write(row)? {
                documents.push(document);
            }
        }
        debug!(documents = documents.len(), "wrote graph");
        Ok(JsonValue::Array(documents))
    }

    fn write_object(&mut self, row: &TrackedRow, depth: u32) -> CoreResult<Option<JsonValue>> {
        let visit = row.key().map(|key| (row.table_name().to_string(), key));
        if let Some(visit) = &visit {
            if !self.visited.insert(visit.clone()) {
                trace!(table = row.table_name(), key = %visit.1, "already written");
                self.stats.record_object_omitted();
                return Ok(None);
            }
        }

        match self.object_body(row, depth) {
            Ok(object) => {
                self.stats.record_object_written();
                Ok(Some(JsonValue::Object(object)))
            }
            Err(err) => {
                if let Some(visit) = &visit {
                    self.visited.remove(visit);
                }
                Err(err)
            }
        }
    }

    fn object_body(&mut self, row: &TrackedRow, depth: u32) -> CoreResult<Map<String, JsonValue>> {
        let (schema, caches) = (self.schema, self.caches);
        let table = Arc::clone(row.table());
        let values = row.values();
        let dirty_only =
            self.options.profile == WireProfile::Dirty && row.status() != RowStatus::New;
        let ledger = if dirty_only { row.ledger() } else { Default::default() };
        let item_type = row.item_type_info();

        let mut object = Map::new();
        for (ordinal, column) in table.columns().iter().enumerate() {
            if column.has(ColumnRoles::PASSWORD) {
                continue;
            }
            let identity = column.has(ColumnRoles::PRIMARY_KEY)
                || column.has(ColumnRoles::TYPE_DISCRIMINATOR);
            if !identity && !item_type.map_or(true, |t| t.uses(&column.name)) {
                continue;
            }
            if dirty_only && !identity && !ledger.contains_key(&column.name) {
                continue;
            }
            object.insert(column.name.clone(), values[ordinal].to_json());
        }

        if depth >= self.options.max_depth {
            return Ok(object);
        }

        if self.options.include_referencing {
            for reference in table.references() {
                let Some(key) = RowKey::from_value(&values[reference.ordinal]) else {
                    continue;
                };
                let target = schema.resolve_reference(&reference)?;
                let Some(referenced) = caches.get(target.name())?.get(&key) else {
                    continue;
                };
                if let Some(document) = self.write_object(&referenced, depth + 1)? {
                    object.insert(reference.property(), document);
                }
            }
        }

        if self.options.include_referenced {
            let Some(key) = row.key() else {
                return Ok(object);
            };
            let parent = key.to_value();
            for reference in schema.inward_references(table.name()) {
                let children = caches.get(reference.table)?.rows();
                let mut documents = Vec::new();
                for child in children
                    .iter()
                    .filter(|c| c.get_at(reference.ordinal) == parent)
                {
                    if let Some(document) = self.write_object(child, depth + 1)? {
                        documents.push(document);
                    }
                }
                if !documents.is_empty() {
                    object.insert(reference.collection(), JsonValue::Array(documents));
                }
            }
        }
        Ok(object)
    }
}

impl std::fmt::Debug for GraphWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphWriter")
            .field("options", &self.options)
            .field("visited", &self.visited.len())
            .finish()
    }
}
