//! Graph deserialization.

use super::{collection_named, discriminator_of, reference_named};
use crate::cache::{CacheRegistry, TableCache};
use crate::error::{CoreError, CoreResult};
use crate::row::TrackedRow;
use crate::schema::{Reference, Schema, TableSchema};
use crate::stats::EngineStats;
use crate::tracking::RowStatus;
use relsync_codec::{RowKey, Value, ValueKind};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, trace};

/// Pending downloads touched by one read.
#[derive(Default)]
struct Downloads {
    /// Created by this read; abandoned if the read fails.
    created: Vec<(Arc<TableCache>, RowKey)>,
    /// Received their values; attached once the read succeeds.
    completed: Vec<(Arc<TableCache>, RowKey)>,
}

/// Reads JSON documents into tracked rows.
pub struct GraphReader<'a> {
    schema: &'a Schema,
    caches: &'a CacheRegistry,
    stats: &'a EngineStats,
}

impl<'a> GraphReader<'a> {
    /// Creates a reader.
    #[must_use]
    pub fn new(schema: &'a Schema, caches: &'a CacheRegistry, stats: &'a EngineStats) -> Self {
        Self {
            schema,
            caches,
            stats,
        }
    }

    /// Reads one document of `table`.
    ///
    /// Keyed rows resolve to their cached instance, or to the one instance
    /// pending download for that key. A document holding nothing but the
    /// key leaves a new instance pending; any other document attaches it.
    /// Rows without a key come back as unattached new instances.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownProperty`] for a property the table does
    /// not have, [`CoreError::UnknownDiscriminator`] for an unregistered
    /// item type and [`CoreError::MalformedDocument`] for values of the wrong
    /// shape. Instances created by a failed read are discarded.
    pub fn read(&self, table: &str, document: &JsonValue) -> CoreResult<Arc<TrackedRow>> {
        let table = Arc::clone(self.schema.require_table(table)?);
        self.read_document(&table, document)
    }

    /// Reads an array of documents of `table`.
    ///
    /// Each document is settled before the next one is read: a failure
    /// keeps every earlier document and discards only the instances the
    /// failing one created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedDocument`] if `documents` is not an
    /// array; otherwise see [`GraphReader::read`].
    pub fn read_all(&self, table: &str, documents: &JsonValue) -> CoreResult<Vec<Arc<TrackedRow>>> {
        let items = documents
            .as_array()
            .ok_or_else(|| CoreError::malformed(format!("expected an array of {table}")))?;
        let table = Arc::clone(self.schema.require_table(table)?);
        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match self.read_document(&table, item) {
                Ok(row) => rows.push(row),
                Err(err) => {
                    debug!(table = table.name(), index, kept = rows.len(), error = %err, "graph read failed");
                    return Err(err);
                }
            }
        }
        debug!(table = table.name(), rows = rows.len(), "read graph");
        Ok(rows)
    }

    fn read_document(&self, table: &Arc<TableSchema>, document: &JsonValue) -> CoreResult<Arc<TrackedRow>> {
        let mut downloads = Downloads::default();
        match self.read_object(table, document, &mut downloads) {
            Ok(row) => {
                self.finish(downloads);
                Ok(row)
            }
            Err(err) => {
                self.abandon(downloads);
                Err(err)
            }
        }
    }

    fn finish(&self, downloads: Downloads) {
        for (cache, key) in downloads.completed {
            if cache.complete_download(&key).is_some() {
                self.stats.record_attach();
            }
        }
    }

    fn abandon(&self, downloads: Downloads) {
        for (cache, key) in downloads.created {
            cache.abandon_download(&key);
        }
    }

    fn read_object(
        &self,
        table: &Arc<TableSchema>,
        document: &JsonValue,
        downloads: &mut Downloads,
    ) -> CoreResult<Arc<TrackedRow>> {
        let object = document.as_object().ok_or_else(|| {
            CoreError::malformed(format!("{} document is not an object", table.name()))
        })?;

        let discriminator_column = table
            .discriminator_ordinal()
            .map(|i| table.columns()[i].name.as_str());
        let item_type = match discriminator_column.and_then(|c| object.get(c)) {
            Some(json) if !json.is_null() => Some(discriminator_of(table, json)?),
            _ => None,
        };

        let pk_column = table.primary_key().map(|c| c.name.as_str());
        let key = match pk_column.and_then(|c| object.get(c).map(|json| (c, json))) {
            Some((column, json)) if !json.is_null() => Some(Self::key_of(table, column, json)?),
            _ => None,
        };

        let Some(key) = key else {
            let row = Arc::new(TrackedRow::new(Arc::clone(table), item_type.unwrap_or(0)));
            self.populate(&row, object, downloads)?;
            self.stats.record_object_read();
            return Ok(row);
        };

        let cache = Arc::clone(self.caches.get(table.name())?);
        let (row, created) = cache.begin_download(&key, item_type.unwrap_or(0));
        if created {
            downloads.created.push((Arc::clone(&cache), key.clone()));
        }
        if let Some(item_type) = item_type.filter(|d| *d != row.item_type()) {
            trace!(table = table.name(), %key, item_type, "item type redirect");
            row.set_item_type(item_type)?;
        }

        let key_only = object
            .keys()
            .all(|k| Some(k.as_str()) == pk_column || Some(k.as_str()) == discriminator_column);
        if !key_only {
            self.populate(&row, object, downloads)?;
            if row.is_pending() {
                downloads.completed.push((cache, key));
            }
        }
        self.stats.record_object_read();
        Ok(row)
    }

    fn key_of(table: &TableSchema, column: &str, json: &JsonValue) -> CoreResult<RowKey> {
        let kind = table
            .column(column)
            .map_or(ValueKind::Any, |c| c.data_type.value_kind());
        let value = Value::from_json(json, kind)?;
        RowKey::from_value(&value).ok_or_else(|| {
            CoreError::malformed(format!("{}.{column} cannot be a key: {json}", table.name()))
        })
    }

    /// Applies every property except the key.
    fn populate(
        &self,
        row: &Arc<TrackedRow>,
        object: &Map<String, JsonValue>,
        downloads: &mut Downloads,
    ) -> CoreResult<()> {
        let table = Arc::clone(row.table());
        let mut assignments: Vec<(usize, Value)> = Vec::new();
        let mut references: Vec<(Reference<'_>, &JsonValue)> = Vec::new();
        let mut collections: Vec<(Reference<'_>, &Vec<JsonValue>)> = Vec::new();

        for (name, json) in object {
            if let Some(ordinal) = table.ordinal(name) {
                let column = &table.columns()[ordinal];
                if table.primary_key_ordinal() == Some(ordinal) {
                    continue;
                }
                let value = Value::from_json(json, column.data_type.value_kind())?;
                assignments.push((ordinal, value));
            } else if let Some(reference) = reference_named(&table, name) {
                references.push((reference, json));
            } else if let Some(reference) = collection_named(self.schema, &table, name) {
                match json {
                    JsonValue::Array(items) => collections.push((reference, items)),
                    JsonValue::Null => {}
                    other => {
                        return Err(CoreError::malformed(format!(
                            "{}.{name} must be an array, found {other}",
                            table.name()
                        )))
                    }
                }
            } else if json.is_null() || json.is_array() {
                trace!(table = table.name(), property = %name, "discarded unknown property");
            } else {
                return Err(CoreError::UnknownProperty {
                    table: table.name().to_string(),
                    property: name.clone(),
                });
            }
        }

        for (reference, json) in references {
            let value = match json {
                JsonValue::Null => Value::Null,
                JsonValue::Object(_) => {
                    let target = Arc::clone(self.schema.resolve_reference(&reference)?);
                    let referenced = self.read_object(&target, json, downloads)?;
                    referenced.key().map_or(Value::Null, |k| k.to_value())
                }
                other => {
                    return Err(CoreError::malformed(format!(
                        "{}.{} must be an object, found {other}",
                        table.name(),
                        reference.property()
                    )))
                }
            };
            assignments.push((reference.ordinal, value));
        }

        self.assign(row, assignments)?;

        for (reference, items) in collections {
            self.read_collection(row, &reference, items, downloads)?;
        }
        Ok(())
    }

    /// Writes values into a row: tracked for new unattached rows, in load
    /// mode with local edits protected otherwise.
    fn assign(&self, row: &TrackedRow, assignments: Vec<(usize, Value)>) -> CoreResult<()> {
        if row.status() == RowStatus::New && !row.is_pending() {
            for (ordinal, value) in assignments {
                row.set(&row.table().columns()[ordinal].name, value)?;
            }
            return Ok(());
        }
        let cache = self.caches.get(row.table_name()).ok();
        let _guard = cache.map(|c| c.apply_lock());
        let protected = row.apply_loaded(assignments, row.is_attached());
        if protected > 0 {
            self.stats.record_protected(protected as u64);
        }
        Ok(())
    }

    fn read_collection(
        &self,
        parent: &TrackedRow,
        reference: &Reference<'_>,
        items: &[JsonValue],
        downloads: &mut Downloads,
    ) -> CoreResult<()> {
        let child_table = Arc::clone(self.schema.require_table(reference.table)?);
        let parent_key = parent.key().map(|k| k.to_value());

        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            let child = self.read_object(&child_table, item, downloads)?;
            if let Some(parent_key) = &parent_key {
                self.assign(&child, vec![(reference.ordinal, parent_key.clone())])?;
            }
            seen.push(child);
        }

        if reference.foreign_key.live {
            // Merge: children already cached are confirmed as they are.
            for child in seen.iter().filter(|c| c.is_attached() && !c.is_pending()) {
                child.accept();
            }
            return Ok(());
        }
        let Some(parent_key) = parent_key else {
            return Ok(());
        };
        // Replace: children of this parent missing from the payload are unlinked.
        for child in self.caches.get(reference.table)?.rows() {
            if child.get_at(reference.ordinal) == parent_key
                && !seen.iter().any(|s| Arc::ptr_eq(s, &child))
            {
                trace!(table = reference.table, key = ?child.key(), "unlinked from collection");
                self.assign(&child, vec![(reference.ordinal, Value::Null)])?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for GraphReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphReader").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::fixture::{seeded, World};
    use serde_json::json;
    use std::thread;

    fn reader(world: &World) -> GraphReader<'_> {
        GraphReader::new(&world.schema, &world.caches, &world.stats)
    }

    #[test]
    fn key_only_document_stays_pending() {
        let world = World::new(false);
        let cache = world.caches.get("department").unwrap();

        let first = reader(&world).read("department", &json!({"id": 5})).unwrap();
        let second = reader(&world).read("department", &json!({"id": 5})).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_pending());
        assert_eq!(cache.pending_len(), 1);
        assert!(cache.is_empty());

        // The values arrive later and attach the same instance.
        let full = reader(&world)
            .read("department", &json!({"id": 5, "name": "Sales"}))
            .unwrap();
        assert!(Arc::ptr_eq(&full, &first));
        assert!(full.is_attached());
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(full.get("name").unwrap(), Value::from("Sales"));
    }

    #[test]
    fn concurrent_key_only_reads_share_instance() {
        let world = Arc::new(World::new(false));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let world = Arc::clone(&world);
                thread::spawn(move || {
                    GraphReader::new(&world.schema, &world.caches, &world.stats)
                        .read("department", &json!({"id": 5}))
                        .unwrap()
                })
            })
            .collect();
        let rows: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(rows.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(world.caches.get("department").unwrap().pending_len(), 1);
    }

    #[test]
    fn discriminator_redirects_item_type() {
        let world = seeded(false);
        let bob = reader(&world)
            .read("employee", &json!({"id": 11, "kind": 1, "bonus": "100.50"}))
            .unwrap();
        assert_eq!(bob.item_type(), 1);
        assert_eq!(bob.get("bonus").unwrap(), Value::Decimal("100.50".parse().unwrap()));

        let err = reader(&world)
            .read("employee", &json!({"id": 12, "kind": 9}))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownDiscriminator { .. }));
        assert!(world.caches.get("employee").unwrap().pending(&RowKey::Integer(12)).is_none());
    }

    #[test]
    fn unknown_properties() {
        let world = World::new(false);
        let err = reader(&world)
            .read("department", &json!({"id": 3, "budget": 10}))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { property, .. } if property == "budget"));
        // The failed read leaves nothing pending.
        assert_eq!(world.caches.get("department").unwrap().pending_len(), 0);

        let row = reader(&world)
            .read("department", &json!({"id": 3, "name": "Ops", "legacy": null, "tags": [1, 2]}))
            .unwrap();
        assert_eq!(row.get("name").unwrap(), Value::from("Ops"));
    }

    #[test]
    fn local_edits_survive_reads() {
        let world = seeded(false);
        let bob = world.cached("employee", 11).unwrap();
        bob.set("name", "Robert").unwrap();

        reader(&world)
            .read("employee", &json!({"id": 11, "name": "Bobby", "manager_id": null}))
            .unwrap();
        assert_eq!(bob.get("name").unwrap(), Value::from("Robert"));
        assert_eq!(bob.get("manager_id").unwrap(), Value::Null);
        assert_eq!(bob.status(), RowStatus::Edit);
        assert_eq!(world.stats.fields_protected(), 1);
    }

    #[test]
    fn references_set_foreign_keys() {
        let world = World::new(false);
        let row = reader(&world)
            .read(
                "employee",
                &json!({"id": 20, "name": "Cy", "dept": {"id": 2, "name": "Legal"}}),
            )
            .unwrap();
        assert_eq!(row.get("dept_id").unwrap(), Value::Integer(2));
        assert!(world.cached("department", 2).unwrap().is_attached());
    }

    #[test]
    fn replace_collection_unlinks_missing_children() {
        let world = seeded(false);
        reader(&world)
            .read(
                "department",
                &json!({"id": 1, "members": [{"id": 11}, {"id": 12, "name": "Cleo"}]}),
            )
            .unwrap();

        let ada = world.cached("employee", 10).unwrap();
        assert_eq!(ada.get("dept_id").unwrap(), Value::Null);
        assert_eq!(world.cached("employee", 11).unwrap().get("dept_id").unwrap(), Value::Integer(1));
        let cleo = world.cached("employee", 12).unwrap();
        assert_eq!(cleo.get("dept_id").unwrap(), Value::Integer(1));
        assert_eq!(cleo.status(), RowStatus::Actual);
    }

    #[test]
    fn live_collection_merges() {
        let world = seeded(true);
        reader(&world)
            .read("department", &json!({"id": 1, "members": [{"id": 12, "name": "Cleo"}]}))
            .unwrap();

        assert_eq!(world.cached("employee", 10).unwrap().get("dept_id").unwrap(), Value::Integer(1));
        assert_eq!(world.cached("employee", 11).unwrap().get("dept_id").unwrap(), Value::Integer(1));
        assert_eq!(world.cached("employee", 12).unwrap().get("dept_id").unwrap(), Value::Integer(1));
    }

    #[test]
    fn live_collection_marks_existing_members_actual() {
        let world = seeded(true);
        let bob = world.cached("employee", 11).unwrap();
        bob.set("name", "Robert").unwrap();
        assert_eq!(bob.status(), RowStatus::Edit);

        reader(&world)
            .read(
                "department",
                &json!({"id": 1, "members": [{"id": 11}, {"id": 12, "name": "Cleo"}]}),
            )
            .unwrap();
        assert_eq!(bob.status(), RowStatus::Actual);
        assert!(bob.ledger().is_empty());
        assert_eq!(bob.get("name").unwrap(), Value::from("Robert"));
        let cleo = world.cached("employee", 12).unwrap();
        assert_eq!(cleo.status(), RowStatus::Actual);
        assert_eq!(cleo.get("dept_id").unwrap(), Value::Integer(1));
    }

    #[test]
    fn failed_document_keeps_earlier_siblings() {
        let world = seeded(false);
        let err = reader(&world)
            .read_all(
                "department",
                &json!([
                    {"id": 1, "name": "Renamed"},
                    {"id": 3, "name": "C"},
                    {"id": 4, "budget": 1},
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));

        assert_eq!(world.cached("department", 1).unwrap().get("name").unwrap(), Value::from("Renamed"));
        let third = world.cached("department", 3).unwrap();
        assert!(third.is_attached());
        assert_eq!(third.get("name").unwrap(), Value::from("C"));
        assert!(world.cached("department", 4).is_none());
        assert_eq!(world.caches.get("department").unwrap().pending_len(), 0);
    }

    #[test]
    fn keyless_documents_are_new() {
        let world = World::new(false);
        let row = reader(&world)
            .read("department", &json!({"name": "Ops"}))
            .unwrap();
        assert_eq!(row.status(), RowStatus::New);
        assert!(!row.is_attached());
        assert_eq!(row.get("name").unwrap(), Value::from("Ops"));
        assert!(world.caches.get("department").unwrap().is_empty());
    }

    #[test]
    fn read_all_rejects_non_arrays() {
        let world = World::new(false);
        assert!(matches!(
            reader(&world).read_all("department", &json!({"id": 1})),
            Err(CoreError::MalformedDocument { .. })
        ));
        let rows = reader(&world)
            .read_all("department", &json!([{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(world.caches.get("department").unwrap().len(), 2);
    }
}
