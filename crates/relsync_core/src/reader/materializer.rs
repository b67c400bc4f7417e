//! Cursor-to-instance materialization.

use super::segment::{classify, Segment};
use super::{QuerySource, ReadOptions, ReadOutcome, StaleRow};
use crate::cache::CacheRegistry;
use crate::error::{CoreError, CoreResult};
use crate::row::TrackedRow;
use crate::schema::Schema;
use crate::stats::EngineStats;
use crate::tracking::Tracker;
use relsync_codec::{RowKey, Value};
use relsync_storage::RowCursor;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

/// Reads cursors into cached instances.
///
/// A materializer is cheap to create and holds no per-cursor state; each
/// [`Materializer::read`] call classifies its own cursor.
#[derive(Debug, Clone, Copy)]
pub struct Materializer<'a> {
    schema: &'a Schema,
    caches: &'a CacheRegistry,
    stats: &'a EngineStats,
}

enum Applied {
    Fresh(Arc<TrackedRow>),
    Updated(Arc<TrackedRow>, usize),
    Stale(Arc<TrackedRow>),
}

impl<'a> Materializer<'a> {
    /// Creates a materializer over a schema and its caches.
    #[must_use]
    pub fn new(schema: &'a Schema, caches: &'a CacheRegistry, stats: &'a EngineStats) -> Self {
        Self {
            schema,
            caches,
            stats,
        }
    }

    /// Reads every remaining row of `cursor`.
    ///
    /// The cursor is closed when the read ends, including on cancellation.
    ///
    /// # Errors
    ///
    /// Returns driver errors, and [`CoreError::UnknownDiscriminator`] for a
    /// discriminator value with no registered item type.
    pub fn read(
        &self,
        source: &QuerySource,
        cursor: &mut dyn RowCursor,
        mut options: ReadOptions,
    ) -> CoreResult<ReadOutcome> {
        let result = self.stream(source, cursor, &mut options);
        cursor.close();
        result
    }

    fn stream(
        &self,
        source: &QuerySource,
        cursor: &mut dyn RowCursor,
        options: &mut ReadOptions,
    ) -> CoreResult<ReadOutcome> {
        let mut outcome = ReadOutcome::default();
        let mut shape = cursor.shape_version();
        let mut segments = classify(self.schema, source, cursor)?;
        let mut done = 0u64;

        loop {
            if options.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                debug!(rows = done, "read cancelled");
                self.stats.record_cancel();
                outcome.cancelled = true;
                break;
            }
            if !cursor.advance()? {
                break;
            }
            if cursor.shape_version() != shape {
                shape = cursor.shape_version();
                segments = classify(self.schema, source, cursor)?;
                debug!(shape, segments = segments.len(), "cursor shape changed");
            }

            let mut row = Vec::with_capacity(segments.len());
            for segment in &segments {
                row.push(self.materialize(segment, &*cursor, options, &mut outcome)?);
            }
            outcome.rows.push(row);

            done += 1;
            if let (Some(progress), Some(expected)) = (options.progress.as_mut(), options.expected_rows) {
                progress(done, expected);
            }
        }
        Ok(outcome)
    }

    fn materialize(
        &self,
        segment: &Segment,
        cursor: &dyn RowCursor,
        options: &mut ReadOptions,
        outcome: &mut ReadOutcome,
    ) -> CoreResult<Option<Arc<TrackedRow>>> {
        let table = &segment.table;
        let key = match segment.primary_key {
            Some(physical) => match RowKey::from_value(&cursor.value(physical)?) {
                Some(key) => Some(key),
                None => return Ok(None),
            },
            None => None,
        };
        let item_type = self.item_type(segment, cursor)?;
        let assignments = Self::assignments(segment, cursor, item_type)?;
        let row_stamp = segment.stamp.map(|p| cursor.value(p)).transpose()?;

        let key = match key {
            Some(key) if options.attach => key,
            _ => {
                // Detached read, or no key column to identify the row by.
                let row = Arc::new(TrackedRow::with_tracker(
                    Arc::clone(table),
                    item_type,
                    Tracker::actual(),
                ));
                row.apply_loaded(assignments, false);
                self.stats.record_materialized();
                outcome.applied += 1;
                return Ok(Some(row));
            }
        };

        let cache = self.caches.get(table.name())?;
        let applied = {
            let _apply = cache.apply_lock();
            // Attached instances resolve before pending ones; only a pending
            // instance is filled as fresh.
            let (row, _) = cache.begin_download(&key, item_type);
            if row.is_attached() {
                if Self::is_stale(row.stamp(), row_stamp.as_ref()) {
                    Applied::Stale(row)
                } else {
                    let protected = row.apply_loaded(assignments, true);
                    Applied::Updated(row, protected)
                }
            } else {
                let ordinals: Vec<usize> = assignments.iter().map(|(o, _)| *o).collect();
                row.apply_loaded(assignments, false);
                match cache.complete_download(&key) {
                    Some(attached) if Arc::ptr_eq(&attached, &row) => Applied::Fresh(attached),
                    // Another instance was attached while this one was pending.
                    Some(cached) if Self::is_stale(cached.stamp(), row_stamp.as_ref()) => {
                        Applied::Stale(cached)
                    }
                    Some(cached) => {
                        let loaded = ordinals.into_iter().map(|o| (o, row.get_at(o)));
                        let protected = cached.apply_loaded(loaded, true);
                        Applied::Updated(cached, protected)
                    }
                    None => Applied::Fresh(row),
                }
            }
        };

        match applied {
            Applied::Fresh(row) => {
                trace!(table = %table.name(), %key, "instance attached");
                self.stats.record_materialized();
                self.stats.record_attach();
                outcome.applied += 1;
                Ok(Some(row))
            }
            Applied::Updated(row, protected) => {
                if protected > 0 {
                    debug!(table = %table.name(), %key, protected, "kept local edits");
                    self.stats.record_protected(protected as u64);
                    outcome.protected_fields += protected as u64;
                }
                self.stats.record_materialized();
                outcome.applied += 1;
                Ok(Some(row))
            }
            Applied::Stale(row) => {
                let stale = StaleRow {
                    table: table.name().to_string(),
                    key,
                    cached_stamp: row.stamp().unwrap_or(Value::Null),
                    row_stamp: row_stamp.unwrap_or(Value::Null),
                };
                trace!(table = %stale.table, key = %stale.key, "stale row skipped");
                self.stats.record_stale_skip();
                outcome.skipped_stale += 1;
                if let Some(callback) = options.on_conflict.as_mut() {
                    callback(&stale);
                }
                Ok(Some(row))
            }
        }
    }

    /// A row is stale unless its stamp is strictly newer than the cached one.
    /// Without stamps on both sides there is nothing to compare and the row
    /// is applied.
    fn is_stale(cached: Option<Value>, incoming: Option<&Value>) -> bool {
        match (cached, incoming) {
            (Some(cached), Some(incoming)) if !cached.is_null() && !incoming.is_null() => {
                incoming.compare(&cached) != Some(Ordering::Greater)
            }
            _ => false,
        }
    }

    fn item_type(&self, segment: &Segment, cursor: &dyn RowCursor) -> CoreResult<i64> {
        let Some(physical) = segment.discriminator else {
            return Ok(0);
        };
        let value = cursor.value(physical)?;
        let discriminator = match &value {
            Value::Null => return Ok(0),
            Value::Integer(n) => *n,
            Value::Text(s) => s.trim().parse().map_err(|_| CoreError::UnknownDiscriminator {
                table: segment.table.name().to_string(),
                value: s.clone(),
            })?,
            other => {
                return Err(CoreError::UnknownDiscriminator {
                    table: segment.table.name().to_string(),
                    value: format!("{other:?}"),
                })
            }
        };
        if segment.table.item_type(discriminator).is_none() {
            return Err(CoreError::UnknownDiscriminator {
                table: segment.table.name().to_string(),
                value: discriminator.to_string(),
            });
        }
        Ok(discriminator)
    }

    fn assignments(
        segment: &Segment,
        cursor: &dyn RowCursor,
        item_type: i64,
    ) -> CoreResult<Vec<(usize, Value)>> {
        let columns = segment.table.columns();
        let kind = segment.table.item_type(item_type);
        let mut out = Vec::with_capacity(segment.columns.len());
        for &(physical, ordinal) in &segment.columns {
            let column = &columns[ordinal];
            let keyed = Some(ordinal) == segment.table.primary_key_ordinal()
                || Some(ordinal) == segment.table.discriminator_ordinal();
            if !keyed && kind.is_some_and(|k| !k.uses(&column.name)) {
                continue;
            }
            out.push((ordinal, cursor.value(physical)?));
        }
        Ok(out)
    }
}
