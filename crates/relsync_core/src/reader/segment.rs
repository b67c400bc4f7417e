//! Column classification of a cursor shape.

use super::QuerySource;
use crate::error::CoreResult;
use crate::schema::{Schema, TableSchema};
use relsync_storage::RowCursor;
use std::sync::Arc;
use tracing::{debug, trace};

/// Contiguous run of cursor columns that belong to one (table, alias).
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub table: Arc<TableSchema>,
    pub alias: Option<String>,
    pub primary_key: Option<usize>,
    pub stamp: Option<usize>,
    pub discriminator: Option<usize>,
    /// (cursor ordinal, table ordinal) pairs.
    pub columns: Vec<(usize, usize)>,
}

impl Segment {
    fn new(table: Arc<TableSchema>, alias: Option<String>) -> Self {
        Self {
            table,
            alias,
            primary_key: None,
            stamp: None,
            discriminator: None,
            columns: Vec::new(),
        }
    }

    fn push(&mut self, physical: usize, ordinal: usize) {
        if self.table.primary_key_ordinal() == Some(ordinal) {
            self.primary_key = Some(physical);
        }
        if self.table.stamp_ordinal() == Some(ordinal) {
            self.stamp = Some(physical);
        }
        if self.table.discriminator_ordinal() == Some(ordinal) {
            self.discriminator = Some(physical);
        }
        self.columns.push((physical, ordinal));
    }

    fn same_source(&self, table: &str, alias: Option<&str>) -> bool {
        self.table.name() == table && self.alias.as_deref() == alias
    }
}

/// Splits the current cursor shape into segments.
///
/// Column names may be qualified by table name or alias. Unqualified names
/// stay with the current segment when its table has the column, otherwise
/// they go to the first source table that has it. Columns no source table
/// has are ignored.
pub(crate) fn classify(
    schema: &Schema,
    source: &QuerySource,
    cursor: &dyn RowCursor,
) -> CoreResult<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();

    for physical in 0..cursor.column_count() {
        let name = cursor.column_name(physical);
        let resolved = match name.split_once('.') {
            Some((qualifier, column)) => source
                .resolve_qualifier(qualifier)
                .map(|entry| (entry.table.as_str(), entry.alias.as_deref(), column)),
            None => {
                let current = segments
                    .last()
                    .filter(|s| s.table.ordinal(name).is_some())
                    .map(|s| (s.table.name(), s.alias.as_deref()));
                match current {
                    Some((table, alias)) => Some((table, alias, name)),
                    None => source
                        .entries()
                        .iter()
                        .find(|e| {
                            schema
                                .table(&e.table)
                                .is_some_and(|t| t.ordinal(name).is_some())
                        })
                        .map(|e| (e.table.as_str(), e.alias.as_deref(), name)),
                }
            }
        };

        let Some((table_name, alias, column)) = resolved else {
            trace!(column = name, "column matches no source table");
            continue;
        };
        let table = schema.require_table(table_name)?;
        let Some(ordinal) = table.ordinal(column) else {
            trace!(column = name, table = table_name, "column not in table");
            continue;
        };

        let continues = segments
            .last()
            .is_some_and(|s| s.same_source(table_name, alias));
        if !continues {
            let alias = alias.map(str::to_string);
            segments.push(Segment::new(Arc::clone(table), alias));
        }
        if let Some(segment) = segments.last_mut() {
            segment.push(physical, ordinal);
        }
    }

    debug!(
        columns = cursor.column_count(),
        segments = segments.len(),
        "classified cursor shape"
    );
    Ok(segments)
}
