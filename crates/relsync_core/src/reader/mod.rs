//! Result materialization.
//!
//! A [`Materializer`] turns a forward-only [`RowCursor`](relsync_storage::RowCursor)
//! into cached [`TrackedRow`] instances:
//!
//! 1. The cursor's columns are grouped into segments, one per
//!    (table, alias) run, each with its primary-key, stamp and
//!    discriminator columns located.
//! 2. Each row yields one instance per segment: the cached one when the key
//!    is known, otherwise a new instance of the item type the discriminator
//!    selects. A null key yields no instance.
//! 3. A cached instance is only overwritten by a row whose stamp is strictly
//!    newer, and fields with unsaved local edits are never overwritten.
//!
//! Segments are rebuilt whenever the cursor reports a new shape.

mod materializer;
mod segment;

pub use materializer::Materializer;

use crate::row::TrackedRow;
use relsync_codec::{RowKey, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One table appearing in a query, optionally under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Table name.
    pub table: String,
    /// Alias used to qualify its columns.
    pub alias: Option<String>,
}

/// Tables a query reads, in the order their columns appear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySource {
    entries: Vec<SourceEntry>,
}

impl QuerySource {
    /// A query over one table.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            entries: vec![SourceEntry {
                table: table.into(),
                alias: None,
            }],
        }
    }

    /// Adds a table under an alias.
    #[must_use]
    pub fn join(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.entries.push(SourceEntry {
            table: table.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Adds a table without an alias.
    #[must_use]
    pub fn join_table(mut self, table: impl Into<String>) -> Self {
        self.entries.push(SourceEntry {
            table: table.into(),
            alias: None,
        });
        self
    }

    /// Source entries in order.
    #[must_use]
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Entry a column qualifier refers to: an alias first, then an
    /// unaliased table name, then any entry of that table.
    #[must_use]
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<&SourceEntry> {
        self.entries
            .iter()
            .find(|e| e.alias.as_deref() == Some(qualifier))
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.alias.is_none() && e.table == qualifier)
            })
            .or_else(|| self.entries.iter().find(|e| e.table == qualifier))
    }
}

/// Cooperative cancellation flag shared between a reader and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A cached instance that was not overwritten because the incoming row was
/// not newer.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleRow {
    /// Table name.
    pub table: String,
    /// Primary key.
    pub key: RowKey,
    /// Stamp of the cached instance.
    pub cached_stamp: Value,
    /// Stamp of the skipped row.
    pub row_stamp: Value,
}

type ProgressFn = Box<dyn FnMut(u64, u64) + Send>;
type ConflictFn = Box<dyn FnMut(&StaleRow) + Send>;

/// Options of one materialization.
pub struct ReadOptions {
    pub(crate) attach: bool,
    pub(crate) expected_rows: Option<u64>,
    pub(crate) progress: Option<ProgressFn>,
    pub(crate) cancel: Option<CancelToken>,
    pub(crate) on_conflict: Option<ConflictFn>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            attach: true,
            expected_rows: None,
            progress: None,
            cancel: None,
            on_conflict: None,
        }
    }
}

impl ReadOptions {
    /// Attaching read with no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces fresh instances that are neither taken from nor added to
    /// the cache.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.attach = false;
        self
    }

    /// Reports progress: after each row `progress` is called with the rows
    /// done so far and `expected_rows`.
    #[must_use]
    pub fn with_progress(
        mut self,
        expected_rows: u64,
        progress: impl FnMut(u64, u64) + Send + 'static,
    ) -> Self {
        self.expected_rows = Some(expected_rows);
        self.progress = Some(Box::new(progress));
        self
    }

    /// Stops between rows once `token` is cancelled.
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Called for every row skipped as stale.
    #[must_use]
    pub fn on_conflict(mut self, callback: impl FnMut(&StaleRow) + Send + 'static) -> Self {
        self.on_conflict = Some(Box::new(callback));
        self
    }

    /// Returns true if instances are attached.
    #[must_use]
    pub fn attaches(&self) -> bool {
        self.attach
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("attach", &self.attach)
            .field("expected_rows", &self.expected_rows)
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .field("on_conflict", &self.on_conflict.is_some())
            .finish()
    }
}

/// Instances of one cursor row, one slot per segment.
pub type MaterializedRow = Vec<Option<Arc<TrackedRow>>>;

/// Result of a materialization.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    /// One entry per cursor row read.
    pub rows: Vec<MaterializedRow>,
    /// Instances whose values were applied.
    pub applied: u64,
    /// Instances left unchanged because the row was stale.
    pub skipped_stale: u64,
    /// Fields left unchanged because of local edits.
    pub protected_fields: u64,
    /// True if the read stopped early on cancellation.
    pub cancelled: bool,
}

impl ReadOutcome {
    /// Non-null instances of the first segment, in row order.
    #[must_use]
    pub fn primary(&self) -> Vec<Arc<TrackedRow>> {
        self.column(0)
    }

    /// Non-null instances of segment `index`, in row order.
    #[must_use]
    pub fn column(&self, index: usize) -> Vec<Arc<TrackedRow>> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index).cloned().flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_resolution_prefers_alias() {
        let source = QuerySource::table("person")
            .join("team", "person")
            .join_table("team");
        assert_eq!(source.resolve_qualifier("person").unwrap().table, "team");
        assert_eq!(source.resolve_qualifier("team").unwrap().alias, None);
        assert!(source.resolve_qualifier("x").is_none());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
