//! Change-tracked row instances.

use crate::error::{CoreError, CoreResult};
use crate::schema::{ItemType, TableSchema};
use crate::tracking::{Ledger, RowStatus, Tracker};
use parking_lot::RwLock;
use relsync_codec::{RowKey, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct RowState {
    values: Vec<Value>,
    item_type: i64,
    tracker: Tracker,
}

/// An in-memory row with change tracking.
///
/// Rows are shared as `Arc<TrackedRow>` between a table cache and its
/// readers; all mutation goes through an internal lock. Assignments through
/// [`TrackedRow::set`] are recorded in the ledger; assignments made while
/// loading are not.
pub struct TrackedRow {
    table: Arc<TableSchema>,
    state: RwLock<RowState>,
    attached: AtomicBool,
    pending: AtomicBool,
}

impl TrackedRow {
    /// Creates a locally new row of the given item type with all values null.
    #[must_use]
    pub fn new(table: Arc<TableSchema>, item_type: i64) -> Self {
        Self::with_tracker(table, item_type, Tracker::new())
    }

    pub(crate) fn with_tracker(table: Arc<TableSchema>, item_type: i64, tracker: Tracker) -> Self {
        let width = table.columns().len();
        Self {
            table,
            state: RwLock::new(RowState {
                values: vec![Value::Null; width],
                item_type,
                tracker,
            }),
            attached: AtomicBool::new(false),
            pending: AtomicBool::new(false),
        }
    }

    /// Table metadata.
    #[must_use]
    pub fn table(&self) -> &Arc<TableSchema> {
        &self.table
    }

    /// Table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    /// Discriminator of the row's item type.
    #[must_use]
    pub fn item_type(&self) -> i64 {
        self.state.read().item_type
    }

    /// The row's registered item type.
    #[must_use]
    pub fn item_type_info(&self) -> Option<&ItemType> {
        self.table.item_type(self.item_type())
    }

    /// Value of a column by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] if the table has no such column.
    pub fn get(&self, column: &str) -> CoreResult<Value> {
        let ordinal = self.table.require_ordinal(column)?;
        Ok(self.get_at(ordinal))
    }

    /// Value of a column by ordinal; `Null` when out of range.
    #[must_use]
    pub fn get_at(&self, ordinal: usize) -> Value {
        self.state
            .read()
            .values
            .get(ordinal)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.state.read().values.clone()
    }

    /// Assigns a column, recording the change.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] if the table has no such column.
    pub fn set(&self, column: &str, value: impl Into<Value>) -> CoreResult<()> {
        let ordinal = self.table.require_ordinal(column)?;
        self.set_at(ordinal, value.into());
        Ok(())
    }

    fn set_at(&self, ordinal: usize, value: Value) {
        let name = &self.table.columns()[ordinal].name;
        let mut state = self.state.write();
        let old = std::mem::replace(&mut state.values[ordinal], value);
        let new = state.values[ordinal].clone();
        state.tracker.record_change(name, &old, &new);
    }

    /// Primary-key value as a cache key; `None` if the table has no primary
    /// key or the value is null.
    #[must_use]
    pub fn key(&self) -> Option<RowKey> {
        let ordinal = self.table.primary_key_ordinal()?;
        RowKey::from_value(&self.get_at(ordinal))
    }

    /// Stamp value; `None` if the table has no stamp column.
    #[must_use]
    pub fn stamp(&self) -> Option<Value> {
        self.table.stamp_ordinal().map(|i| self.get_at(i))
    }

    /// Tracking status.
    #[must_use]
    pub fn status(&self) -> RowStatus {
        self.state.read().tracker.status()
    }

    /// Original values of changed fields.
    #[must_use]
    pub fn ledger(&self) -> Ledger {
        self.state.read().tracker.ledger().clone()
    }

    /// Returns true if `column` has an unsaved change.
    #[must_use]
    pub fn is_dirty(&self, column: &str) -> bool {
        self.state.read().tracker.is_dirty(column)
    }

    /// Returns true if the row is in a table cache.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::Release);
    }

    /// Returns true if the row is known only by key and waits for its
    /// values.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn set_pending(&self, pending: bool) {
        self.pending.store(pending, Ordering::Release);
    }

    /// Applies loaded values without recording them.
    ///
    /// With `protect`, columns with unsaved local edits keep their local
    /// value. Returns the number of columns skipped that way.
    pub fn apply_loaded<I>(&self, assignments: I, protect: bool) -> usize
    where
        I: IntoIterator<Item = (usize, Value)>,
    {
        let mut state = self.state.write();
        state.tracker.begin_load();
        let mut protected = 0;
        for (ordinal, value) in assignments {
            let Some(column) = self.table.columns().get(ordinal) else {
                continue;
            };
            if protect && state.tracker.is_protected(&column.name) {
                protected += 1;
                continue;
            }
            state.values[ordinal] = value;
        }
        state.tracker.end_load();
        protected
    }

    /// Switches the row to another registered item type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownDiscriminator`] if the type is not
    /// registered.
    pub fn set_item_type(&self, discriminator: i64) -> CoreResult<()> {
        if self.table.item_type(discriminator).is_none() {
            return Err(CoreError::UnknownDiscriminator {
                table: self.table.name().to_string(),
                value: discriminator.to_string(),
            });
        }
        self.state.write().item_type = discriminator;
        Ok(())
    }

    /// Marks a successful write-back.
    pub fn accept(&self) {
        self.state.write().tracker.accept();
    }

    /// Discards unsaved changes, restoring the original values.
    pub fn reject(&self) {
        let mut state = self.state.write();
        let originals = state.tracker.reject();
        for (column, value) in originals {
            if let Some(ordinal) = self.table.ordinal(&column) {
                state.values[ordinal] = value;
            }
        }
    }

    /// Turns change tracking off.
    pub fn suspend(&self) {
        self.state.write().tracker.suspend();
    }

    /// Turns change tracking back on.
    pub fn resume(&self) {
        self.state.write().tracker.resume();
    }
}

impl fmt::Debug for TrackedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TrackedRow")
            .field("table", &self.table.name())
            .field("item_type", &state.item_type)
            .field("status", &state.tracker.status())
            .field("values", &state.values)
            .field("attached", &self.is_attached())
            .finish()
    }
}
