//! Per-table identity caches.

use crate::error::{CoreError, CoreResult};
use crate::row::TrackedRow;
use crate::schema::{Schema, TableSchema};
use parking_lot::{Mutex, MutexGuard, RwLock};
use relsync_codec::RowKey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Attached instances of one table, keyed by primary key.
///
/// At most one instance exists per key. Keys that are known but whose values
/// have not arrived yet live in a separate pending map until
/// [`TableCache::complete_download`].
pub struct TableCache {
    table: Arc<TableSchema>,
    rows: RwLock<HashMap<RowKey, Arc<TrackedRow>>>,
    // Lock order: pending, then rows.
    pending: Mutex<HashMap<RowKey, Arc<TrackedRow>>>,
    apply: Mutex<()>,
}

impl TableCache {
    /// Creates an empty cache for `table`.
    #[must_use]
    pub fn new(table: Arc<TableSchema>) -> Self {
        Self {
            table,
            rows: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            apply: Mutex::new(()),
        }
    }

    /// Table metadata.
    #[must_use]
    pub fn table(&self) -> &Arc<TableSchema> {
        &self.table
    }

    /// Attached instance for `key`.
    #[must_use]
    pub fn get(&self, key: &RowKey) -> Option<Arc<TrackedRow>> {
        self.rows.read().get(key).cloned()
    }

    /// Instance waiting for its values.
    #[must_use]
    pub fn pending(&self, key: &RowKey) -> Option<Arc<TrackedRow>> {
        self.pending.lock().get(key).cloned()
    }

    /// Attaches `row` under its key and returns the cached instance.
    ///
    /// If an instance with the same key is already attached, that instance
    /// is returned and `row` is left detached.
    ///
    /// # Errors
    ///
    /// Returns an error if the row belongs to another table or has no key.
    pub fn attach(&self, row: Arc<TrackedRow>) -> CoreResult<Arc<TrackedRow>> {
        if row.table_name() != self.table.name() {
            return Err(CoreError::invalid_operation(format!(
                "row of {} cannot be attached to {}",
                row.table_name(),
                self.table.name()
            )));
        }
        let key = row.key().ok_or_else(|| {
            CoreError::invalid_operation(format!("row of {} has no key", self.table.name()))
        })?;
        let mut rows = self.rows.write();
        let cached = rows.entry(key).or_insert_with(|| {
            row.set_attached(true);
            Arc::clone(&row)
        });
        Ok(Arc::clone(cached))
    }

    /// Detaches the instance for `key`.
    pub fn remove(&self, key: &RowKey) -> Option<Arc<TrackedRow>> {
        let removed = self.rows.write().remove(key);
        if let Some(row) = &removed {
            row.set_attached(false);
        }
        removed
    }

    /// Resolves `key` to an attached instance, or to the one instance
    /// pending download for it, creating that instance if needed.
    ///
    /// Returns the instance and whether it was created by this call.
    pub fn begin_download(&self, key: &RowKey, item_type: i64) -> (Arc<TrackedRow>, bool) {
        let mut pending = self.pending.lock();
        if let Some(row) = self.rows.read().get(key) {
            return (Arc::clone(row), false);
        }
        if let Some(row) = pending.get(key) {
            return (Arc::clone(row), false);
        }

        let row = Arc::new(TrackedRow::new(Arc::clone(&self.table), item_type));
        if let Some(pk) = self.table.primary_key_ordinal() {
            row.apply_loaded([(pk, key.to_value())], false);
        }
        row.set_pending(true);
        pending.insert(key.clone(), Arc::clone(&row));
        trace!(table = %self.table.name(), %key, "pending download");
        (row, true)
    }

    /// Moves a pending instance into the cache and returns the cached
    /// instance for `key`.
    ///
    /// An instance attached under the same key while the download was
    /// pending stays cached; the pending one is dropped and the attached
    /// one is returned.
    pub fn complete_download(&self, key: &RowKey) -> Option<Arc<TrackedRow>> {
        let mut pending = self.pending.lock();
        let row = pending.remove(key)?;
        row.set_pending(false);
        let mut rows = self.rows.write();
        let cached = rows.entry(key.clone()).or_insert_with(|| {
            row.set_attached(true);
            Arc::clone(&row)
        });
        Some(Arc::clone(cached))
    }

    /// Forgets a pending instance without attaching it.
    pub fn abandon_download(&self, key: &RowKey) -> Option<Arc<TrackedRow>> {
        let row = self.pending.lock().remove(key)?;
        row.set_pending(false);
        Some(row)
    }

    /// Attached instances, ordered by key.
    #[must_use]
    pub fn rows(&self) -> Vec<Arc<TrackedRow>> {
        let rows = self.rows.read();
        let mut keys: Vec<&RowKey> = rows.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| Arc::clone(&rows[k])).collect()
    }

    /// Keys pending download, ordered.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<RowKey> {
        let mut keys: Vec<RowKey> = self.pending.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of attached instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Number of instances pending download.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Lock held while one row's values are applied.
    pub fn apply_lock(&self) -> MutexGuard<'_, ()> {
        self.apply.lock()
    }
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache")
            .field("table", &self.table.name())
            .field("rows", &self.len())
            .field("pending", &self.pending_len())
            .finish()
    }
}

/// One [`TableCache`] per table of a schema.
#[derive(Debug)]
pub struct CacheRegistry {
    caches: HashMap<String, Arc<TableCache>>,
}

impl CacheRegistry {
    /// Creates empty caches for every table of `schema`.
    #[must_use]
    pub fn new(schema: &Schema) -> Self {
        let caches = schema
            .tables()
            .iter()
            .map(|t| (t.name().to_string(), Arc::new(TableCache::new(Arc::clone(t)))))
            .collect();
        Self { caches }
    }

    /// Cache of a table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] if the table is not in the schema.
    pub fn get(&self, table: &str) -> CoreResult<&Arc<TableCache>> {
        self.caches
            .get(table)
            .ok_or_else(|| CoreError::unknown_table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnRoles, DataType};
    use crate::tracking::RowStatus;
    use relsync_codec::Value;
    use std::thread;

    fn table() -> Arc<TableSchema> {
        Arc::new(
            TableSchema::builder("item")
                .column(Column::new("id", DataType::Long).roles(ColumnRoles::PRIMARY_KEY))
                .column(Column::new("label", DataType::String))
                .build()
                .unwrap(),
        )
    }

    fn keyed(table: &Arc<TableSchema>, id: i64) -> Arc<TrackedRow> {
        let row = Arc::new(TrackedRow::new(Arc::clone(table), 0));
        row.set("id", id).unwrap();
        row
    }

    #[test]
    fn attach_keeps_first_instance() {
        let cache = TableCache::new(table());
        let first = keyed(cache.table(), 1);
        let second = keyed(cache.table(), 1);

        let a = cache.attach(Arc::clone(&first)).unwrap();
        let b = cache.attach(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&a, &first));
        assert!(Arc::ptr_eq(&b, &first));
        assert!(first.is_attached());
        assert!(!second.is_attached());
        assert_eq!(cache.len(), 1);

        let removed = cache.remove(&RowKey::Integer(1)).unwrap();
        assert!(!removed.is_attached());
        assert!(cache.is_empty());
    }

    #[test]
    fn attach_requires_key() {
        let cache = TableCache::new(table());
        let row = Arc::new(TrackedRow::new(Arc::clone(cache.table()), 0));
        assert!(cache.attach(row).is_err());
    }

    #[test]
    fn download_is_deduplicated() {
        let cache = TableCache::new(table());
        let key = RowKey::Integer(5);

        let (a, created_a) = cache.begin_download(&key, 0);
        let (b, created_b) = cache.begin_download(&key, 0);
        assert!(created_a);
        assert!(!created_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_pending());
        assert_eq!(a.get("id").unwrap(), Value::Integer(5));
        assert_eq!(a.status(), RowStatus::Actual);
        assert_eq!(cache.pending_len(), 1);
        assert!(cache.get(&key).is_none());

        let done = cache.complete_download(&key).unwrap();
        assert!(Arc::ptr_eq(&done, &a));
        assert!(!done.is_pending());
        assert!(done.is_attached());
        assert_eq!(cache.pending_len(), 0);

        let (c, created_c) = cache.begin_download(&key, 0);
        assert!(!created_c);
        assert!(Arc::ptr_eq(&c, &a));
    }

    #[test]
    fn completed_download_yields_to_attached_instance() {
        let cache = TableCache::new(table());
        let key = RowKey::Integer(7);
        let (pending, _) = cache.begin_download(&key, 0);
        let saved = keyed(cache.table(), 7);
        cache.attach(Arc::clone(&saved)).unwrap();

        let done = cache.complete_download(&key).unwrap();
        assert!(Arc::ptr_eq(&done, &saved));
        assert!(!pending.is_pending());
        assert!(!pending.is_attached());
        assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &saved));
        assert_eq!(cache.pending_len(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_downloads_share_one_instance() {
        let cache = Arc::new(TableCache::new(table()));
        let key = RowKey::Integer(9);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                thread::spawn(move || cache.begin_download(&key, 0))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].0, &w[1].0)));
    }

    #[test]
    fn registry_rejects_unknown_tables() {
        let schema = Schema::builder()
            .table(TableSchema::clone(&table()))
            .build()
            .unwrap();
        let registry = CacheRegistry::new(&schema);
        assert!(registry.get("item").is_ok());
        assert!(matches!(registry.get("other"), Err(CoreError::UnknownTable { .. })));
    }

    #[test]
    fn rows_are_ordered_by_key() {
        let cache = TableCache::new(table());
        for id in [3, 1, 2] {
            cache.attach(keyed(cache.table(), id)).unwrap();
        }
        let keys: Vec<_> = cache.rows().iter().filter_map(|r| r.key()).collect();
        assert_eq!(keys, vec![RowKey::Integer(1), RowKey::Integer(2), RowKey::Integer(3)]);
    }
}
