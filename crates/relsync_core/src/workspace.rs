//! Workspace facade.

use crate::cache::{CacheRegistry, TableCache};
use crate::change_buffer::{ChangeBuffer, ChangeEntry, ChangeOperation};
use crate::command::{bind, CommandBuilder};
use crate::config::{Config, WireOptions};
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphReader, GraphWriter};
use crate::reader::{Materializer, QuerySource, ReadOptions, ReadOutcome};
use crate::row::TrackedRow;
use crate::schema::{ColumnRoles, DataType, Schema, TableSchema};
use crate::stats::EngineStats;
use crate::tracking::RowStatus;
use relsync_codec::{RowKey, Value};
use relsync_storage::{
    BlobProvider, BlobRecord, DbTransaction, FileBlobProvider, LargeObjectProvider, RowCursor,
    TableBlobProvider,
};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// The engine's context object.
///
/// A `Workspace` owns the schema, one identity cache per table, the change
/// buffer and the statistics. Everything that reads or writes tracked rows
/// goes through it, so two workspaces never share instances.
///
/// ```rust,ignore
/// use relsync_core::{Config, Schema, Workspace};
///
/// let workspace = Workspace::new(Schema::from_json(&json)?, Config::default());
/// let row = workspace.create_row("department", 0)?;
/// row.set("name", "Research")?;
///
/// let mut txn = driver.begin()?;
/// workspace.save(&row, txn.as_mut())?;
/// txn.commit()?;
/// ```
pub struct Workspace {
    schema: Arc<Schema>,
    config: Config,
    caches: CacheRegistry,
    changes: ChangeBuffer,
    stats: EngineStats,
}

impl Workspace {
    /// Creates a workspace with empty caches.
    #[must_use]
    pub fn new(schema: impl Into<Arc<Schema>>, config: Config) -> Self {
        let schema = schema.into();
        let caches = CacheRegistry::new(&schema);
        info!(
            tables = schema.tables().len(),
            dialect = %config.dialect,
            "workspace created"
        );
        Self {
            changes: ChangeBuffer::new(config.change_buffer_capacity),
            schema,
            config,
            caches,
            stats: EngineStats::new(),
        }
    }

    /// Schema.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Statistics.
    #[must_use]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Committed changes.
    #[must_use]
    pub fn changes(&self) -> &ChangeBuffer {
        &self.changes
    }

    /// Identity cache of a table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] if the table is not in the schema.
    pub fn table(&self, name: &str) -> CoreResult<&Arc<TableCache>> {
        self.caches.get(name)
    }

    /// Creates an unattached new row of the given item type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] or
    /// [`CoreError::UnknownDiscriminator`].
    pub fn create_row(&self, table: &str, item_type: i64) -> CoreResult<Arc<TrackedRow>> {
        let table = self.schema.require_table(table)?;
        if table.item_type(item_type).is_none() {
            return Err(CoreError::UnknownDiscriminator {
                table: table.name().to_string(),
                value: item_type.to_string(),
            });
        }
        Ok(Arc::new(TrackedRow::new(Arc::clone(table), item_type)))
    }

    /// Command builder for a table in the configured dialect.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] if the table is not in the schema.
    pub fn commands(&self, table: &str) -> CoreResult<CommandBuilder<'_>> {
        let table = self.schema.require_table(table)?;
        Ok(CommandBuilder::new(table, self.config.dialect.dialect()))
    }

    /// Materializes a cursor into this workspace's caches.
    ///
    /// # Errors
    ///
    /// See [`Materializer::read`].
    pub fn read(
        &self,
        source: &QuerySource,
        cursor: &mut dyn RowCursor,
        options: ReadOptions,
    ) -> CoreResult<ReadOutcome> {
        Materializer::new(&self.schema, &self.caches, &self.stats).read(source, cursor, options)
    }

    /// Selects one row by key and materializes it.
    ///
    /// A key pending download is completed by the load.
    ///
    /// # Errors
    ///
    /// Returns an error if the table has no primary key or the driver fails.
    pub fn load(
        &self,
        table: &str,
        key: &RowKey,
        txn: &mut dyn DbTransaction,
    ) -> CoreResult<Option<Arc<TrackedRow>>> {
        let mut select = self.commands(table)?.select(true)?;
        if let Some(parameter) = select.parameters.first_mut() {
            parameter.value = key.to_value();
        }
        let mut cursor = txn.query(&select)?;
        self.stats.record_command();
        let outcome = self.read(&QuerySource::table(table), cursor.as_mut(), ReadOptions::new())?;
        Ok(outcome.primary().into_iter().next())
    }

    /// Writes a row's pending changes.
    ///
    /// New rows are inserted (taking a generated or sequence key when the
    /// key is null), edited rows update their changed columns. The stamp
    /// column is advanced, the row is accepted and attached, and a change
    /// entry is recorded. Returns false if there was nothing to write.
    ///
    /// If another instance is already cached under the row's key, the row
    /// stays detached and the cached instance takes the saved values, with
    /// its own unsaved edits protected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for rows being loaded or with
    /// tracking suspended, or whose stamp cannot advance, and propagates
    /// synthesis and driver errors. A failed write leaves the stamp as it
    /// was.
    pub fn save(&self, row: &Arc<TrackedRow>, txn: &mut dyn DbTransaction) -> CoreResult<bool> {
        let table = Arc::clone(row.table());
        let operation = match row.status() {
            RowStatus::Actual => return Ok(false),
            RowStatus::Load | RowStatus::Suspend => {
                return Err(CoreError::invalid_operation(format!(
                    "cannot save {} row of {} in {:?} state",
                    row.key().map_or_else(|| "new".to_string(), |k| k.to_string()),
                    table.name(),
                    row.status()
                )))
            }
            RowStatus::New => {
                let previous = self.prepare_insert(row, &table)?;
                self.insert(row, &table, txn)
                    .map_err(|err| restore_stamp(row, &table, previous, err))?;
                ChangeOperation::Insert
            }
            RowStatus::Edit => {
                let previous = advance_stamp(row, &table)?;
                self.update(row, &table, txn)
                    .map_err(|err| restore_stamp(row, &table, previous, err))?;
                ChangeOperation::Update
            }
        };
        self.stats.record_command();
        row.accept();

        if let Some(key) = row.key() {
            let was_attached = row.is_attached();
            let cached = self.caches.get(table.name())?.attach(Arc::clone(row))?;
            if !Arc::ptr_eq(&cached, row) {
                let protected = cached.apply_loaded(row.values().into_iter().enumerate(), true);
                if protected > 0 {
                    self.stats.record_protected(protected as u64);
                }
                debug!(table = table.name(), %key, protected, "saved values merged into cached instance");
            } else if !was_attached {
                self.stats.record_attach();
            }
            debug!(table = table.name(), %key, %operation, "saved");
            self.changes
                .push(ChangeEntry::new(table.name(), row.item_type(), operation, key));
        }
        Ok(true)
    }

    /// Deletes a row by key and detaches it.
    ///
    /// Returns true if the backend reported a deleted row.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] for tables without a primary
    /// key, [`CoreError::InvalidOperation`] for rows without a key value.
    pub fn delete(&self, row: &TrackedRow, txn: &mut dyn DbTransaction) -> CoreResult<bool> {
        let table = row.table();
        let mut command = self
            .commands(table.name())?
            .delete()?
            .ok_or_else(|| CoreError::missing_primary_key(table.name()))?;
        let key = row.key().ok_or_else(|| {
            CoreError::invalid_operation(format!("row of {} has no key to delete", table.name()))
        })?;
        bind(&mut command, row)?;
        let affected = txn.execute(&command)?;
        self.stats.record_command();

        self.caches.get(table.name())?.remove(&key);
        debug!(table = table.name(), %key, affected, "deleted");
        self.changes.push(ChangeEntry::new(
            table.name(),
            row.item_type(),
            ChangeOperation::Delete,
            key,
        ));
        Ok(affected > 0)
    }

    /// Graph writer for one serialization operation.
    ///
    /// `None` uses the configured defaults.
    #[must_use]
    pub fn writer(&self, options: Option<WireOptions>) -> GraphWriter<'_> {
        let options = options.unwrap_or_else(|| self.config.wire_options());
        GraphWriter::new(&self.schema, &self.caches, &self.stats, options)
    }

    /// Graph reader over this workspace's caches.
    #[must_use]
    pub fn reader(&self) -> GraphReader<'_> {
        GraphReader::new(&self.schema, &self.caches, &self.stats)
    }

    /// Applies remote changes.
    ///
    /// Deleted keys are detached. Inserted and updated keys are marked
    /// pending download (or kept, if cached) and returned once each, in
    /// order, so the caller can fetch them with [`Workspace::load`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] or
    /// [`CoreError::UnknownDiscriminator`] for entries this schema cannot
    /// hold. Entries before the failing one stay applied.
    pub fn apply_changes(&self, entries: &[ChangeEntry]) -> CoreResult<Vec<(String, RowKey)>> {
        let mut fetch: Vec<(String, RowKey)> = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            let cache = self.caches.get(&entry.table)?;
            match entry.operation {
                ChangeOperation::Delete => {
                    cache.remove(&entry.key);
                    cache.abandon_download(&entry.key);
                    seen.remove(&(entry.table.clone(), entry.key.clone()));
                    fetch.retain(|(t, k)| !(t == &entry.table && k == &entry.key));
                }
                ChangeOperation::Insert | ChangeOperation::Update => {
                    if cache.table().item_type(entry.discriminator).is_none() {
                        return Err(CoreError::UnknownDiscriminator {
                            table: entry.table.clone(),
                            value: entry.discriminator.to_string(),
                        });
                    }
                    cache.begin_download(&entry.key, entry.discriminator);
                    if seen.insert((entry.table.clone(), entry.key.clone())) {
                        fetch.push((entry.table.clone(), entry.key.clone()));
                    }
                }
            }
        }
        debug!(entries = entries.len(), fetch = fetch.len(), "applied remote changes");
        Ok(fetch)
    }

    /// Filesystem blob provider using the configured chunk size.
    #[must_use]
    pub fn file_blobs(&self, root: &Path) -> FileBlobProvider {
        FileBlobProvider::new(root).with_chunk_size(self.config.blob_chunk_size)
    }

    /// Blob-column provider whose commands use the configured dialect.
    #[must_use]
    pub fn table_blobs(&self, table: &str) -> TableBlobProvider {
        TableBlobProvider::new(table).with_placeholders(self.config.dialect.dialect().placeholders())
    }

    /// Large-object provider, staging writes under `staging` if given.
    #[must_use]
    pub fn large_object_blobs(&self, staging: Option<&Path>) -> LargeObjectProvider {
        let provider = LargeObjectProvider::new().with_chunk_size(self.config.blob_chunk_size);
        match staging {
            Some(dir) => provider.with_staging(dir),
            None => provider,
        }
    }

    /// Stores a payload under a newly allocated id.
    ///
    /// # Errors
    ///
    /// Propagates provider errors; nothing is retried.
    pub fn store_blob(
        &self,
        provider: &dyn BlobProvider,
        reader: &mut dyn Read,
        txn: &mut dyn DbTransaction,
    ) -> CoreResult<BlobRecord> {
        let id = provider.allocate_id(txn)?;
        let record = provider.write(id, reader, txn)?;
        self.stats.record_blob_write(record.size);
        debug!(id, size = record.size, checksum = %record.checksum_hex(), "stored blob");
        Ok(record)
    }

    fn prepare_insert(&self, row: &TrackedRow, table: &TableSchema) -> CoreResult<Option<Value>> {
        if let Some(ordinal) = table.discriminator_ordinal() {
            if row.get_at(ordinal).is_null() {
                row.set(&table.columns()[ordinal].name, row.item_type())?;
            }
        }
        advance_stamp(row, table)
    }

    fn insert(
        &self,
        row: &TrackedRow,
        table: &TableSchema,
        txn: &mut dyn DbTransaction,
    ) -> CoreResult<()> {
        let builder = self.commands(table.name())?;
        let pk = table.primary_key();

        if let Some(pk) = pk.filter(|pk| pk.has(ColumnRoles::GENERATED)) {
            let mut command = builder.insert_generated(None)?;
            bind(&mut command, row)?;
            let mut cursor = txn.query(&command)?;
            let generated = if cursor.advance()? {
                cursor.value(0)?
            } else {
                Value::Null
            };
            cursor.close();
            if generated.is_null() {
                return Err(CoreError::invalid_operation(format!(
                    "insert into {} returned no key",
                    table.name()
                )));
            }
            row.set(&pk.name, generated)?;
            return Ok(());
        }

        if let Some(pk) = pk {
            if row.get(&pk.name)?.is_null() {
                let next = txn.next_sequence(&format!("{}_seq", table.name()))?;
                row.set(&pk.name, next)?;
            }
        }
        let mut command = builder.insert(None)?;
        bind(&mut command, row)?;
        txn.execute(&command)?;
        Ok(())
    }

    fn update(
        &self,
        row: &TrackedRow,
        table: &TableSchema,
        txn: &mut dyn DbTransaction,
    ) -> CoreResult<()> {
        let ledger = row.ledger();
        let columns: Vec<&str> = ledger.keys().map(String::as_str).collect();
        let mut command = self.commands(table.name())?.update(Some(&columns))?;
        bind(&mut command, row)?;
        // A changed key is addressed by its original value.
        if let Some(pk) = table.primary_key() {
            if let (Some(original), Some(parameter)) =
                (ledger.get(&pk.name), command.parameter_mut(&pk.name))
            {
                parameter.value = original.clone();
            }
        }
        txn.execute(&command)?;
        Ok(())
    }
}

/// Moves the stamp column forward: timestamps to now (strictly later than
/// the previous stamp), integers by one. Returns the previous stamp.
fn advance_stamp(row: &TrackedRow, table: &TableSchema) -> CoreResult<Option<Value>> {
    let Some(ordinal) = table.stamp_ordinal() else {
        return Ok(None);
    };
    let column = &table.columns()[ordinal];
    let current = row.get_at(ordinal);
    let exhausted = || {
        CoreError::invalid_operation(format!(
            "stamp {}.{} cannot advance past {current:?}",
            table.name(),
            column.name
        ))
    };
    let next = match column.data_type {
        DataType::Date | DataType::DateTime => {
            let floor = match current.as_timestamp() {
                Some(t) => t.checked_add(1).ok_or_else(exhausted)?,
                None => i64::MIN,
            };
            Value::Timestamp(now_micros().max(floor))
        }
        _ => match current.as_integer() {
            Some(n) => Value::Integer(n.checked_add(1).ok_or_else(exhausted)?),
            None => Value::Integer(1),
        },
    };
    row.set(&column.name, next)?;
    Ok(Some(current))
}

/// Puts the stamp back after a failed write and passes the error on.
fn restore_stamp(
    row: &TrackedRow,
    table: &TableSchema,
    previous: Option<Value>,
    err: CoreError,
) -> CoreError {
    if let (Some(previous), Some(ordinal)) = (previous, table.stamp_ordinal()) {
        if let Err(restore) = row.set(&table.columns()[ordinal].name, previous) {
            debug!(table = table.name(), error = %restore, "stamp not restored");
        }
    }
    err
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("tables", &self.schema.tables().len())
            .field("config", &self.config)
            .field("changes", &self.changes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ItemType};
    use relsync_storage::{DbCommand, Driver, MemoryCursor, MemoryDriver, StorageError, StorageResult};

    /// Transaction whose commands all fail.
    struct RejectingTxn;

    impl DbTransaction for RejectingTxn {
        fn execute(&mut self, _command: &DbCommand) -> StorageResult<u64> {
            Err(StorageError::driver("rejected"))
        }

        fn query(&mut self, _command: &DbCommand) -> StorageResult<Box<dyn RowCursor>> {
            Err(StorageError::driver("rejected"))
        }

        fn next_sequence(&mut self, _name: &str) -> StorageResult<i64> {
            Err(StorageError::driver("rejected"))
        }

        fn commit(self: Box<Self>) -> StorageResult<()> {
            Ok(())
        }

        fn rollback(self: Box<Self>) -> StorageResult<()> {
            Ok(())
        }
    }

    fn schema() -> Schema {
        let department = TableSchema::builder("department")
            .column(
                Column::new("id", DataType::Long)
                    .roles(ColumnRoles::PRIMARY_KEY | ColumnRoles::GENERATED),
            )
            .column(Column::new("name", DataType::String))
            .column(Column::new("code", DataType::String))
            .column(Column::new("version", DataType::Long).roles(ColumnRoles::STAMP))
            .build()
            .unwrap();
        let tag = TableSchema::builder("tag")
            .column(Column::new("id", DataType::Long).roles(ColumnRoles::PRIMARY_KEY))
            .column(Column::new("label", DataType::String))
            .column(Column::new("kind", DataType::Int).roles(ColumnRoles::TYPE_DISCRIMINATOR))
            .column(Column::new("touched", DataType::DateTime).roles(ColumnRoles::STAMP))
            .item_type(ItemType::new(0, "tag"))
            .item_type(ItemType::new(2, "label"))
            .build()
            .unwrap();
        Schema::builder().table(department).table(tag).build().unwrap()
    }

    fn setup() -> (Workspace, MemoryDriver) {
        let driver = MemoryDriver::new();
        driver.create_table("department", &["id", "name", "code", "version"]);
        driver.create_table("tag", &["id", "label", "kind", "touched"]);
        (Workspace::new(schema(), Config::default()), driver)
    }

    #[test]
    fn insert_takes_generated_key() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("name", "Research").unwrap();
        row.set("code", "RD").unwrap();

        let mut txn = driver.begin().unwrap();
        assert!(workspace.save(&row, txn.as_mut()).unwrap());
        txn.commit().unwrap();

        assert_eq!(row.key(), Some(RowKey::Integer(1)));
        assert_eq!(row.get("version").unwrap(), Value::Integer(1));
        assert_eq!(row.status(), RowStatus::Actual);
        assert!(row.is_attached());
        assert_eq!(driver.row_count("department"), 1);

        let insert = &driver.executed()[0];
        assert_eq!(insert.parameter_columns().collect::<Vec<_>>(), vec!["name", "code", "version"]);

        let changes = workspace.changes().entries();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].operation, ChangeOperation::Insert);
        assert_eq!(workspace.stats().commands_executed(), 1);
    }

    #[test]
    fn update_writes_changed_columns() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("name", "Research").unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&row, txn.as_mut()).unwrap();

        assert!(!workspace.save(&row, txn.as_mut()).unwrap());

        row.set("code", "RD").unwrap();
        assert!(workspace.save(&row, txn.as_mut()).unwrap());
        txn.commit().unwrap();

        let update = driver.executed().pop().unwrap();
        assert_eq!(update.parameter_columns().collect::<Vec<_>>(), vec!["code", "version", "id"]);
        assert_eq!(row.get("version").unwrap(), Value::Integer(2));
        assert_eq!(driver.rows("department")[0]["code"], Value::from("RD"));
        assert_eq!(workspace.changes().len(), 2);
    }

    #[test]
    fn explicit_keys_come_from_sequences() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("tag", 2).unwrap();
        row.set("label", "red").unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&row, txn.as_mut()).unwrap();
        txn.commit().unwrap();

        assert_eq!(row.key(), Some(RowKey::Integer(1)));
        assert_eq!(row.get("kind").unwrap(), Value::Integer(2));
        assert!(row.get("touched").unwrap().as_timestamp().is_some());
        assert_eq!(workspace.changes().entries()[0].discriminator, 2);
    }

    #[test]
    fn timestamp_stamps_always_advance() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("tag", 0).unwrap();
        row.set("id", 5i64).unwrap();
        row.set("touched", Value::Timestamp(i64::MAX - 10)).unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&row, txn.as_mut()).unwrap();
        assert_eq!(row.get("touched").unwrap(), Value::Timestamp(i64::MAX - 9));
    }

    #[test]
    fn delete_detaches_and_records() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("name", "Research").unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&row, txn.as_mut()).unwrap();

        assert!(workspace.delete(&row, txn.as_mut()).unwrap());
        txn.commit().unwrap();
        assert!(!row.is_attached());
        assert!(workspace.table("department").unwrap().is_empty());
        assert_eq!(driver.row_count("department"), 0);
        assert_eq!(
            workspace.changes().entries()[1].operation,
            ChangeOperation::Delete
        );

        let unsaved = workspace.create_row("department", 0).unwrap();
        let mut txn = driver.begin().unwrap();
        assert!(matches!(
            workspace.delete(&unsaved, txn.as_mut()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn load_completes_pending_keys() {
        let (workspace, driver) = setup();
        driver.seed_row(
            "department",
            &[("id", Value::Integer(7)), ("name", "Legal".into()), ("version", Value::Integer(3))],
        );

        let fetch = workspace
            .apply_changes(&[
                ChangeEntry::new("department", 0, ChangeOperation::Update, RowKey::Integer(7)),
                ChangeEntry::new("department", 0, ChangeOperation::Update, RowKey::Integer(7)),
            ])
            .unwrap();
        assert_eq!(fetch, vec![("department".to_string(), RowKey::Integer(7))]);
        let cache = workspace.table("department").unwrap();
        let pending = cache.pending(&RowKey::Integer(7)).unwrap();

        let mut txn = driver.begin().unwrap();
        let loaded = workspace
            .load("department", &RowKey::Integer(7), txn.as_mut())
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&loaded, &pending));
        assert!(loaded.is_attached());
        assert_eq!(loaded.get("name").unwrap(), Value::from("Legal"));
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn apply_changes_detaches_deletes() {
        let (workspace, _driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("id", 3i64).unwrap();
        let cache = workspace.table("department").unwrap();
        cache.attach(Arc::clone(&row)).unwrap();

        let fetch = workspace
            .apply_changes(&[
                ChangeEntry::new("department", 0, ChangeOperation::Update, RowKey::Integer(4)),
                ChangeEntry::new("department", 0, ChangeOperation::Delete, RowKey::Integer(3)),
                ChangeEntry::new("department", 0, ChangeOperation::Delete, RowKey::Integer(4)),
            ])
            .unwrap();
        assert!(fetch.is_empty());
        assert!(cache.is_empty());
        assert_eq!(cache.pending_len(), 0);
        assert!(!row.is_attached());

        assert!(matches!(
            workspace.apply_changes(&[ChangeEntry::new(
                "department",
                5,
                ChangeOperation::Insert,
                RowKey::Integer(1)
            )]),
            Err(CoreError::UnknownDiscriminator { .. })
        ));
    }

    #[test]
    fn blobs_use_configured_providers() {
        let (workspace, driver) = setup();
        let dir = tempfile::tempdir().unwrap();
        let files = workspace.file_blobs(dir.path());
        let mut txn = driver.begin().unwrap();

        let record = workspace
            .store_blob(&files, &mut &b"payload"[..], txn.as_mut())
            .unwrap();
        assert_eq!(record.size, 7);
        assert!(files.path_for(record.id).exists());

        let objects = workspace.large_object_blobs(None);
        let record = workspace
            .store_blob(&objects, &mut &b"xyz"[..], txn.as_mut())
            .unwrap();
        let mut back = Vec::new();
        objects.read(record.id, txn.as_mut()).unwrap().read_to_end(&mut back).unwrap();
        assert_eq!(back, b"xyz");

        assert_eq!(workspace.stats().blobs_written(), 2);
        assert_eq!(workspace.stats().blob_bytes_written(), 10);
        assert_eq!(workspace.table_blobs("file_data").table(), "file_data");
    }

    #[test]
    fn suspended_rows_cannot_be_saved() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.suspend();
        let mut txn = driver.begin().unwrap();
        assert!(matches!(
            workspace.save(&row, txn.as_mut()),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn failed_update_keeps_the_stamp() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("name", "Research").unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&row, txn.as_mut()).unwrap();
        txn.commit().unwrap();

        row.set("code", "RD").unwrap();
        let err = workspace.save(&row, &mut RejectingTxn).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(row.get("version").unwrap(), Value::Integer(1));
        assert!(!row.is_dirty("version"));
        assert_eq!(row.ledger().len(), 1);
        assert_eq!(row.status(), RowStatus::Edit);
        assert_eq!(workspace.changes().len(), 1);

        let mut txn = driver.begin().unwrap();
        assert!(workspace.save(&row, txn.as_mut()).unwrap());
        assert_eq!(row.get("version").unwrap(), Value::Integer(2));
    }

    #[test]
    fn exhausted_stamps_are_rejected() {
        let (workspace, driver) = setup();
        let row = workspace.create_row("department", 0).unwrap();
        row.set("name", "Research").unwrap();
        row.set("version", i64::MAX).unwrap();

        let mut txn = driver.begin().unwrap();
        assert!(matches!(
            workspace.save(&row, txn.as_mut()),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(driver.executed().is_empty());
        assert_eq!(row.get("version").unwrap(), Value::Integer(i64::MAX));
        assert!(workspace.changes().is_empty());
    }

    #[test]
    fn saving_a_detached_copy_updates_the_cached_instance() {
        let (workspace, driver) = setup();
        let cached = workspace.create_row("department", 0).unwrap();
        cached.set("name", "Research").unwrap();
        let mut txn = driver.begin().unwrap();
        workspace.save(&cached, txn.as_mut()).unwrap();

        let mut cursor = MemoryCursor::new(
            &["id", "name", "code", "version"],
            vec![vec![Value::Integer(1), Value::from("Research"), Value::Null, Value::Integer(1)]],
        );
        let copy = Arc::clone(
            &workspace
                .read(&QuerySource::table("department"), &mut cursor, ReadOptions::new().detached())
                .unwrap()
                .primary()[0],
        );
        copy.set("code", "RD").unwrap();
        assert!(workspace.save(&copy, txn.as_mut()).unwrap());

        assert!(!copy.is_attached());
        assert!(Arc::ptr_eq(
            &workspace.table("department").unwrap().get(&RowKey::Integer(1)).unwrap(),
            &cached
        ));
        assert_eq!(cached.get("code").unwrap(), Value::from("RD"));
        assert_eq!(cached.get("version").unwrap(), Value::Integer(2));
        assert_eq!(cached.status(), RowStatus::Actual);
        assert_eq!(workspace.changes().len(), 2);
    }
}
