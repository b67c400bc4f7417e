//! In-memory driver for testing.

use crate::driver::{
    CommandKind, DbCommand, DbParameter, DbTransaction, Driver, LargeObjects, NativeType,
    RowCursor,
};
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use relsync_codec::Value;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// A stored procedure registered with [`MemoryDriver::register_procedure`].
pub type Procedure = Arc<dyn Fn(&[DbParameter]) -> StorageResult<u64> + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<HashMap<String, Value>>,
}

impl MemoryTable {
    fn note_columns<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        for name in names {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
    }

    fn next_generated_id(&self, key_column: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|row| row.get(key_column).and_then(Value::as_integer))
            .max()
            .map_or(1, |max| max + 1)
    }

    fn matches(row: &HashMap<String, Value>, filters: &[(&str, &Value)]) -> bool {
        filters
            .iter()
            .all(|(column, value)| row.get(*column).unwrap_or(&Value::Null) == *value)
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    large_objects: HashMap<u64, Vec<u8>>,
}

/// An in-memory driver.
///
/// Commands are interpreted from their structured description rather than
/// their text: inserts store a row built from the parameters, updates and
/// deletes match the key column, selects filter on every bound parameter.
/// Tables are created on first insert.
///
/// Each transaction works on a snapshot taken at `begin` and publishes it on
/// commit, so concurrent writers resolve as last-commit-wins. Sequences are
/// not transactional, as in most databases.
///
/// Clones share the same state.
///
/// # Example
///
/// ```rust
/// use relsync_storage::{CommandKind, DbCommand, DbParameter, Driver, MemoryDriver, NativeType};
///
/// let driver = MemoryDriver::new();
/// let mut txn = driver.begin().unwrap();
/// let mut insert = DbCommand::new(CommandKind::Insert, "t", "INSERT ...");
/// insert.parameters.push(DbParameter::new("id", NativeType::BigInt).with_value(1i64));
/// assert_eq!(txn.execute(&insert).unwrap(), 1);
/// txn.commit().unwrap();
/// assert_eq!(driver.row_count("t"), 1);
/// ```
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<RwLock<MemoryState>>,
    sequences: Arc<Mutex<HashMap<String, i64>>>,
    procedures: Arc<RwLock<HashMap<String, Procedure>>>,
    executed: Arc<Mutex<Vec<DbCommand>>>,
}

impl MemoryDriver {
    /// Creates an empty driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table and its column order ahead of the first insert.
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let mut state = self.state.write();
        let table = state.tables.entry(name.to_string()).or_default();
        table.note_columns(columns.iter().copied());
    }

    /// Inserts a committed row directly, bypassing transactions.
    pub fn seed_row(&self, table: &str, row: &[(&str, Value)]) {
        let mut state = self.state.write();
        let table = state.tables.entry(table.to_string()).or_default();
        table.note_columns(row.iter().map(|(c, _)| *c));
        table
            .rows
            .push(row.iter().map(|(c, v)| ((*c).to_string(), v.clone())).collect());
    }

    /// Registers a stored procedure.
    pub fn register_procedure(
        &self,
        name: &str,
        procedure: impl Fn(&[DbParameter]) -> StorageResult<u64> + Send + Sync + 'static,
    ) {
        self.procedures
            .write()
            .insert(name.to_string(), Arc::new(procedure));
    }

    /// Returns a snapshot of the committed rows of a table.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<HashMap<String, Value>> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Returns the number of committed rows in a table.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.state.read().tables.get(table).map_or(0, |t| t.rows.len())
    }

    /// Returns the committed content of a large object.
    #[must_use]
    pub fn large_object(&self, oid: u64) -> Option<Vec<u8>> {
        self.state.read().large_objects.get(&oid).cloned()
    }

    /// Returns every command executed so far, committed or not.
    #[must_use]
    pub fn executed(&self) -> Vec<DbCommand> {
        self.executed.lock().clone()
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDriver")
            .field("tables", &self.state.read().tables.len())
            .field("executed", &self.executed.lock().len())
            .finish_non_exhaustive()
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn begin(&self) -> StorageResult<Box<dyn DbTransaction>> {
        Ok(Box::new(MemoryTransaction {
            working: self.state.read().clone(),
            driver: self.clone(),
        }))
    }
}

struct MemoryTransaction {
    driver: MemoryDriver,
    working: MemoryState,
}

impl MemoryTransaction {
    fn key_of<'c>(command: &'c DbCommand) -> StorageResult<(&'c str, &'c Value)> {
        let key_column = command.key_column.as_deref().ok_or_else(|| {
            StorageError::driver(format!("{} on {} has no key column", command.kind, command.table))
        })?;
        let key = command.parameter(key_column).ok_or_else(|| {
            StorageError::driver(format!(
                "{} on {} has no parameter for key {key_column}",
                command.kind, command.table
            ))
        })?;
        Ok((key_column, &key.value))
    }

    fn insert(&mut self, command: &DbCommand, generated: bool) -> StorageResult<Option<i64>> {
        let table = self.working.tables.entry(command.table.clone()).or_default();
        let mut row: HashMap<String, Value> = command
            .parameters
            .iter()
            .map(|p| (p.column.clone(), p.value.clone()))
            .collect();

        let mut generated_id = None;
        if let Some(key_column) = command.key_column.as_deref() {
            if generated {
                let id = table.next_generated_id(key_column);
                row.insert(key_column.to_string(), Value::Integer(id));
                generated_id = Some(id);
            } else if let Some(key) = row.get(key_column).filter(|v| !v.is_null()) {
                if table.rows.iter().any(|r| r.get(key_column) == Some(key)) {
                    return Err(StorageError::already_exists(format!(
                        "{}.{key_column} = {key:?}",
                        command.table
                    )));
                }
            }
            table.note_columns(std::iter::once(key_column));
        }

        table.note_columns(command.parameter_columns());
        table.rows.push(row);
        Ok(generated_id)
    }

    fn update(&mut self, command: &DbCommand) -> StorageResult<u64> {
        let (key_column, key) = Self::key_of(command)?;
        let Some(table) = self.working.tables.get_mut(&command.table) else {
            return Ok(0);
        };
        table.note_columns(command.parameter_columns());
        let mut affected = 0;
        for row in table
            .rows
            .iter_mut()
            .filter(|r| r.get(key_column) == Some(key))
        {
            for param in command.parameters.iter().filter(|p| p.column != key_column) {
                row.insert(param.column.clone(), param.value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    fn delete(&mut self, command: &DbCommand) -> StorageResult<u64> {
        let (key_column, key) = Self::key_of(command)?;
        let Some(table) = self.working.tables.get_mut(&command.table) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|r| r.get(key_column) != Some(key));
        Ok((before - table.rows.len()) as u64)
    }

    fn select(&self, command: &DbCommand) -> MemoryCursor {
        let table = self.working.tables.get(&command.table);
        let columns: Vec<String> = if command.columns.is_empty() {
            table.map(|t| t.columns.clone()).unwrap_or_default()
        } else {
            command.columns.clone()
        };
        let filters: Vec<(&str, &Value)> = command
            .parameters
            .iter()
            .map(|p| (p.column.as_str(), &p.value))
            .collect();

        let rows: Vec<Vec<Value>> = table
            .into_iter()
            .flat_map(|t| t.rows.iter())
            .filter(|row| MemoryTable::matches(row, &filters))
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
        MemoryCursor::new(&names, rows)
    }

    fn call(&self, command: &DbCommand) -> StorageResult<u64> {
        let procedure = self
            .driver
            .procedures
            .read()
            .get(&command.table)
            .cloned()
            .ok_or_else(|| StorageError::driver(format!("unknown procedure {}", command.table)))?;
        procedure(&command.parameters)
    }
}

impl DbTransaction for MemoryTransaction {
    fn execute(&mut self, command: &DbCommand) -> StorageResult<u64> {
        trace!(kind = %command.kind, table = %command.table, "memory execute");
        self.driver.executed.lock().push(command.clone());
        match command.kind {
            CommandKind::Insert => self.insert(command, false).map(|_| 1),
            CommandKind::InsertGenerated => self.insert(command, true).map(|_| 1),
            CommandKind::Update => self.update(command),
            CommandKind::Delete => self.delete(command),
            CommandKind::Procedure => self.call(command),
            CommandKind::Select => Err(StorageError::driver("select must be run with query")),
        }
    }

    fn query(&mut self, command: &DbCommand) -> StorageResult<Box<dyn RowCursor>> {
        trace!(kind = %command.kind, table = %command.table, "memory query");
        self.driver.executed.lock().push(command.clone());
        match command.kind {
            CommandKind::Select => Ok(Box::new(self.select(command))),
            CommandKind::InsertGenerated => {
                let id = self.insert(command, true)?;
                let key_column = command.key_column.as_deref().unwrap_or("id");
                let row = vec![id.map_or(Value::Null, Value::Integer)];
                Ok(Box::new(MemoryCursor::new(&[key_column], vec![row])))
            }
            other => Err(StorageError::driver(format!("{other} does not return rows"))),
        }
    }

    fn next_sequence(&mut self, name: &str) -> StorageResult<i64> {
        let mut sequences = self.driver.sequences.lock();
        let value = sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    fn large_objects(&mut self) -> Option<&mut dyn LargeObjects> {
        Some(&mut self.working)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        *self.driver.state.write() = self.working;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

impl LargeObjects for MemoryState {
    fn create(&mut self, oid: u64) -> StorageResult<()> {
        if self.large_objects.contains_key(&oid) {
            return Err(StorageError::already_exists(format!("large object {oid}")));
        }
        self.large_objects.insert(oid, Vec::new());
        Ok(())
    }

    fn open_write(&mut self, oid: u64) -> StorageResult<Box<dyn Write + '_>> {
        let data = self
            .large_objects
            .get_mut(&oid)
            .ok_or_else(|| StorageError::not_found(format!("large object {oid}")))?;
        data.clear();
        Ok(Box::new(data))
    }

    fn open_read(&mut self, oid: u64) -> StorageResult<Box<dyn Read + Send>> {
        let data = self
            .large_objects
            .get(&oid)
            .ok_or_else(|| StorageError::not_found(format!("large object {oid}")))?;
        Ok(Box::new(Cursor::new(data.clone())))
    }

    fn import(&mut self, oid: u64, path: &Path) -> StorageResult<u64> {
        if self.large_objects.contains_key(&oid) {
            return Err(StorageError::already_exists(format!("large object {oid}")));
        }
        let data = std::fs::read(path)?;
        let size = data.len() as u64;
        self.large_objects.insert(oid, data);
        Ok(size)
    }

    fn unlink(&mut self, oid: u64) -> StorageResult<bool> {
        Ok(self.large_objects.remove(&oid).is_some())
    }
}

struct Batch {
    columns: Vec<String>,
    types: Vec<Option<NativeType>>,
    rows: VecDeque<Vec<Value>>,
}

/// A cursor over rows held in memory.
///
/// Additional batches appended with [`MemoryCursor::then`] change the column
/// set mid-stream, bumping [`RowCursor::shape_version`].
pub struct MemoryCursor {
    batches: VecDeque<Batch>,
    current: Option<Vec<Value>>,
    shape_version: u64,
    closed: bool,
}

impl MemoryCursor {
    /// Creates a cursor over `rows` with the given column names.
    #[must_use]
    pub fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let mut cursor = Self {
            batches: VecDeque::new(),
            current: None,
            shape_version: 0,
            closed: false,
        };
        cursor.push_batch(columns, rows);
        cursor
    }

    /// Appends a batch with a different column set.
    #[must_use]
    pub fn then(mut self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.push_batch(columns, rows);
        self
    }

    /// Declares native column types for the first batch.
    #[must_use]
    pub fn with_types(mut self, types: &[NativeType]) -> Self {
        if let Some(batch) = self.batches.front_mut() {
            batch.types = types.iter().copied().map(Some).collect();
        }
        self
    }

    fn push_batch(&mut self, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.batches.push_back(Batch {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            types: vec![None; columns.len()],
            rows: rows.into(),
        });
    }
}

impl RowCursor for MemoryCursor {
    fn column_count(&self) -> usize {
        self.batches.front().map_or(0, |b| b.columns.len())
    }

    fn column_name(&self, ordinal: usize) -> &str {
        self.batches
            .front()
            .and_then(|b| b.columns.get(ordinal))
            .map_or("", String::as_str)
    }

    fn column_type(&self, ordinal: usize) -> Option<NativeType> {
        self.batches
            .front()
            .and_then(|b| b.types.get(ordinal).copied().flatten())
    }

    fn advance(&mut self) -> StorageResult<bool> {
        if self.closed {
            return Ok(false);
        }
        loop {
            let Some(batch) = self.batches.front_mut() else {
                self.current = None;
                return Ok(false);
            };
            if let Some(row) = batch.rows.pop_front() {
                self.current = Some(row);
                return Ok(true);
            }
            if self.batches.len() == 1 {
                self.current = None;
                return Ok(false);
            }
            self.batches.pop_front();
            self.shape_version += 1;
        }
    }

    fn value(&self, ordinal: usize) -> StorageResult<Value> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| StorageError::driver("cursor has no current row"))?;
        row.get(ordinal)
            .cloned()
            .ok_or_else(|| StorageError::driver(format!("ordinal {ordinal} out of range")))
    }

    fn shape_version(&self) -> u64 {
        self.shape_version
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(column: &str, value: impl Into<Value>) -> DbParameter {
        DbParameter::new(column, NativeType::Text).with_value(value)
    }

    fn command(kind: CommandKind, params: Vec<DbParameter>) -> DbCommand {
        let mut cmd = DbCommand::new(kind, "person", "");
        cmd.key_column = Some("id".to_string());
        cmd.parameters = params;
        cmd
    }

    #[test]
    fn insert_update_delete_cycle() {
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();
        txn.execute(&command(
            CommandKind::Insert,
            vec![param("id", 1i64), param("name", "Ann")],
        ))
        .unwrap();
        let updated = txn
            .execute(&command(
                CommandKind::Update,
                vec![param("name", "Anna"), param("id", 1i64)],
            ))
            .unwrap();
        assert_eq!(updated, 1);
        txn.commit().unwrap();
        assert_eq!(driver.rows("person")[0]["name"], Value::from("Anna"));

        let mut txn = driver.begin().unwrap();
        let deleted = txn
            .execute(&command(CommandKind::Delete, vec![param("id", 1i64)]))
            .unwrap();
        assert_eq!(deleted, 1);
        txn.commit().unwrap();
        assert_eq!(driver.row_count("person"), 0);
    }

    #[test]
    fn duplicate_key_insert_fails() {
        let driver = MemoryDriver::new();
        driver.seed_row("person", &[("id", Value::Integer(1))]);
        let mut txn = driver.begin().unwrap();
        let result = txn.execute(&command(CommandKind::Insert, vec![param("id", 1i64)]));
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn rollback_discards_changes() {
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();
        txn.execute(&command(CommandKind::Insert, vec![param("id", 1i64)]))
            .unwrap();
        txn.rollback().unwrap();
        assert_eq!(driver.row_count("person"), 0);
        assert_eq!(driver.executed().len(), 1);
    }

    #[test]
    fn generated_insert_returns_key() {
        let driver = MemoryDriver::new();
        driver.seed_row("person", &[("id", Value::Integer(41))]);
        let mut txn = driver.begin().unwrap();
        let mut cursor = txn
            .query(&command(CommandKind::InsertGenerated, vec![param("name", "B")]))
            .unwrap();
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.column_name(0), "id");
        assert_eq!(cursor.value(0).unwrap(), Value::Integer(42));
    }

    #[test]
    fn select_filters_and_projects() {
        let driver = MemoryDriver::new();
        driver.create_table("person", &["id", "name"]);
        driver.seed_row("person", &[("id", Value::Integer(1)), ("name", Value::from("a"))]);
        driver.seed_row("person", &[("id", Value::Integer(2)), ("name", Value::from("b"))]);

        let mut txn = driver.begin().unwrap();
        let mut select = DbCommand::new(CommandKind::Select, "person", "");
        select.parameters.push(param("id", 2i64));
        let mut cursor = txn.query(&select).unwrap();
        assert_eq!(cursor.column_count(), 2);
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.value(1).unwrap(), Value::from("b"));
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn sequences_are_not_rolled_back() {
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();
        assert_eq!(txn.next_sequence("s").unwrap(), 1);
        txn.rollback().unwrap();
        let mut txn = driver.begin().unwrap();
        assert_eq!(txn.next_sequence("s").unwrap(), 2);
    }

    #[test]
    fn procedures_dispatch_by_name() {
        let driver = MemoryDriver::new();
        driver.register_procedure("touch", |params| Ok(params.len() as u64));
        let mut txn = driver.begin().unwrap();
        let mut call = DbCommand::new(CommandKind::Procedure, "touch", "CALL touch($1)");
        call.parameters.push(param("x", 1i64));
        assert_eq!(txn.execute(&call).unwrap(), 1);

        let unknown = DbCommand::new(CommandKind::Procedure, "nope", "");
        assert!(matches!(txn.execute(&unknown), Err(StorageError::Driver(_))));
    }

    #[test]
    fn large_object_lifecycle() {
        let driver = MemoryDriver::new();
        let mut txn = driver.begin().unwrap();
        {
            let lo = txn.large_objects().unwrap();
            lo.create(9).unwrap();
            assert!(matches!(lo.create(9), Err(StorageError::AlreadyExists(_))));
            lo.open_write(9).unwrap().write_all(b"payload").unwrap();
            let mut back = Vec::new();
            lo.open_read(9).unwrap().read_to_end(&mut back).unwrap();
            assert_eq!(back, b"payload");
        }
        txn.commit().unwrap();
        assert_eq!(driver.large_object(9).unwrap(), b"payload");

        let mut txn = driver.begin().unwrap();
        let lo = txn.large_objects().unwrap();
        assert!(lo.unlink(9).unwrap());
        assert!(!lo.unlink(9).unwrap());
    }

    #[test]
    fn cursor_batches_bump_shape_version() {
        let mut cursor = MemoryCursor::new(&["a"], vec![vec![Value::Integer(1)]])
            .then(&["a", "b"], vec![vec![Value::Integer(2), Value::Integer(3)]]);
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.shape_version(), 0);
        assert_eq!(cursor.column_count(), 1);
        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.shape_version(), 1);
        assert_eq!(cursor.column_name(1), "b");
        assert!(!cursor.advance().unwrap());
    }

    #[test]
    fn closed_cursor_stops() {
        let mut cursor = MemoryCursor::new(&["a"], vec![vec![Value::Null], vec![Value::Null]]);
        assert!(cursor.advance().unwrap());
        cursor.close();
        assert!(!cursor.advance().unwrap());
        assert!(cursor.value(0).is_err());
    }
}
