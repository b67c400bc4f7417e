//! Driver boundary.
//!
//! The engine never talks to a database directly. It builds [`DbCommand`]s
//! and hands them to a [`DbTransaction`] obtained from a [`Driver`]; query
//! results come back as forward-only [`RowCursor`]s.
//!
//! A command carries both its dialect-specific text and a structured
//! description (kind, table, key column, parameter columns). Real drivers
//! execute the text; [`MemoryDriver`](crate::MemoryDriver) interprets the
//! structure.

use crate::error::StorageResult;
use relsync_codec::Value;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// Native transport type of a parameter or result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// Boolean / bit.
    Boolean,
    /// 8-bit integer.
    TinyInt,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Single-precision float.
    Real,
    /// Double-precision float.
    Double,
    /// Exact numeric.
    Decimal,
    /// Length-limited character data.
    VarChar,
    /// Unlimited character data.
    Text,
    /// Binary data.
    Binary,
    /// Calendar date.
    Date,
    /// Date and time.
    Timestamp,
    /// Time span.
    Interval,
    /// 128-bit identifier.
    Guid,
}

/// Placeholder syntax used in command text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?`
    Question,
    /// `@name`
    AtName,
}

impl PlaceholderStyle {
    /// Renders the placeholder for the parameter at `index` (zero-based).
    #[must_use]
    pub fn render(self, index: usize, name: &str) -> String {
        match self {
            PlaceholderStyle::Dollar => format!("${}", index + 1),
            PlaceholderStyle::Question => "?".to_string(),
            PlaceholderStyle::AtName => format!("@{name}"),
        }
    }
}

/// One bound parameter of a command.
#[derive(Debug, Clone, PartialEq)]
pub struct DbParameter {
    /// Parameter name (without placeholder sigil).
    pub name: String,
    /// Column the parameter reads from or writes to.
    pub column: String,
    /// Native transport type.
    pub native_type: NativeType,
    /// Declared size (0 when unbounded).
    pub size: u32,
    /// Bound value; `Null` until bound.
    pub value: Value,
}

impl DbParameter {
    /// Creates an unbound parameter named after its column.
    #[must_use]
    pub fn new(column: impl Into<String>, native_type: NativeType) -> Self {
        let column = column.into();
        Self {
            name: column.clone(),
            column,
            native_type,
            size: 0,
            value: Value::Null,
        }
    }

    /// Sets the declared size.
    #[must_use]
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Binds a value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }
}

/// What a command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Insert with all key values supplied by the caller.
    Insert,
    /// Insert that lets the backend generate the key and returns it.
    InsertGenerated,
    /// Update by primary key.
    Update,
    /// Delete by primary key.
    Delete,
    /// Select, optionally filtered by parameters.
    Select,
    /// Stored-procedure call.
    Procedure,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Insert => "insert",
            CommandKind::InsertGenerated => "insert-generated",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Select => "select",
            CommandKind::Procedure => "procedure",
        };
        f.write_str(name)
    }
}

/// A parametrized command ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct DbCommand {
    /// Command kind.
    pub kind: CommandKind,
    /// Target table (or procedure name for [`CommandKind::Procedure`]).
    pub table: String,
    /// Dialect-specific command text.
    pub text: String,
    /// Ordered parameters.
    pub parameters: Vec<DbParameter>,
    /// Primary-key column, when the command addresses rows by key.
    pub key_column: Option<String>,
    /// Projected columns of a select (empty selects every column).
    pub columns: Vec<String>,
}

impl DbCommand {
    /// Creates a command with no parameters.
    #[must_use]
    pub fn new(kind: CommandKind, table: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            text: text.into(),
            parameters: Vec::new(),
            key_column: None,
            columns: Vec::new(),
        }
    }

    /// Returns the parameter bound to `column`, if any.
    #[must_use]
    pub fn parameter(&self, column: &str) -> Option<&DbParameter> {
        self.parameters.iter().find(|p| p.column == column)
    }

    /// Returns the mutable parameter bound to `column`, if any.
    pub fn parameter_mut(&mut self, column: &str) -> Option<&mut DbParameter> {
        self.parameters.iter_mut().find(|p| p.column == column)
    }

    /// Parameter column names in order.
    pub fn parameter_columns(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.column.as_str())
    }
}

/// A forward-only result cursor.
///
/// Cursors are consumed by a single producer. The column set may change
/// while streaming (for example when a batch of a multi-result query
/// begins); [`RowCursor::shape_version`] changes whenever it does.
pub trait RowCursor: Send {
    /// Number of columns in the current shape.
    fn column_count(&self) -> usize;

    /// Name of the column at `ordinal`.
    fn column_name(&self, ordinal: usize) -> &str;

    /// Native type of the column at `ordinal`, when the driver knows it.
    fn column_type(&self, ordinal: usize) -> Option<NativeType>;

    /// Moves to the next row. Returns `false` when the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails while fetching.
    fn advance(&mut self) -> StorageResult<bool>;

    /// Value of the column at `ordinal` in the current row.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no current row or the ordinal is out of
    /// range.
    fn value(&self, ordinal: usize) -> StorageResult<Value>;

    /// Counter that changes whenever the column set changes.
    fn shape_version(&self) -> u64 {
        0
    }

    /// Releases driver resources. Further `advance` calls return `false`.
    fn close(&mut self) {}
}

/// Large-object API of a driver.
pub trait LargeObjects {
    /// Creates an empty large object.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`](crate::StorageError) if `oid`
    /// is taken.
    fn create(&mut self, oid: u64) -> StorageResult<()>;

    /// Opens an existing large object for writing from offset 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist.
    fn open_write(&mut self, oid: u64) -> StorageResult<Box<dyn Write + '_>>;

    /// Opens a large object for reading from offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError) if the object
    /// does not exist.
    fn open_read(&mut self, oid: u64) -> StorageResult<Box<dyn Read + Send>>;

    /// Creates a large object from a server-visible file. Returns its size.
    ///
    /// # Errors
    ///
    /// Returns an error if `oid` is taken or the file cannot be read.
    fn import(&mut self, oid: u64, path: &Path) -> StorageResult<u64>;

    /// Removes a large object. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails.
    fn unlink(&mut self, oid: u64) -> StorageResult<bool>;
}

/// An open database transaction.
pub trait DbTransaction: Send {
    /// Executes a non-query command. Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the command.
    fn execute(&mut self, command: &DbCommand) -> StorageResult<u64>;

    /// Executes a command that returns rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the command.
    fn query(&mut self, command: &DbCommand) -> StorageResult<Box<dyn RowCursor>>;

    /// Draws the next value of a named sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence cannot be advanced.
    fn next_sequence(&mut self, name: &str) -> StorageResult<i64>;

    /// The driver's large-object API, if it has one.
    fn large_objects(&mut self) -> Option<&mut dyn LargeObjects> {
        None
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails.
    fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// A database driver.
pub trait Driver: Send + Sync {
    /// Short driver name used in logs.
    fn name(&self) -> &str;

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction can be started.
    fn begin(&self) -> StorageResult<Box<dyn DbTransaction>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_styles() {
        assert_eq!(PlaceholderStyle::Dollar.render(0, "id"), "$1");
        assert_eq!(PlaceholderStyle::Question.render(3, "id"), "?");
        assert_eq!(PlaceholderStyle::AtName.render(1, "name"), "@name");
    }

    #[test]
    fn parameter_lookup_by_column() {
        let mut command = DbCommand::new(CommandKind::Update, "t", "UPDATE t");
        command.parameters.push(DbParameter::new("name", NativeType::Text));
        command
            .parameters
            .push(DbParameter::new("id", NativeType::BigInt).with_value(7i64));

        assert_eq!(command.parameter("id").unwrap().value, Value::Integer(7));
        assert!(command.parameter("missing").is_none());
        command.parameter_mut("name").unwrap().value = Value::from("x");
        assert_eq!(
            command.parameter_columns().collect::<Vec<_>>(),
            vec!["name", "id"]
        );
    }
}
