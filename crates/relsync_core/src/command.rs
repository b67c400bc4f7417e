//! Command synthesis.
//!
//! Builds parametrized insert, update, delete, select and procedure commands
//! for a table from its column metadata. No I/O happens here.
//!
//! Parameter order is fixed:
//!
//! - insert: primary key first (explicit-id tables only), then every other
//!   writable column in declaration order
//! - update: writable non-key columns, then the primary key for `WHERE`
//! - delete and keyed select: the primary key only
//!
//! Computed columns are never written, and a generated primary key is left
//! to the backend.

use crate::dialect::Dialect;
use crate::error::{CoreError, CoreResult};
use crate::row::TrackedRow;
use crate::schema::{Column, ColumnRoles, DataType, TableSchema};
use relsync_storage::{CommandKind, DbCommand, DbParameter};

/// Synthesizes commands for one table in one dialect.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    table: &'a TableSchema,
    dialect: &'a dyn Dialect,
}

impl<'a> CommandBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(table: &'a TableSchema, dialect: &'a dyn Dialect) -> Self {
        Self { table, dialect }
    }

    /// Builds a write command of `kind`, optionally limited to a subset of
    /// columns.
    ///
    /// Returns `Ok(None)` for a delete on a table without a primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] for updates and generated
    /// inserts on tables without a primary key, [`CoreError::UnknownColumn`]
    /// for a subset naming a missing column, [`CoreError::UnmappedType`] for a
    /// column the dialect cannot type, and [`CoreError::InvalidOperation`] for
    /// select and procedure kinds, which have their own builders.
    pub fn build(&self, kind: CommandKind, subset: Option<&[&str]>) -> CoreResult<Option<DbCommand>> {
        match kind {
            CommandKind::Insert => self.insert(subset).map(Some),
            CommandKind::InsertGenerated => self.insert_generated(subset).map(Some),
            CommandKind::Update => self.update(subset).map(Some),
            CommandKind::Delete => self.delete(),
            CommandKind::Select | CommandKind::Procedure => Err(CoreError::invalid_operation(
                format!("{kind} commands are not built from a column subset"),
            )),
        }
    }

    /// Insert with caller-supplied key.
    ///
    /// # Errors
    ///
    /// See [`CommandBuilder::build`].
    pub fn insert(&self, subset: Option<&[&str]>) -> CoreResult<DbCommand> {
        let mut columns = Vec::new();
        if let Some(pk) = self.table.primary_key().filter(|pk| !pk.has(ColumnRoles::GENERATED)) {
            columns.push(pk);
        }
        columns.extend(self.writable(subset)?);

        let parameters = self.parameters(&columns)?;
        let (names, values) = self.lists(&parameters);
        let text = self
            .dialect
            .insert(&self.dialect.quote(self.table.name()), &names, &values);
        Ok(self.command(CommandKind::Insert, text, parameters))
    }

    /// Insert that returns the backend-generated key.
    ///
    /// # Errors
    ///
    /// See [`CommandBuilder::build`].
    pub fn insert_generated(&self, subset: Option<&[&str]>) -> CoreResult<DbCommand> {
        let pk = self.require_primary_key()?;
        let columns = self.writable(subset)?;
        let parameters = self.parameters(&columns)?;
        let (names, values) = self.lists(&parameters);
        let text = self.dialect.insert_returning(
            &self.dialect.quote(self.table.name()),
            &names,
            &values,
            &self.dialect.quote(&pk.name),
        );
        let mut command = self.command(CommandKind::InsertGenerated, text, parameters);
        command.columns = vec![pk.name.clone()];
        Ok(command)
    }

    /// Update by primary key.
    ///
    /// # Errors
    ///
    /// See [`CommandBuilder::build`].
    pub fn update(&self, subset: Option<&[&str]>) -> CoreResult<DbCommand> {
        let pk = self.require_primary_key()?;
        let mut columns = self.writable(subset)?;
        if columns.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "update of {} has no columns to set",
                self.table.name()
            )));
        }
        columns.push(pk);

        let parameters = self.parameters(&columns)?;
        let (names, values) = self.lists(&parameters);
        let split = names.len() - 1;
        let assignments: Vec<String> = names[..split]
            .iter()
            .zip(&values[..split])
            .map(|(n, v)| format!("{n} = {v}"))
            .collect();
        let text = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.dialect.quote(self.table.name()),
            assignments.join(", "),
            names[split],
            values[split]
        );
        Ok(self.command(CommandKind::Update, text, parameters))
    }

    /// Delete by primary key; `None` if the table has no primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnmappedType`] if the key type cannot be mapped.
    pub fn delete(&self) -> CoreResult<Option<DbCommand>> {
        let Some(pk) = self.table.primary_key() else {
            return Ok(None);
        };
        let parameters = self.parameters(&[pk])?;
        let (names, values) = self.lists(&parameters);
        let text = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.dialect.quote(self.table.name()),
            names[0],
            values[0]
        );
        Ok(Some(self.command(CommandKind::Delete, text, parameters)))
    }

    /// Select of every column, optionally filtered by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] for a keyed select on a table
    /// without a primary key.
    pub fn select(&self, by_key: bool) -> CoreResult<DbCommand> {
        let projection: Vec<String> = self
            .table
            .columns()
            .iter()
            .map(|c| self.dialect.quote(&c.name))
            .collect();
        let mut text = format!(
            "SELECT {} FROM {}",
            projection.join(", "),
            self.dialect.quote(self.table.name())
        );
        let mut parameters = Vec::new();
        if by_key {
            let pk = self.require_primary_key()?;
            parameters = self.parameters(&[pk])?;
            let (names, values) = self.lists(&parameters);
            text.push_str(&format!(" WHERE {} = {}", names[0], values[0]));
        }
        let mut command = self.command(CommandKind::Select, text, parameters);
        command.columns = self.table.columns().iter().map(|c| c.name.clone()).collect();
        Ok(command)
    }

    /// Stored-procedure call with named, typed parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the dialect has no
    /// procedures and [`CoreError::UnmappedType`] for an unmappable
    /// parameter type.
    pub fn procedure(&self, name: &str, params: &[(&str, DataType)]) -> CoreResult<DbCommand> {
        let parameters = params
            .iter()
            .map(|(param, data_type)| {
                let native = self.native(param, data_type)?;
                Ok(DbParameter::new(*param, native))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let (_, values) = self.lists(&parameters);
        let text = self.dialect.procedure_call(name, &values).ok_or_else(|| {
            CoreError::invalid_operation(format!("{} has no stored procedures", self.dialect.name()))
        })?;
        let mut command = DbCommand::new(CommandKind::Procedure, name, text);
        command.parameters = parameters;
        Ok(command)
    }

    fn require_primary_key(&self) -> CoreResult<&'a Column> {
        self.table
            .primary_key()
            .ok_or_else(|| CoreError::missing_primary_key(self.table.name()))
    }

    /// Writable non-key columns, in declaration order.
    fn writable(&self, subset: Option<&[&str]>) -> CoreResult<Vec<&'a Column>> {
        if let Some(subset) = subset {
            if let Some(missing) = subset.iter().find(|c| self.table.column(c).is_none()) {
                return Err(CoreError::unknown_column(self.table.name(), *missing));
            }
        }
        let pk = self.table.primary_key_ordinal();
        Ok(self
            .table
            .columns()
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != pk)
            .map(|(_, c)| c)
            .filter(|c| !c.has(ColumnRoles::COMPUTED))
            .filter(|c| subset.map_or(true, |s| s.contains(&c.name.as_str())))
            .collect())
    }

    fn native(&self, column: &str, data_type: &DataType) -> CoreResult<relsync_storage::NativeType> {
        self.dialect
            .native_type(data_type)
            .ok_or_else(|| CoreError::UnmappedType {
                dialect: self.dialect.name(),
                table: self.table.name().to_string(),
                column: column.to_string(),
                data_type: data_type.to_string(),
            })
    }

    fn parameters(&self, columns: &[&Column]) -> CoreResult<Vec<DbParameter>> {
        columns
            .iter()
            .map(|c| {
                let native = self.native(&c.name, &c.data_type)?;
                Ok(DbParameter::new(c.name.clone(), native).with_size(c.size))
            })
            .collect()
    }

    /// Quoted column names and placeholders of `parameters`.
    fn lists(&self, parameters: &[DbParameter]) -> (Vec<String>, Vec<String>) {
        let style = self.dialect.placeholders();
        parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (self.dialect.quote(&p.column), style.render(i, &p.name)))
            .unzip()
    }

    fn command(&self, kind: CommandKind, text: String, parameters: Vec<DbParameter>) -> DbCommand {
        let mut command = DbCommand::new(kind, self.table.name(), text);
        command.parameters = parameters;
        command.key_column = self.table.primary_key().map(|pk| pk.name.clone());
        command
    }
}

/// Fills a command's parameter values from a row, matching by column name.
///
/// # Errors
///
/// Returns [`CoreError::UnknownColumn`] if a parameter names a column the
/// row's table does not have.
pub fn bind(command: &mut DbCommand, row: &TrackedRow) -> CoreResult<()> {
    for parameter in &mut command.parameters {
        parameter.value = row.get(&parameter.column)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, SqlServer, Sqlite};
    use crate::schema::Constraint;
    use relsync_codec::Value;
    use relsync_storage::NativeType;
    use std::sync::Arc;

    fn department() -> TableSchema {
        TableSchema::builder("department")
            .column(
                Column::new("id", DataType::Long)
                    .roles(ColumnRoles::PRIMARY_KEY | ColumnRoles::GENERATED),
            )
            .column(Column::new("name", DataType::String).size(100))
            .column(Column::new("code", DataType::String).size(10))
            .column(Column::new("head_count", DataType::Int).roles(ColumnRoles::COMPUTED))
            .build()
            .unwrap()
    }

    fn columns(command: &DbCommand) -> Vec<&str> {
        command.parameter_columns().collect()
    }

    #[test]
    fn insert_omits_generated_key_and_computed_columns() {
        let table = department();
        let builder = CommandBuilder::new(&table, &Postgres);
        let insert = builder.insert(None).unwrap();
        assert_eq!(columns(&insert), vec!["name", "code"]);
        assert_eq!(
            insert.text,
            "INSERT INTO \"department\" (\"name\", \"code\") VALUES ($1, $2)"
        );
        assert_eq!(insert.parameter("name").unwrap().size, 100);
        assert_eq!(insert.parameter("name").unwrap().native_type, NativeType::VarChar);
    }

    #[test]
    fn update_puts_key_last() {
        let table = department();
        let update = CommandBuilder::new(&table, &Postgres).update(None).unwrap();
        assert_eq!(columns(&update), vec!["name", "code", "id"]);
        assert_eq!(
            update.text,
            "UPDATE \"department\" SET \"name\" = $1, \"code\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(update.key_column.as_deref(), Some("id"));
    }

    #[test]
    fn explicit_key_insert_puts_key_first() {
        let table = TableSchema::builder("country")
            .column(Column::new("name", DataType::String))
            .column(Column::new("iso", DataType::String).roles(ColumnRoles::PRIMARY_KEY))
            .build()
            .unwrap();
        let insert = CommandBuilder::new(&table, &Sqlite).insert(None).unwrap();
        assert_eq!(columns(&insert), vec!["iso", "name"]);
        assert_eq!(insert.text, "INSERT INTO \"country\" (\"iso\", \"name\") VALUES (?, ?)");
    }

    #[test]
    fn insert_generated_appends_dialect_clause() {
        let table = department();
        let insert = CommandBuilder::new(&table, &SqlServer)
            .insert_generated(None)
            .unwrap();
        assert_eq!(insert.kind, CommandKind::InsertGenerated);
        assert_eq!(
            insert.text,
            "INSERT INTO [department] ([name], [code]) OUTPUT INSERTED.[id] VALUES (@name, @code)"
        );
    }

    #[test]
    fn subsets_limit_columns() {
        let table = department();
        let builder = CommandBuilder::new(&table, &Postgres);
        let update = builder.update(Some(&["code"])).unwrap();
        assert_eq!(columns(&update), vec!["code", "id"]);

        assert!(matches!(
            builder.update(Some(&["budget"])),
            Err(CoreError::UnknownColumn { .. })
        ));
        assert!(matches!(
            builder.update(Some(&["head_count"])),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn keyless_tables() {
        let table = TableSchema::builder("audit")
            .column(Column::new("message", DataType::Text))
            .build()
            .unwrap();
        let builder = CommandBuilder::new(&table, &Postgres);
        assert!(builder.delete().unwrap().is_none());
        assert!(builder.build(CommandKind::Delete, None).unwrap().is_none());
        assert!(matches!(
            builder.update(None),
            Err(CoreError::MissingPrimaryKey { .. })
        ));
        assert!(matches!(
            builder.insert_generated(None),
            Err(CoreError::MissingPrimaryKey { .. })
        ));
        assert_eq!(columns(&builder.insert(None).unwrap()), vec!["message"]);
    }

    #[test]
    fn unmapped_types_fail() {
        let table = TableSchema::builder("place")
            .column(Column::new("id", DataType::Long).roles(ColumnRoles::PRIMARY_KEY))
            .column(Column::new("shape", DataType::Other("geometry".into())))
            .build()
            .unwrap();
        let builder = CommandBuilder::new(&table, &Postgres);
        assert!(matches!(
            builder.insert(None),
            Err(CoreError::UnmappedType { column, .. }) if column == "shape"
        ));
        // Delete only needs the key.
        assert!(builder.delete().unwrap().is_some());
    }

    #[test]
    fn select_and_procedure() {
        let table = department();
        let builder = CommandBuilder::new(&table, &Postgres);
        let select = builder.select(true).unwrap();
        assert_eq!(
            select.text,
            "SELECT \"id\", \"name\", \"code\", \"head_count\" FROM \"department\" WHERE \"id\" = $1"
        );
        assert_eq!(select.columns.len(), 4);
        assert!(builder.select(false).unwrap().parameters.is_empty());

        let call = builder
            .procedure("close_department", &[("id", DataType::Long)])
            .unwrap();
        assert_eq!(call.text, "CALL \"close_department\"($1)");
        assert_eq!(call.table, "close_department");
        assert!(CommandBuilder::new(&table, &Sqlite)
            .procedure("close_department", &[])
            .is_err());
    }

    #[test]
    fn bind_reads_row_values() {
        let table = Arc::new(
            TableSchema::builder("department")
                .column(Column::new("id", DataType::Long).roles(ColumnRoles::PRIMARY_KEY))
                .column(Column::new("name", DataType::String))
                .constraint(Constraint::unique("uq_name", &["name"]))
                .build()
                .unwrap(),
        );
        let row = TrackedRow::new(Arc::clone(&table), 0);
        row.set("id", 4i64).unwrap();
        row.set("name", "Research").unwrap();

        let mut update = CommandBuilder::new(&table, &Postgres).update(None).unwrap();
        bind(&mut update, &row).unwrap();
        assert_eq!(update.parameter("name").unwrap().value, Value::from("Research"));
        assert_eq!(update.parameter("id").unwrap().value, Value::Integer(4));
    }
}
