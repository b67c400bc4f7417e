//! Test fixtures and workspace helpers.
//!
//! Provides a small staff schema (departments and their employees), a
//! workspace over an in-memory driver with matching tables, and builders
//! for cursors shaped like that schema.

use relsync_codec::{RowKey, Value};
use relsync_core::{
    Column, ColumnRoles, Config, Constraint, DataType, ItemType, QuerySource, ReadOptions,
    Schema, TableSchema, TrackedRow, Workspace,
};
use relsync_storage::{DbTransaction, Driver, MemoryCursor, MemoryDriver};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Cursor columns of the `department` table.
pub const DEPARTMENT_COLUMNS: [&str; 3] = ["id", "name", "code"];

/// Cursor columns of the `employee` table.
pub const EMPLOYEE_COLUMNS: [&str; 6] = ["id", "name", "kind", "dept_id", "salary", "updated"];

/// Discriminator of plain employees.
pub const EMPLOYEE: i64 = 0;

/// Discriminator of managers.
pub const MANAGER: i64 = 1;

/// The staff schema.
///
/// - `department(id generated key, name, code)`
/// - `employee(id key, name, kind discriminator, dept_id, salary, updated stamp)`
///   with `dept_id` referencing `department` as property `dept` and
///   collection `members`
pub fn staff_schema() -> Schema {
    let department = TableSchema::builder("department")
        .column(
            Column::new("id", DataType::Long)
                .roles(ColumnRoles::PRIMARY_KEY | ColumnRoles::GENERATED),
        )
        .column(Column::new("name", DataType::String).size(100))
        .column(Column::new("code", DataType::String).size(10))
        .build()
        .expect("department table");
    let employee = TableSchema::builder("employee")
        .column(Column::new("id", DataType::Long).roles(ColumnRoles::PRIMARY_KEY))
        .column(Column::new("name", DataType::String).size(100))
        .column(Column::new("kind", DataType::Int).roles(ColumnRoles::TYPE_DISCRIMINATOR))
        .column(Column::new("dept_id", DataType::Long))
        .column(Column::new("salary", DataType::Decimal).size(12).scale(2))
        .column(Column::new("updated", DataType::DateTime).roles(ColumnRoles::STAMP))
        .constraint(
            Constraint::foreign_key("dept_id", "department")
                .property("dept")
                .collection("members"),
        )
        .item_type(ItemType::new(EMPLOYEE, "employee"))
        .item_type(ItemType::new(MANAGER, "manager"))
        .build()
        .expect("employee table");
    Schema::builder()
        .table(department)
        .table(employee)
        .build()
        .expect("staff schema")
}

/// A workspace over an in-memory driver with automatic cleanup.
pub struct TestWorkspace {
    /// The workspace.
    pub workspace: Workspace,
    /// The driver backing it.
    pub driver: MemoryDriver,
    /// Scratch directory for blob stores (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a workspace over the staff schema with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a workspace over the staff schema.
    pub fn with_config(config: Config) -> Self {
        let driver = MemoryDriver::new();
        driver.create_table("department", &DEPARTMENT_COLUMNS);
        driver.create_table("employee", &EMPLOYEE_COLUMNS);
        Self {
            workspace: Workspace::new(staff_schema(), config),
            driver,
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Scratch directory removed with the fixture.
    pub fn scratch(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Begins a driver transaction.
    pub fn begin(&self) -> Box<dyn DbTransaction> {
        self.driver.begin().expect("Failed to begin transaction")
    }

    /// Materializes department rows into the workspace cache.
    pub fn load_departments(&self, rows: &[(i64, &str, &str)]) -> Vec<Arc<TrackedRow>> {
        let mut cursor = department_cursor(rows);
        self.workspace
            .read(&QuerySource::table("department"), &mut cursor, ReadOptions::new())
            .expect("Failed to read departments")
            .primary()
    }

    /// Materializes employee rows into the workspace cache.
    pub fn load_employees(&self, rows: Vec<Vec<Value>>) -> Vec<Arc<TrackedRow>> {
        let mut cursor = MemoryCursor::new(&EMPLOYEE_COLUMNS, rows);
        self.workspace
            .read(&QuerySource::table("employee"), &mut cursor, ReadOptions::new())
            .expect("Failed to read employees")
            .primary()
    }

    /// Cached instance of `table` with integer key `id`.
    pub fn cached(&self, table: &str, id: i64) -> Option<Arc<TrackedRow>> {
        self.workspace
            .table(table)
            .expect("table in schema")
            .get(&RowKey::Integer(id))
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestWorkspace {
    type Target = Workspace;

    fn deref(&self) -> &Self::Target {
        &self.workspace
    }
}

/// Cursor over department rows `(id, name, code)`.
pub fn department_cursor(rows: &[(i64, &str, &str)]) -> MemoryCursor {
    MemoryCursor::new(
        &DEPARTMENT_COLUMNS,
        rows.iter()
            .map(|(id, name, code)| vec![Value::Integer(*id), Value::from(*name), Value::from(*code)])
            .collect(),
    )
}

/// One employee cursor row; `updated` is a microsecond timestamp.
pub fn employee_row(id: i64, name: &str, dept_id: Option<i64>, updated: i64) -> Vec<Value> {
    vec![
        Value::Integer(id),
        Value::from(name),
        Value::Integer(EMPLOYEE),
        dept_id.map_or(Value::Null, Value::Integer),
        Value::Null,
        Value::Timestamp(updated),
    ]
}

/// Runs `f` against a fresh staff workspace.
pub fn with_workspace<F, R>(f: F) -> R
where
    F: FnOnce(&TestWorkspace) -> R,
{
    let fixture = TestWorkspace::new();
    f(&fixture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_core::RowStatus;

    #[test]
    fn staff_schema_links_employees_to_departments() {
        let schema = staff_schema();
        let members: Vec<_> = schema.inward_references("department").collect();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].collection(), "members");
        assert_eq!(members[0].property(), "dept");
    }

    #[test]
    fn loaded_rows_are_cached_and_actual() {
        with_workspace(|fx| {
            let rows = fx.load_departments(&[(1, "Research", "RD"), (2, "Sales", "SL")]);
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1].status(), RowStatus::Actual);
            assert!(fx.cached("department", 2).is_some());
            assert!(fx.scratch().exists());
        });
    }
}
