//! Table metadata.

use super::types::{ColumnRoles, DataType};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Semantic type.
    pub data_type: DataType,
    /// Declared size (0 when unbounded).
    #[serde(default)]
    pub size: u32,
    /// Declared scale for decimals.
    #[serde(default)]
    pub scale: u32,
    /// Roles the column plays.
    #[serde(default)]
    pub roles: ColumnRoles,
}

impl Column {
    /// Creates a column without roles.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: 0,
            scale: 0,
            roles: ColumnRoles::empty(),
        }
    }

    /// Sets the declared size.
    #[must_use]
    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets the declared scale.
    #[must_use]
    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Adds roles.
    #[must_use]
    pub fn roles(mut self, roles: ColumnRoles) -> Self {
        self.roles |= roles;
        self
    }

    /// Returns true if the column has every role in `roles`.
    #[must_use]
    pub fn has(&self, roles: ColumnRoles) -> bool {
        self.roles.contains(roles)
    }
}

/// Outward reference from a column to another table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub references: String,
    /// Name of the reference property on the referencing row.
    #[serde(default)]
    pub property: Option<String>,
    /// Name of the collection property on the referenced row.
    #[serde(default)]
    pub collection: Option<String>,
    /// Live collections merge incoming children; others are replaced.
    #[serde(default)]
    pub live: bool,
}

/// What a constraint enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Unique combination of values.
    Unique,
    /// Reference to another table.
    ForeignKey(ForeignKey),
}

/// A named constraint over columns of its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Constraint kind.
    pub kind: ConstraintKind,
}

impl Constraint {
    /// Creates a unique constraint.
    #[must_use]
    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            kind: ConstraintKind::Unique,
        }
    }

    /// Creates a foreign key from `column` to the primary key of `references`.
    #[must_use]
    pub fn foreign_key(column: impl Into<String>, references: impl Into<String>) -> Self {
        let column = column.into();
        Self {
            name: format!("fk_{column}"),
            columns: vec![column],
            kind: ConstraintKind::ForeignKey(ForeignKey {
                references: references.into(),
                property: None,
                collection: None,
                live: false,
            }),
        }
    }

    /// Names the reference property of a foreign key.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        if let ConstraintKind::ForeignKey(fk) = &mut self.kind {
            fk.property = Some(name.into());
        }
        self
    }

    /// Names the collection property of a foreign key.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        if let ConstraintKind::ForeignKey(fk) = &mut self.kind {
            fk.collection = Some(name.into());
        }
        self
    }

    /// Marks the collection of a foreign key as live.
    #[must_use]
    pub fn live(mut self) -> Self {
        if let ConstraintKind::ForeignKey(fk) = &mut self.kind {
            fk.live = true;
        }
        self
    }
}

/// A concrete row type selected by the discriminator column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    /// Discriminator value.
    pub discriminator: i64,
    /// Type name.
    pub name: String,
    /// Columns the type uses; `None` means all of them.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl ItemType {
    /// Creates an item type using every column.
    #[must_use]
    pub fn new(discriminator: i64, name: impl Into<String>) -> Self {
        Self {
            discriminator,
            name: name.into(),
            columns: None,
        }
    }

    /// Restricts the type to a column subset.
    #[must_use]
    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| (*c).to_string()).collect());
        self
    }

    /// Returns true if the type uses `column`.
    #[must_use]
    pub fn uses(&self, column: &str) -> bool {
        self.columns
            .as_ref()
            .map_or(true, |cols| cols.iter().any(|c| c == column))
    }
}

/// A resolved foreign key: the referencing column and its target.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    /// Referencing table.
    pub table: &'a str,
    /// Referencing column.
    pub column: &'a str,
    /// Ordinal of the referencing column.
    pub ordinal: usize,
    /// Target description.
    pub foreign_key: &'a ForeignKey,
}

impl Reference<'_> {
    /// Name of the reference property on the referencing row.
    ///
    /// Defaults to the column name without an `_id` suffix.
    #[must_use]
    pub fn property(&self) -> String {
        self.foreign_key.property.clone().unwrap_or_else(|| {
            self.column
                .strip_suffix("_id")
                .map_or_else(|| format!("{}_ref", self.column), str::to_string)
        })
    }

    /// Name of the collection property on the referenced row.
    ///
    /// Defaults to the referencing table name.
    #[must_use]
    pub fn collection(&self) -> String {
        self.foreign_key
            .collection
            .clone()
            .unwrap_or_else(|| self.table.to_string())
    }
}

/// Metadata of one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    item_types: Vec<ItemType>,
    ordinals: HashMap<String, usize>,
    primary_key: Option<usize>,
    stamp: Option<usize>,
    discriminator: Option<usize>,
}

impl TableSchema {
    /// Starts building a table.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
            item_types: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.ordinal(name).map(|i| &self.columns[i])
    }

    /// Ordinal of a column by name.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    /// Ordinal of a column, or an [`CoreError::UnknownColumn`] error.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn require_ordinal(&self, name: &str) -> CoreResult<usize> {
        self.ordinal(name)
            .ok_or_else(|| CoreError::unknown_column(&self.name, name))
    }

    /// Primary-key column.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Column> {
        self.primary_key.map(|i| &self.columns[i])
    }

    /// Ordinal of the primary-key column.
    #[must_use]
    pub fn primary_key_ordinal(&self) -> Option<usize> {
        self.primary_key
    }

    /// Ordinal of the stamp column.
    #[must_use]
    pub fn stamp_ordinal(&self) -> Option<usize> {
        self.stamp
    }

    /// Ordinal of the discriminator column.
    #[must_use]
    pub fn discriminator_ordinal(&self) -> Option<usize> {
        self.discriminator
    }

    /// Constraints in declaration order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Registered item types, base type first.
    #[must_use]
    pub fn item_types(&self) -> &[ItemType] {
        &self.item_types
    }

    /// Item type by discriminator value.
    #[must_use]
    pub fn item_type(&self, discriminator: i64) -> Option<&ItemType> {
        self.item_types
            .iter()
            .find(|t| t.discriminator == discriminator)
    }

    /// Outward references of this table.
    pub fn references(&self) -> impl Iterator<Item = Reference<'_>> {
        self.constraints.iter().filter_map(move |c| match &c.kind {
            ConstraintKind::ForeignKey(fk) => {
                let column = c.columns.first()?;
                Some(Reference {
                    table: &self.name,
                    column: column.as_str(),
                    ordinal: self.ordinal(column)?,
                    foreign_key: fk,
                })
            }
            ConstraintKind::Unique => None,
        })
    }

    /// Adds a constraint after checking its columns belong to this table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] for a column the table lacks and
    /// [`CoreError::InvalidSchema`] for a foreign key that is not over
    /// exactly one column.
    pub fn add_constraint(&mut self, constraint: Constraint) -> CoreResult<()> {
        if let Some(missing) = constraint
            .columns
            .iter()
            .find(|c| !self.ordinals.contains_key(c.as_str()))
        {
            return Err(CoreError::unknown_column(&self.name, missing));
        }
        if matches!(constraint.kind, ConstraintKind::ForeignKey(_)) && constraint.columns.len() != 1
        {
            return Err(CoreError::invalid_schema(format!(
                "foreign key {} on {} must have exactly one column",
                constraint.name, self.name
            )));
        }
        self.constraints.push(constraint);
        Ok(())
    }

    fn register_item_type(&mut self, item_type: ItemType) -> CoreResult<()> {
        if let Some(missing) = item_type
            .columns
            .iter()
            .flatten()
            .find(|c| !self.ordinals.contains_key(c.as_str()))
        {
            return Err(CoreError::unknown_column(&self.name, missing));
        }
        if self.item_type(item_type.discriminator).is_some() {
            return Err(CoreError::invalid_schema(format!(
                "discriminator {} registered twice on {}",
                item_type.discriminator, self.name
            )));
        }
        self.item_types.push(item_type);
        Ok(())
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug, Clone)]
pub struct TableSchemaBuilder {
    name: String,
    columns: Vec<Column>,
    constraints: Vec<Constraint>,
    item_types: Vec<ItemType>,
}

impl TableSchemaBuilder {
    /// Appends a column.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a constraint.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Registers an item type.
    #[must_use]
    pub fn item_type(mut self, item_type: ItemType) -> Self {
        self.item_types.push(item_type);
        self
    }

    /// Validates and builds the table.
    ///
    /// The base item type (discriminator 0) is registered when absent.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate column names, more than one primary
    /// key, stamp or discriminator column, or constraints and item types
    /// naming unknown columns.
    pub fn build(self) -> CoreResult<TableSchema> {
        let mut ordinals = HashMap::with_capacity(self.columns.len());
        let mut primary_key = None;
        let mut stamp = None;
        let mut discriminator = None;

        for (i, column) in self.columns.iter().enumerate() {
            if ordinals.insert(column.name.clone(), i).is_some() {
                return Err(CoreError::invalid_schema(format!(
                    "duplicate column {}.{}",
                    self.name, column.name
                )));
            }
            for (role, slot, what) in [
                (ColumnRoles::PRIMARY_KEY, &mut primary_key, "primary key"),
                (ColumnRoles::STAMP, &mut stamp, "stamp"),
                (
                    ColumnRoles::TYPE_DISCRIMINATOR,
                    &mut discriminator,
                    "discriminator",
                ),
            ] {
                if column.has(role) {
                    if slot.is_some() {
                        return Err(CoreError::invalid_schema(format!(
                            "table {} has more than one {what} column",
                            self.name
                        )));
                    }
                    *slot = Some(i);
                }
            }
        }

        let mut table = TableSchema {
            name: self.name,
            columns: self.columns,
            constraints: Vec::with_capacity(self.constraints.len()),
            item_types: Vec::with_capacity(self.item_types.len() + 1),
            ordinals,
            primary_key,
            stamp,
            discriminator,
        };
        for constraint in self.constraints {
            table.add_constraint(constraint)?;
        }
        if !self.item_types.iter().any(|t| t.discriminator == 0) {
            let base = ItemType::new(0, table.name.clone());
            table.register_item_type(base)?;
        }
        for item_type in self.item_types {
            table.register_item_type(item_type)?;
        }
        Ok(table)
    }
}

/// Serialized form of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub item_types: Vec<ItemType>,
}

impl TryFrom<TableDef> for TableSchema {
    type Error = CoreError;

    fn try_from(def: TableDef) -> CoreResult<Self> {
        let mut builder = TableSchema::builder(def.name);
        builder.columns = def.columns;
        builder.constraints = def.constraints;
        builder.item_types = def.item_types;
        builder.build()
    }
}

impl From<&TableSchema> for TableDef {
    fn from(table: &TableSchema) -> Self {
        Self {
            name: table.name.clone(),
            columns: table.columns.clone(),
            constraints: table.constraints.clone(),
            item_types: table.item_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> TableSchemaBuilder {
        TableSchema::builder("employee")
            .column(
                Column::new("id", DataType::Long)
                    .roles(ColumnRoles::PRIMARY_KEY | ColumnRoles::GENERATED),
            )
            .column(Column::new("name", DataType::String).size(100))
            .column(Column::new("department_id", DataType::Long))
    }

    #[test]
    fn locates_role_columns() {
        let table = employee()
            .column(Column::new("version", DataType::DateTime).roles(ColumnRoles::STAMP))
            .build()
            .unwrap();
        assert_eq!(table.primary_key().unwrap().name, "id");
        assert_eq!(table.stamp_ordinal(), Some(3));
        assert_eq!(table.discriminator_ordinal(), None);
        assert_eq!(table.ordinal("name"), Some(1));
    }

    #[test]
    fn base_item_type_is_always_registered() {
        let table = employee().build().unwrap();
        assert_eq!(table.item_types().len(), 1);
        assert_eq!(table.item_type(0).unwrap().name, "employee");

        let table = employee()
            .item_type(ItemType::new(0, "person"))
            .item_type(ItemType::new(1, "manager"))
            .build()
            .unwrap();
        assert_eq!(table.item_type(0).unwrap().name, "person");
        assert_eq!(table.item_types().len(), 2);
    }

    #[test]
    fn constraint_columns_must_belong_to_table() {
        let err = employee()
            .constraint(Constraint::foreign_key("manager_id", "employee"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownColumn { column, .. } if column == "manager_id"));

        let mut table = employee().build().unwrap();
        assert!(table
            .add_constraint(Constraint::unique("uq_name", &["name", "nickname"]))
            .is_err());
        table
            .add_constraint(Constraint::unique("uq_name", &["name"]))
            .unwrap();
        assert_eq!(table.constraints().len(), 1);
    }

    #[test]
    fn rejects_duplicate_role_columns() {
        let err = employee()
            .column(Column::new("code", DataType::Int).roles(ColumnRoles::PRIMARY_KEY))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSchema { .. }));
    }

    #[test]
    fn reference_property_names() {
        let table = employee()
            .constraint(Constraint::foreign_key("department_id", "department"))
            .build()
            .unwrap();
        let reference = table.references().next().unwrap();
        assert_eq!(reference.property(), "department");
        assert_eq!(reference.collection(), "employee");
        assert_eq!(reference.ordinal, 2);

        let table = employee()
            .constraint(
                Constraint::foreign_key("department_id", "department")
                    .property("dept")
                    .collection("staff"),
            )
            .build()
            .unwrap();
        let reference = table.references().next().unwrap();
        assert_eq!(reference.property(), "dept");
        assert_eq!(reference.collection(), "staff");
    }
}
