//! Schema metadata: tables, columns, constraints and item types.
//!
//! A [`Schema`] is immutable once built and shared behind an `Arc`. It can be
//! built in code or loaded from JSON:
//!
//! ```rust
//! use relsync_core::Schema;
//!
//! let schema = Schema::from_json(r#"{
//!     "tables": [{
//!         "name": "department",
//!         "columns": [
//!             {"name": "id", "data_type": "long", "roles": ["primary_key", "generated"]},
//!             {"name": "name", "data_type": "string", "size": 100}
//!         ]
//!     }]
//! }"#).unwrap();
//! assert!(schema.table("department").is_some());
//! ```

mod table;
mod types;

pub(crate) use table::TableDef;
pub use table::{
    Column, Constraint, ConstraintKind, ForeignKey, ItemType, Reference, TableSchema,
    TableSchemaBuilder,
};
pub use types::{ColumnRoles, DataType};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A set of tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef", into = "SchemaDef")]
pub struct Schema {
    tables: Vec<Arc<TableSchema>>,
    by_name: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct SchemaDef {
    tables: Vec<TableDef>,
}

impl TryFrom<SchemaDef> for Schema {
    type Error = CoreError;

    fn try_from(def: SchemaDef) -> CoreResult<Self> {
        let mut builder = Schema::builder();
        for table in def.tables {
            builder = builder.table(TableSchema::try_from(table)?);
        }
        builder.build()
    }
}

impl From<Schema> for SchemaDef {
    fn from(schema: Schema) -> Self {
        Self {
            tables: schema.tables.iter().map(|t| TableDef::from(t.as_ref())).collect(),
        }
    }
}

impl Schema {
    /// Starts building a schema.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { tables: Vec::new() }
    }

    /// Parses a schema from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a table is invalid.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the schema as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[Arc<TableSchema>] {
        &self.tables
    }

    /// Table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Arc<TableSchema>> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Table by name, or an [`CoreError::UnknownTable`] error.
    ///
    /// # Errors
    ///
    /// Returns an error if the table does not exist.
    pub fn require_table(&self, name: &str) -> CoreResult<&Arc<TableSchema>> {
        self.table(name).ok_or_else(|| CoreError::unknown_table(name))
    }

    /// Resolves the table a reference points to.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownTable`] if the referenced table is not in
    /// the schema, and [`CoreError::MissingPrimaryKey`] if it has no primary
    /// key to point at.
    pub fn resolve_reference(&self, reference: &Reference<'_>) -> CoreResult<&Arc<TableSchema>> {
        let target = self.require_table(&reference.foreign_key.references)?;
        if target.primary_key().is_none() {
            return Err(CoreError::missing_primary_key(target.name()));
        }
        Ok(target)
    }

    /// References from other tables (and self-references) that point at
    /// `table`, in schema order.
    pub fn inward_references<'a>(&'a self, table: &'a str) -> impl Iterator<Item = Reference<'a>> {
        self.tables
            .iter()
            .flat_map(|t| t.references())
            .filter(move |r| r.foreign_key.references == table)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    tables: Vec<TableSchema>,
}

impl SchemaBuilder {
    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Builds the schema.
    ///
    /// Foreign keys may point at tables added in any order; they are checked
    /// when resolved.
    ///
    /// # Errors
    ///
    /// Returns an error if two tables share a name.
    pub fn build(self) -> CoreResult<Schema> {
        let mut by_name = HashMap::with_capacity(self.tables.len());
        for (i, table) in self.tables.iter().enumerate() {
            if by_name.insert(table.name().to_string(), i).is_some() {
                return Err(CoreError::invalid_schema(format!(
                    "duplicate table {}",
                    table.name()
                )));
            }
        }
        Ok(Schema {
            tables: self.tables.into_iter().map(Arc::new).collect(),
            by_name,
        })
    }
}
