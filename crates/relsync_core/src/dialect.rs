//! Backend dialects.
//!
//! A [`Dialect`] holds everything that differs between backends when command
//! text is generated: identifier quoting, parameter placeholders, the fixed
//! mapping from semantic to native types, how an insert returns a generated
//! key, and procedure call syntax.

use crate::error::{CoreError, CoreResult};
use crate::schema::DataType;
use relsync_storage::{NativeType, PlaceholderStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend-specific command text rules.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short dialect name.
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    fn quote(&self, ident: &str) -> String;

    /// Parameter placeholder syntax.
    fn placeholders(&self) -> PlaceholderStyle;

    /// Native type of a semantic type, if the backend has one.
    fn native_type(&self, data_type: &DataType) -> Option<NativeType>;

    /// Text of an insert that returns the generated `key`.
    ///
    /// `table`, `columns` and `key` are already quoted.
    fn insert_returning(&self, table: &str, columns: &[String], values: &[String], key: &str)
        -> String;

    /// Text of a stored-procedure call, or `None` if the backend has none.
    fn procedure_call(&self, name: &str, placeholders: &[String]) -> Option<String>;

    /// Text of a plain insert.
    fn insert(&self, table: &str, columns: &[String], values: &[String]) -> String {
        if columns.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                values.join(", ")
            )
        }
    }
}

/// Mapping shared by all dialects; each overrides what its backend lacks.
fn base_native_type(data_type: &DataType) -> Option<NativeType> {
    Some(match data_type {
        DataType::Boolean => NativeType::Boolean,
        DataType::Byte => NativeType::TinyInt,
        DataType::Short => NativeType::SmallInt,
        DataType::Int => NativeType::Integer,
        DataType::Long => NativeType::BigInt,
        DataType::Float => NativeType::Real,
        DataType::Double => NativeType::Double,
        DataType::Decimal => NativeType::Decimal,
        DataType::String => NativeType::VarChar,
        DataType::Text => NativeType::Text,
        DataType::Binary | DataType::Serialized => NativeType::Binary,
        DataType::Date => NativeType::Date,
        DataType::DateTime => NativeType::Timestamp,
        DataType::TimeSpan => NativeType::Interval,
        DataType::Guid => NativeType::Guid,
        DataType::Other(_) => return None,
    })
}

fn double_quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        double_quote(ident)
    }

    fn placeholders(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn native_type(&self, data_type: &DataType) -> Option<NativeType> {
        match data_type {
            DataType::Byte => Some(NativeType::SmallInt),
            other => base_native_type(other),
        }
    }

    fn insert_returning(
        &self,
        table: &str,
        columns: &[String],
        values: &[String],
        key: &str,
    ) -> String {
        format!("{} RETURNING {key}", self.insert(table, columns, values))
    }

    fn procedure_call(&self, name: &str, placeholders: &[String]) -> Option<String> {
        Some(format!("CALL {}({})", self.quote(name), placeholders.join(", ")))
    }
}

/// SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote(&self, ident: &str) -> String {
        double_quote(ident)
    }

    fn placeholders(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    fn native_type(&self, data_type: &DataType) -> Option<NativeType> {
        match data_type {
            DataType::TimeSpan => Some(NativeType::BigInt),
            DataType::Guid => Some(NativeType::Text),
            other => base_native_type(other),
        }
    }

    fn insert_returning(
        &self,
        table: &str,
        columns: &[String],
        values: &[String],
        _key: &str,
    ) -> String {
        format!(
            "{}; SELECT last_insert_rowid()",
            self.insert(table, columns, values)
        )
    }

    fn procedure_call(&self, _name: &str, _placeholders: &[String]) -> Option<String> {
        None
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServer;

impl Dialect for SqlServer {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholders(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtName
    }

    fn native_type(&self, data_type: &DataType) -> Option<NativeType> {
        match data_type {
            DataType::TimeSpan => Some(NativeType::BigInt),
            other => base_native_type(other),
        }
    }

    fn insert_returning(
        &self,
        table: &str,
        columns: &[String],
        values: &[String],
        key: &str,
    ) -> String {
        if columns.is_empty() {
            format!("INSERT INTO {table} OUTPUT INSERTED.{key} DEFAULT VALUES")
        } else {
            format!(
                "INSERT INTO {table} ({}) OUTPUT INSERTED.{key} VALUES ({})",
                columns.join(", "),
                values.join(", ")
            )
        }
    }

    fn procedure_call(&self, name: &str, placeholders: &[String]) -> Option<String> {
        if placeholders.is_empty() {
            Some(format!("EXEC {}", self.quote(name)))
        } else {
            Some(format!("EXEC {} {}", self.quote(name), placeholders.join(", ")))
        }
    }
}

/// Selects one of the built-in dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// [`Postgres`].
    #[default]
    Postgres,
    /// [`Sqlite`].
    Sqlite,
    /// [`SqlServer`].
    SqlServer,
}

impl DialectKind {
    /// The dialect implementation.
    #[must_use]
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &Postgres,
            DialectKind::Sqlite => &Sqlite,
            DialectKind::SqlServer => &SqlServer,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dialect().name())
    }
}

impl FromStr for DialectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" => Ok(DialectKind::Sqlite),
            "sqlserver" | "mssql" => Ok(DialectKind::SqlServer),
            other => Err(CoreError::invalid_config(format!("unknown dialect {other:?}"))),
        }
    }
}
