//! Error types for relsync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in relsync core operations.
///
/// Stale rows, dirty-field protection and cancellation are not errors; they
/// are reported through [`ReadOutcome`](crate::ReadOutcome) and
/// [`EngineStats`](crate::EngineStats).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage or driver error.
    #[error("storage error: {0}")]
    Storage(#[from] relsync_storage::StorageError),

    /// Value codec error.
    #[error("codec error: {0}")]
    Codec(#[from] relsync_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Schema file could not be parsed.
    #[error("schema parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column's semantic type has no native type in the active dialect.
    #[error("no {dialect} type for {table}.{column} ({data_type})")]
    UnmappedType {
        /// Dialect name.
        dialect: &'static str,
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Semantic type name.
        data_type: String,
    },

    /// The operation needs a primary key the table does not have.
    #[error("table {table} has no primary key")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
    },

    /// No table of that name is registered.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// Table name.
        name: String,
    },

    /// No column of that name exists in the table.
    #[error("unknown column {table}.{column}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A wire document names a property the table does not have.
    #[error("unknown property {property} on {table}")]
    UnknownProperty {
        /// Table name.
        table: String,
        /// Property name.
        property: String,
    },

    /// A discriminator value has no registered item type.
    #[error("unknown discriminator {value} for {table}")]
    UnknownDiscriminator {
        /// Table name.
        table: String,
        /// Discriminator value as found.
        value: String,
    },

    /// A wire document does not have the expected shape.
    #[error("malformed document: {message}")]
    MalformedDocument {
        /// Description of the problem.
        message: String,
    },

    /// Schema definition violates an invariant.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Description of the problem.
        message: String,
    },

    /// A configuration value could not be used.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates an unknown column error.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a missing primary key error.
    pub fn missing_primary_key(table: impl Into<String>) -> Self {
        Self::MissingPrimaryKey {
            table: table.into(),
        }
    }

    /// Creates a malformed document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::unknown_column("employee", "salary");
        assert_eq!(err.to_string(), "unknown column employee.salary");

        let err = CoreError::missing_primary_key("audit_log");
        assert_eq!(err.to_string(), "table audit_log has no primary key");

        let err = CoreError::UnmappedType {
            dialect: "sqlite",
            table: "t".into(),
            column: "c".into(),
            data_type: "geometry".into(),
        };
        assert_eq!(err.to_string(), "no sqlite type for t.c (geometry)");
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = relsync_storage::StorageError::not_found("blob 3").into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
