//! Hashable primary-key form of a [`Value`].

use crate::value::Value;
use std::fmt;

/// A primary-key value usable as a cache key.
///
/// Only integer, text and byte-string values can identify a row. `Null`
/// never identifies a row: a null primary key yields no key at all.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowKey {
    /// Integer key (the common case: sequences and identities).
    Integer(i64),
    /// Text key.
    Text(String),
    /// Binary key (e.g. GUID bytes).
    Bytes(Vec<u8>),
}

impl RowKey {
    /// Builds a key from a column value.
    ///
    /// Returns `None` for `Null` and for value kinds that cannot act as keys.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(RowKey::Integer(*n)),
            Value::Text(s) => Some(RowKey::Text(s.clone())),
            Value::Bytes(b) => Some(RowKey::Bytes(b.clone())),
            _ => None,
        }
    }

    /// Converts the key back into a column value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            RowKey::Integer(n) => Value::Integer(*n),
            RowKey::Text(s) => Value::Text(s.clone()),
            RowKey::Bytes(b) => Value::Bytes(b.clone()),
        }
    }

    /// Returns the integer key, if this is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RowKey::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<i64> for RowKey {
    fn from(n: i64) -> Self {
        RowKey::Integer(n)
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        RowKey::Text(s.to_string())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Integer(n) => write!(f, "{n}"),
            RowKey::Text(s) => write!(f, "{s:?}"),
            RowKey::Bytes(b) => f.write_str(&hex::encode(b)),
        }
    }
}
