//! Column semantic types and role flags.

use relsync_codec::ValueKind;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Semantic type of a column, independent of any backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Boolean.
    Boolean,
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Exact decimal.
    Decimal,
    /// Length-limited string.
    String,
    /// Unlimited text.
    Text,
    /// Binary data.
    Binary,
    /// Serialized object stored as bytes.
    Serialized,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time span, stored as microseconds.
    TimeSpan,
    /// 128-bit identifier.
    Guid,
    /// A backend-specific type no dialect maps.
    Other(String),
}

impl DataType {
    /// The kind JSON wire values of this type are read as.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        match self {
            DataType::Boolean => ValueKind::Bool,
            DataType::Byte
            | DataType::Short
            | DataType::Int
            | DataType::Long
            | DataType::TimeSpan => ValueKind::Integer,
            DataType::Float | DataType::Double => ValueKind::Float,
            DataType::Decimal => ValueKind::Decimal,
            DataType::String | DataType::Text | DataType::Guid => ValueKind::Text,
            DataType::Binary | DataType::Serialized => ValueKind::Bytes,
            DataType::Date | DataType::DateTime => ValueKind::Timestamp,
            DataType::Other(_) => ValueKind::Any,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "boolean",
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Decimal => "decimal",
            DataType::String => "string",
            DataType::Text => "text",
            DataType::Binary => "binary",
            DataType::Serialized => "serialized",
            DataType::Date => "date",
            DataType::DateTime => "date_time",
            DataType::TimeSpan => "time_span",
            DataType::Guid => "guid",
            DataType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// Set of roles a column plays.
///
/// Serialized as a list of role names, e.g. `["primary_key", "generated"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColumnRoles(u16);

impl ColumnRoles {
    /// Primary-key column.
    pub const PRIMARY_KEY: Self = Self(1);
    /// Row version / timestamp used for optimistic concurrency.
    pub const STAMP: Self = Self(1 << 1);
    /// Selects the concrete item type of a row.
    pub const TYPE_DISCRIMINATOR: Self = Self(1 << 2);
    /// Localized value.
    pub const CULTURE_VARIANT: Self = Self(1 << 3);
    /// Holds a blob id.
    pub const FILE_REFERENCE: Self = Self(1 << 4);
    /// Holds the file name of a blob.
    pub const FILE_NAME: Self = Self(1 << 5);
    /// Secret; never written to the wire.
    pub const PASSWORD: Self = Self(1 << 6);
    /// Maintained by the system.
    pub const SYSTEM: Self = Self(1 << 7);
    /// Value is generated by the backend on insert.
    pub const GENERATED: Self = Self(1 << 8);
    /// Computed by the backend; never written.
    pub const COMPUTED: Self = Self(1 << 9);

    const NAMES: [(Self, &'static str); 10] = [
        (Self::PRIMARY_KEY, "primary_key"),
        (Self::STAMP, "stamp"),
        (Self::TYPE_DISCRIMINATOR, "type_discriminator"),
        (Self::CULTURE_VARIANT, "culture_variant"),
        (Self::FILE_REFERENCE, "file_reference"),
        (Self::FILE_NAME, "file_name"),
        (Self::PASSWORD, "password"),
        (Self::SYSTEM, "system"),
        (Self::GENERATED, "generated"),
        (Self::COMPUTED, "computed"),
    ];

    /// No roles.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns true if every role in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no role is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(role, _)| *role)
    }

    /// Names of the set roles in declaration order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .iter()
            .filter(move |(role, _)| self.contains(*role))
            .map(|(_, name)| *name)
    }
}

impl BitOr for ColumnRoles {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ColumnRoles {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Serialize for ColumnRoles {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.names().collect();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ColumnRoles {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut roles = ColumnRoles::empty();
        for name in names {
            roles |= ColumnRoles::from_name(&name)
                .ok_or_else(|| de::Error::custom(format!("unknown column role {name:?}")))?;
        }
        Ok(roles)
    }
}
