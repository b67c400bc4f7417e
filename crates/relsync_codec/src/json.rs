//! Bridging between [`Value`] and JSON documents.
//!
//! JSON has no native decimal, timestamp or byte-string types, so the wire
//! form fixes one representation for each:
//!
//! | value | JSON |
//! |---|---|
//! | `Decimal` | string literal (`"12.50"` is read, `"12.5"` is written) |
//! | `Timestamp` | integer microseconds since the Unix epoch |
//! | `Bytes` | standard base64 string |
//! | non-finite `Float` | `null` |
//!
//! Reading needs the expected [`ValueKind`] to undo these choices.

use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Number};

/// The value kind a JSON token is read into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Natural JSON mapping (numbers become integers or floats).
    Any,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Integer,
    /// Double-precision float.
    Float,
    /// Exact decimal.
    Decimal,
    /// Microsecond timestamp.
    Timestamp,
    /// Text.
    Text,
    /// Byte string (base64 on the wire).
    Bytes,
}

impl ValueKind {
    fn name(self) -> &'static str {
        match self {
            ValueKind::Any => "any",
            ValueKind::Bool => "bool",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Decimal => "decimal",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
        }
    }
}

impl Value {
    /// Converts this value to its JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) | Value::Timestamp(n) => serde_json::Value::from(*n),
            Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, Into::into),
            Value::Decimal(d) => serde_json::Value::String(d.to_string()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            Value::Map(pairs) => {
                let mut object = Map::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = match key {
                        Value::Text(s) => s.clone(),
                        other => match other.to_json() {
                            serde_json::Value::String(s) => s,
                            json => json.to_string(),
                        },
                    };
                    object.insert(key, value.to_json());
                }
                serde_json::Value::Object(object)
            }
        }
    }

    /// Reads a JSON token as a value of the given kind.
    ///
    /// `null` is accepted for every kind. Integers are also accepted where a
    /// float or decimal is expected, and decimals may arrive as numbers.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::JsonMismatch`] when the token cannot represent
    /// the requested kind, or a decoding error for malformed literals.
    pub fn from_json(json: &serde_json::Value, kind: ValueKind) -> CodecResult<Value> {
        use serde_json::Value as Json;

        let mismatch = || CodecError::json_mismatch(kind.name(), json);
        match (kind, json) {
            (_, Json::Null) => Ok(Value::Null),
            (ValueKind::Any, _) => Ok(Self::from_json_any(json)),
            (ValueKind::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (ValueKind::Integer, Json::Number(n)) => {
                n.as_i64().map(Value::Integer).ok_or_else(mismatch)
            }
            (ValueKind::Integer, Json::String(s)) => {
                s.trim().parse().map(Value::Integer).map_err(|_| mismatch())
            }
            (ValueKind::Timestamp, Json::Number(n)) => {
                n.as_i64().map(Value::Timestamp).ok_or_else(mismatch)
            }
            (ValueKind::Float, Json::Number(n)) => {
                n.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            (ValueKind::Decimal, Json::Number(n)) => {
                n.to_string().parse::<Decimal>().map(Value::Decimal)
            }
            (ValueKind::Decimal, Json::String(s)) => s.parse::<Decimal>().map(Value::Decimal),
            (ValueKind::Text, Json::String(s)) => Ok(Value::Text(s.clone())),
            (ValueKind::Bytes, Json::String(s)) => STANDARD
                .decode(s)
                .map(Value::Bytes)
                .map_err(|e| CodecError::InvalidBase64 {
                    message: e.to_string(),
                }),
            _ => Err(mismatch()),
        }
    }

    fn from_json_any(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(items) => Value::Array(items.iter().map(Self::from_json_any).collect()),
            Json::Object(object) => Value::map(
                object
                    .iter()
                    .map(|(k, v)| (Value::Text(k.clone()), Self::from_json_any(v)))
                    .collect(),
            ),
        }
    }
}
