//! # relsync codec
//!
//! Dynamic column values and their encodings.
//!
//! - [`Value`] is the value type carried by rows, command parameters,
//!   change ledgers and wire documents. [`Decimal`] gives exact numerics and
//!   [`RowKey`] is the hashable primary-key form used by caches.
//! - Canonical CBOR ([`to_canonical_cbor`] / [`from_cbor`]) is used for the
//!   compact change-buffer export. Identical inputs produce identical bytes.
//! - The JSON bridge ([`Value::to_json`] / [`Value::from_json`]) is used by
//!   the reference-graph codec.
//!
//! ## Canonical CBOR Rules
//!
//! - Maps are sorted by key (length-first, then bytewise on encoded keys)
//! - Integers use shortest encoding
//! - Floats are 64-bit, never NaN
//! - Timestamps are tag 1, decimals are tag 4
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use relsync_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::map(vec![(Value::from("id"), Value::Integer(42))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decimal;
mod decoder;
mod encoder;
mod error;
mod json;
mod key;
mod value;

pub use decimal::{Decimal, MAX_SCALE};
pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use json::ValueKind;
pub use key::RowKey;
pub use value::Value;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        let bytes = value.encode().unwrap();
        Value::decode(&bytes).unwrap()
    }

    #[test]
    fn roundtrip_scalars() {
        for value in [
            Value::Null,
            Value::Bool(true),
            Value::Integer(-100),
            Value::Integer(i64::MAX),
            Value::Integer(i64::MIN),
            Value::Float(-3.75),
            Value::Text("hello world".to_string()),
            Value::Bytes(vec![1, 2, 3, 4, 5]),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn roundtrip_decimal_and_timestamp() {
        let d: Decimal = "-1234.5678".parse().unwrap();
        assert_eq!(roundtrip(&Value::Decimal(d)), Value::Decimal(d));
        assert_eq!(
            roundtrip(&Value::Timestamp(1_700_000_000_500_000)),
            Value::Timestamp(1_700_000_000_500_000)
        );
        assert_eq!(roundtrip(&Value::Timestamp(-5_000_000)), Value::Timestamp(-5_000_000));
    }

    #[test]
    fn roundtrip_nested() {
        let value = Value::map(vec![
            (
                Value::from("rows"),
                Value::Array(vec![
                    Value::map(vec![
                        (Value::from("name"), Value::from("Alice")),
                        (Value::from("id"), Value::Integer(30)),
                    ]),
                    Value::map(vec![
                        (Value::from("name"), Value::from("Bob")),
                        (Value::from("id"), Value::Integer(25)),
                    ]),
                ]),
            ),
            (Value::from("count"), Value::Integer(2)),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn reencoding_is_stable() {
        let value = Value::map(vec![
            (Value::from("z"), Value::Float(1.25)),
            (Value::from("a"), Value::Timestamp(3_000_000)),
        ]);
        let first = to_canonical_cbor(&value).unwrap();
        let second = to_canonical_cbor(&from_cbor(&first).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
