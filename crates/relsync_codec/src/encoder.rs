//! Canonical CBOR encoder.

use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// CBOR tag for epoch-based date/time (RFC 8949 §3.4.2).
pub(crate) const TAG_EPOCH_TIME: u64 = 1;
/// CBOR tag for decimal fractions (RFC 8949 §3.4.4).
pub(crate) const TAG_DECIMAL_FRACTION: u64 = 4;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic:
/// - Map keys are sorted by their encoded form (length-first, then bytewise)
/// - Integers use the shortest possible encoding
/// - No indefinite-length encoding
/// - Floats are always written as doubles; NaN is rejected
/// - Timestamps use tag 1 (whole seconds as integer, otherwise a double)
/// - Decimals use tag 4 `[exponent, mantissa]`
///
/// # Errors
///
/// Returns an error if the value cannot be encoded (NaN, or a decimal
/// mantissa wider than 64 bits).
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Decimal(d) => self.encode_decimal(d)?,
            Value::Timestamp(micros) => self.encode_timestamp(*micros),
            Value::Bytes(b) => {
                self.encode_unsigned(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_unsigned(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(arr) => {
                self.encode_unsigned(4, arr.len() as u64);
                for item in arr {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.encode_map(pairs)?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // -(n+1) is in [0, 2^63-1] for every negative i64
            self.encode_unsigned(1, (-(n + 1)) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if f.is_nan() {
            return Err(CodecError::NaNForbidden);
        }
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&f.to_be_bytes());
        Ok(())
    }

    fn encode_decimal(&mut self, d: &Decimal) -> CodecResult<()> {
        let mantissa = i64::try_from(d.mantissa()).map_err(|_| {
            CodecError::MantissaOverflow {
                literal: d.to_string(),
            }
        })?;
        self.encode_unsigned(6, TAG_DECIMAL_FRACTION);
        self.encode_unsigned(4, 2);
        self.encode_integer(-i64::from(d.scale()));
        self.encode_integer(mantissa);
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn encode_timestamp(&mut self, micros: i64) {
        self.encode_unsigned(6, TAG_EPOCH_TIME);
        if micros % MICROS_PER_SECOND == 0 {
            self.encode_integer(micros / MICROS_PER_SECOND);
        } else {
            self.buffer.push(0xfb);
            let seconds = micros as f64 / MICROS_PER_SECOND as f64;
            self.buffer.extend_from_slice(&seconds.to_be_bytes());
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut encoded_pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(pairs.len());

        for (key, value) in pairs {
            let mut key_encoder = CanonicalEncoder::new();
            key_encoder.encode(key)?;
            encoded_pairs.push((key_encoder.into_bytes(), value));
        }

        encoded_pairs.sort_by(|a, b| match a.0.len().cmp(&b.0.len()) {
            std::cmp::Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        self.encode_unsigned(5, pairs.len() as u64);
        for (encoded_key, value) in encoded_pairs {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value)?;
        }

        Ok(())
    }
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_null_and_bool() {
        assert_eq!(to_canonical_cbor(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)).unwrap(), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)).unwrap(), vec![0xf5]);
    }

    #[test]
    fn encode_integers_shortest_form() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)).unwrap(), vec![0x17]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(24)).unwrap(),
            vec![0x18, 24]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Integer(256)).unwrap(),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)).unwrap(), vec![0x20]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(-100)).unwrap(),
            vec![0x38, 99]
        );
    }

    #[test]
    fn encode_float_as_double() {
        let bytes = to_canonical_cbor(&Value::Float(1.5)).unwrap();
        assert_eq!(bytes[0], 0xfb);
        assert_eq!(&bytes[1..], &1.5f64.to_be_bytes());
        assert_eq!(
            to_canonical_cbor(&Value::Float(f64::NAN)),
            Err(CodecError::NaNForbidden)
        );
    }

    #[test]
    fn encode_decimal_fraction() {
        let d: Decimal = "2.75".parse().unwrap();
        // tag 4, array(2), -2, 275
        assert_eq!(
            to_canonical_cbor(&Value::Decimal(d)).unwrap(),
            vec![0xc4, 0x82, 0x21, 0x19, 0x01, 0x13]
        );
    }

    #[test]
    fn encode_whole_second_timestamp() {
        // tag 1, 10 seconds
        assert_eq!(
            to_canonical_cbor(&Value::Timestamp(10_000_000)).unwrap(),
            vec![0xc1, 0x0a]
        );
    }

    #[test]
    fn encode_map_sorted() {
        let map = Value::Map(vec![
            (Value::from("bb"), Value::Integer(2)),
            (Value::from("a"), Value::Integer(1)),
        ]);
        let bytes = to_canonical_cbor(&map).unwrap();
        assert_eq!(bytes, vec![0xa2, 0x61, b'a', 0x01, 0x62, b'b', b'b', 0x02]);
    }

    #[test]
    fn deterministic_encoding() {
        let map1 = Value::Map(vec![
            (Value::from("z"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        let map2 = Value::Map(vec![
            (Value::from("a"), Value::Integer(2)),
            (Value::from("z"), Value::Integer(1)),
        ]);

        assert_eq!(
            to_canonical_cbor(&map1).unwrap(),
            to_canonical_cbor(&map2).unwrap()
        );
    }
}
