//! Canonical CBOR decoder.

use crate::decimal::Decimal;
use crate::encoder::{TAG_DECIMAL_FRACTION, TAG_EPOCH_TIME};
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::cmp::Ordering;

/// Decode a value from CBOR bytes.
///
/// Trailing bytes after the first complete item are rejected.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR or contain
/// forbidden constructs (NaN, half/single floats, indefinite-length items).
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure(format!(
            "{} trailing bytes after value",
            decoder.remaining().len()
        )));
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Shortest-form integers, sorted map keys and double-width floats are
/// enforced. Tags 1 (epoch time) and 4 (decimal fraction) map to
/// [`Value::Timestamp`] and [`Value::Decimal`]; other tags are unwrapped.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Upper bound on array and map element counts claimed by a header.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Upper bound on byte and text string lengths claimed by a header.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                // -(n+1) must stay within i64
                i64::try_from(n)
                    .map(|n| Value::Integer(-n - 1))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let bytes = self.decode_string_body(additional_info)?;
                Ok(Value::Bytes(bytes.to_vec()))
            }
            3 => {
                let bytes = self.decode_string_body(additional_info)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => self.decode_array(additional_info),
            5 => self.decode_map(additional_info),
            6 => self.decode_tagged(additional_info),
            7 => self.decode_simple(additional_info),
            _ => Err(CodecError::invalid_structure("invalid major type")),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let (value, fits_shorter) = match additional_info {
            0..=23 => return Ok(u64::from(additional_info)),
            24 => {
                let v = self.read_byte()?;
                (u64::from(v), v < 24)
            }
            25 => {
                let v = u16::from_be_bytes(self.read_array()?);
                (u64::from(v), u8::try_from(v).is_ok())
            }
            26 => {
                let v = u32::from_be_bytes(self.read_array()?);
                (u64::from(v), u16::try_from(v).is_ok())
            }
            27 => {
                let v = u64::from_be_bytes(self.read_array()?);
                (v, u32::try_from(v).is_ok())
            }
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };
        if fits_shorter {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn decode_string_body(&mut self, additional_info: u8) -> CodecResult<&'a [u8]> {
        let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
        self.read_bytes(len)
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        // Capacity is bounded by what the input can possibly hold.
        let mut items = Vec::with_capacity(len.min(self.remaining().len()));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(self.remaining().len() / 2));
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let data: &'a [u8] = self.data;
            let key_bytes = &data[key_start..self.pos];

            if let Some(prev) = prev_key {
                if compare_cbor_bytes(prev, key_bytes) != Ordering::Less {
                    return Err(CodecError::invalid_structure(
                        "non-canonical: map keys not in sorted order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_tagged(&mut self, additional_info: u8) -> CodecResult<Value> {
        let tag = self.decode_unsigned(additional_info)?;
        match tag {
            TAG_EPOCH_TIME => self.decode_epoch_time(),
            TAG_DECIMAL_FRACTION => self.decode_decimal_fraction(),
            // Unknown tags carry no meaning for us; keep the inner item.
            _ => self.decode(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode_epoch_time(&mut self) -> CodecResult<Value> {
        match self.decode()? {
            Value::Integer(seconds) => seconds
                .checked_mul(1_000_000)
                .map(Value::Timestamp)
                .ok_or(CodecError::IntegerOverflow),
            Value::Float(seconds) => {
                let micros = (seconds * 1_000_000.0).round();
                if micros.is_finite() && micros.abs() < 9.2e18 {
                    Ok(Value::Timestamp(micros as i64))
                } else {
                    Err(CodecError::IntegerOverflow)
                }
            }
            other => Err(CodecError::invalid_structure(format!(
                "epoch time must be numeric, found {other:?}"
            ))),
        }
    }

    fn decode_decimal_fraction(&mut self) -> CodecResult<Value> {
        let parts = match self.decode()? {
            Value::Array(parts) if parts.len() == 2 => parts,
            _ => {
                return Err(CodecError::invalid_structure(
                    "decimal fraction must be a two-element array",
                ))
            }
        };
        let (Some(exponent), Some(mantissa)) = (parts[0].as_integer(), parts[1].as_integer())
        else {
            return Err(CodecError::invalid_structure(
                "decimal fraction parts must be integers",
            ));
        };
        if exponent > 0 {
            let factor = u32::try_from(exponent)
                .ok()
                .and_then(|e| 10i128.checked_pow(e))
                .ok_or(CodecError::IntegerOverflow)?;
            let scaled = i128::from(mantissa)
                .checked_mul(factor)
                .ok_or(CodecError::IntegerOverflow)?;
            return Decimal::new(scaled, 0).map(Value::Decimal);
        }
        let scale = u32::try_from(-exponent)
            .map_err(|_| CodecError::invalid_decimal(format!("{mantissa}e{exponent}")))?;
        Decimal::new(i128::from(mantissa), scale).map(Value::Decimal)
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 | 23 => Ok(Value::Null),
            24 => {
                let simple = self.read_byte()?;
                if simple < 32 {
                    Err(CodecError::invalid_structure(
                        "non-canonical: simple value should use direct encoding",
                    ))
                } else {
                    Err(CodecError::UnsupportedSimple { value: simple })
                }
            }
            25 | 26 => Err(CodecError::invalid_structure(
                "non-canonical: floats must be encoded as doubles",
            )),
            27 => {
                let f = f64::from_be_bytes(self.read_array()?);
                if f.is_nan() {
                    return Err(CodecError::NaNForbidden);
                }
                Ok(Value::Float(f))
            }
            28..=30 => Err(CodecError::invalid_structure("reserved additional info")),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            _ => Err(CodecError::UnsupportedSimple {
                value: additional_info,
            }),
        }
    }
}

/// Length-first, then bytewise ordering of encoded map keys.
fn compare_cbor_bytes(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_values() {
        assert_eq!(from_cbor(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(from_cbor(&[0xf4]).unwrap(), Value::Bool(false));
        assert_eq!(from_cbor(&[0xf5]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn decode_integers() {
        assert_eq!(from_cbor(&[0x17]).unwrap(), Value::Integer(23));
        assert_eq!(from_cbor(&[0x18, 255]).unwrap(), Value::Integer(255));
        assert_eq!(from_cbor(&[0x19, 0x01, 0x00]).unwrap(), Value::Integer(256));
        assert_eq!(from_cbor(&[0x20]).unwrap(), Value::Integer(-1));
        assert_eq!(from_cbor(&[0x38, 99]).unwrap(), Value::Integer(-100));
    }

    #[test]
    fn integer_out_of_range() {
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn decode_strings_and_containers() {
        assert_eq!(
            from_cbor(&[0x43, 1, 2, 3]).unwrap(),
            Value::Bytes(vec![1, 2, 3])
        );
        assert_eq!(
            from_cbor(&[0x65, b'h', b'e', b'l', b'l', b'o']).unwrap(),
            Value::from("hello")
        );
        assert_eq!(
            from_cbor(&[0x82, 0x01, 0x02]).unwrap(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
        assert_eq!(
            from_cbor(&[0xa1, 0x61, b'a', 0x01]).unwrap(),
            Value::Map(vec![(Value::from("a"), Value::Integer(1))])
        );
    }

    #[test]
    fn decode_double_and_reject_short_floats() {
        let mut bytes = vec![0xfb];
        bytes.extend_from_slice(&(-0.25f64).to_be_bytes());
        assert_eq!(from_cbor(&bytes).unwrap(), Value::Float(-0.25));

        assert!(matches!(
            from_cbor(&[0xf9, 0x00, 0x00]),
            Err(CodecError::InvalidStructure { .. })
        ));
        assert!(matches!(
            from_cbor(&[0xfa, 0x00, 0x00, 0x00, 0x00]),
            Err(CodecError::InvalidStructure { .. })
        ));

        let mut nan = vec![0xfb];
        nan.extend_from_slice(&f64::NAN.to_be_bytes());
        assert_eq!(from_cbor(&nan), Err(CodecError::NaNForbidden));
    }

    #[test]
    fn decode_epoch_time() {
        assert_eq!(
            from_cbor(&[0xc1, 0x0a]).unwrap(),
            Value::Timestamp(10_000_000)
        );
        let mut fractional = vec![0xc1, 0xfb];
        fractional.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(from_cbor(&fractional).unwrap(), Value::Timestamp(1_500_000));
        assert!(from_cbor(&[0xc1, 0x61, b'x']).is_err());
    }

    #[test]
    fn decode_decimal_fraction() {
        let expected: Decimal = "2.75".parse().unwrap();
        assert_eq!(
            from_cbor(&[0xc4, 0x82, 0x21, 0x19, 0x01, 0x13]).unwrap(),
            Value::Decimal(expected)
        );
        // positive exponent: 3e2
        assert_eq!(
            from_cbor(&[0xc4, 0x82, 0x02, 0x03]).unwrap(),
            Value::Decimal(Decimal::from(300))
        );
        assert!(from_cbor(&[0xc4, 0x81, 0x01]).is_err());
    }

    #[test]
    fn unknown_tag_is_transparent() {
        // tag 32 (URI) around a text string
        assert_eq!(
            from_cbor(&[0xd8, 0x20, 0x61, b'u']).unwrap(),
            Value::from("u")
        );
    }

    #[test]
    fn reject_indefinite_length() {
        for bytes in [
            &[0x5f, 0x41, b'a', 0xff][..],
            &[0x7f, 0x61, b'a', 0xff][..],
            &[0x9f, 0x01, 0xff][..],
            &[0xbf, 0x61, b'a', 0x01, 0xff][..],
        ] {
            assert_eq!(from_cbor(bytes), Err(CodecError::IndefiniteLengthForbidden));
        }
    }

    #[test]
    fn reject_non_shortest_encoding() {
        assert!(matches!(
            from_cbor(&[0x18, 23]),
            Err(CodecError::InvalidStructure { .. })
        ));
        assert!(matches!(
            from_cbor(&[0x19, 0x00, 0xff]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_unsorted_map_keys() {
        assert!(matches!(
            from_cbor(&[0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_trailing_bytes() {
        assert!(matches!(
            from_cbor(&[0x01, 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn unexpected_eof() {
        assert_eq!(from_cbor(&[]), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[0x18]), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[0x43, 1]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn claimed_length_is_bounded() {
        let mut bytes = vec![0x5b];
        bytes.extend_from_slice(&(u64::from(u32::MAX) + 1).to_be_bytes());
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert_eq!(from_cbor(&[0x62, 0xff, 0xfe]), Err(CodecError::InvalidUtf8));
    }
}
