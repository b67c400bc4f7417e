//! Codec errors.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Failures of CBOR encoding and decoding and of JSON value conversion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended inside an item.
    #[error("input ends inside an item")]
    UnexpectedEof,

    /// The bytes are not canonical CBOR or do not form a value.
    #[error("malformed CBOR: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// Streaming (indefinite-length) items are not accepted.
    #[error("indefinite-length item")]
    IndefiniteLengthForbidden,

    /// A simple value other than false, true, null or undefined.
    #[error("simple value {value} has no value mapping")]
    UnsupportedSimple {
        /// The simple value.
        value: u8,
    },

    /// Floats must be numbers.
    #[error("NaN cannot be encoded")]
    NaNForbidden,

    /// A text item is not valid UTF-8.
    #[error("text item is not valid UTF-8")]
    InvalidUtf8,

    /// An integer does not fit 64 signed bits.
    #[error("integer out of range")]
    IntegerOverflow,

    /// A length prefix is larger than the decoder accepts.
    #[error("length {claimed} exceeds the limit of {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the input.
        claimed: u64,
        /// Largest length accepted.
        max_allowed: u64,
    },

    /// A decimal mantissa does not fit the wire form.
    #[error("decimal {literal} does not fit a 64-bit mantissa")]
    MantissaOverflow {
        /// The decimal.
        literal: String,
    },

    /// A text literal is not a decimal number.
    #[error("invalid decimal literal: {literal}")]
    InvalidDecimal {
        /// The rejected literal.
        literal: String,
    },

    /// A byte string on the JSON wire is not base64.
    #[error("invalid base64: {message}")]
    InvalidBase64 {
        /// Decoder message.
        message: String,
    },

    /// A JSON token does not fit the expected value kind.
    #[error("cannot convert JSON {found} to {expected}")]
    JsonMismatch {
        /// Value kind asked for.
        expected: &'static str,
        /// Short description of the token found.
        found: String,
    },
}

impl CodecError {
    /// Malformed CBOR.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Unparsable decimal literal.
    pub fn invalid_decimal(literal: impl Into<String>) -> Self {
        Self::InvalidDecimal {
            literal: literal.into(),
        }
    }

    /// JSON token of the wrong shape for `expected`.
    pub fn json_mismatch(expected: &'static str, found: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        let found = match found {
            Json::Number(n) => format!("number {n}"),
            Json::Null => "null".into(),
            Json::Bool(_) => "bool".into(),
            Json::String(_) => "string".into(),
            Json::Array(_) => "array".into(),
            Json::Object(_) => "object".into(),
        };
        Self::JsonMismatch { expected, found }
    }
}
