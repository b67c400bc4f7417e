//! Fixed-point decimal value.

use crate::error::{CodecError, CodecResult};
use std::fmt;
use std::str::FromStr;

/// Largest scale a decimal may carry.
pub const MAX_SCALE: u32 = 28;

/// An exact decimal number: `mantissa * 10^-scale`.
///
/// Decimals are kept normalized (no trailing zeros in the fractional part),
/// so `1.50` and `1.5` compare equal with the derived `PartialEq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Zero.
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// Creates a decimal from a mantissa and scale, normalizing it.
    ///
    /// # Errors
    ///
    /// Returns an error if `scale` exceeds [`MAX_SCALE`].
    pub fn new(mantissa: i128, scale: u32) -> CodecResult<Self> {
        if scale > MAX_SCALE {
            return Err(CodecError::invalid_decimal(format!(
                "{mantissa}e-{scale}"
            )));
        }
        Ok(Self { mantissa, scale }.normalized())
    }

    /// Creates a whole-number decimal.
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self {
            mantissa: value as i128,
            scale: 0,
        }
    }

    /// Returns the unscaled mantissa.
    #[must_use]
    pub const fn mantissa(&self) -> i128 {
        self.mantissa
    }

    /// Returns the number of fractional digits.
    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Lossy conversion to a float.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }

    /// Rescales both operands to a common scale for comparison.
    fn aligned(&self, other: &Self) -> Option<(i128, i128)> {
        let scale = self.scale.max(other.scale);
        let a = self
            .mantissa
            .checked_mul(10i128.checked_pow(scale - self.scale)?)?;
        let b = other
            .mantissa
            .checked_mul(10i128.checked_pow(scale - other.scale)?)?;
        Some((a, b))
    }

    fn normalized(mut self) -> Self {
        if self.mantissa == 0 {
            self.scale = 0;
            return self;
        }
        while self.scale > 0 && self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.scale -= 1;
        }
        self
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        let (a, b) = self.aligned(other)?;
        Some(a.cmp(&b))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int}.{frac}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

impl FromStr for Decimal {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let literal = s.trim();
        let (negative, body) = match literal.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, literal.strip_prefix('+').unwrap_or(literal)),
        };
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(CodecError::invalid_decimal(s));
        }
        if !int.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(CodecError::invalid_decimal(s));
        }

        let mut mantissa: i128 = 0;
        for c in int.chars().chain(frac.chars()) {
            let digit = i128::from(c as u8 - b'0');
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(digit))
                .ok_or_else(|| CodecError::invalid_decimal(s))?;
        }
        if negative {
            mantissa = -mantissa;
        }
        let scale = u32::try_from(frac.len()).map_err(|_| CodecError::invalid_decimal(s))?;
        Decimal::new(mantissa, scale)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}
