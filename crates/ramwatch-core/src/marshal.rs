//! Conversion between raw memory cells and typed values.
//!
//! Range policy, applied silently on every write:
//!
//! | Kind | Out-of-range policy |
//! |------|---------------------|
//! | integers | round half away from zero, then wrap modulo 2^(8*width) |
//! | `f32`/`f64` | finite values saturate to `±MAX`; explicit `inf`/`nan` pass through |
//!
//! Writing 256 to a `u8` therefore stores 0, and -1 stores `0xFF`, which is
//! what the console hardware does when a register is truncated.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::memory::Endianness;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("'{text}' is not a valid {kind} value")]
    Parse { kind: ValueKind, text: String },

    #[error("{kind} needs {expected} bytes, got {actual}")]
    Width {
        kind: ValueKind,
        expected: usize,
        actual: usize,
    },
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[serde(try_from = "String", into = "String")]
#[strum(ascii_case_insensitive)]
pub enum ValueKind {
    #[strum(to_string = "s8", serialize = "sbyte", serialize = "i8")]
    I8,
    #[strum(to_string = "u8", serialize = "byte")]
    U8,
    #[strum(to_string = "s16", serialize = "short", serialize = "i16")]
    I16,
    #[strum(to_string = "u16", serialize = "ushort")]
    U16,
    #[strum(to_string = "s32", serialize = "int", serialize = "i32")]
    I32,
    #[strum(to_string = "u32", serialize = "uint")]
    U32,
    #[strum(to_string = "s64", serialize = "long", serialize = "i64")]
    I64,
    #[strum(to_string = "u64", serialize = "ulong")]
    U64,
    #[strum(to_string = "f32", serialize = "float")]
    F32,
    #[strum(to_string = "f64", serialize = "double")]
    F64,
}

impl TryFrom<String> for ValueKind {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ValueKind> for String {
    fn from(kind: ValueKind) -> Self {
        kind.to_string()
    }
}

impl ValueKind {
    /// Size of the memory cell in bytes
    pub fn width(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn bits(&self) -> u32 {
        self.width() as u32 * 8
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::F32 | Self::F64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// All-ones pattern covering the cell
    pub fn cell_mask(&self) -> u64 {
        match self.bits() {
            64 => u64::MAX,
            bits => (1u64 << bits) - 1,
        }
    }

    pub fn short_name(&self) -> &'static str {
        self.into()
    }
}

/// A decoded memory value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    Single(f32),
    Double(f64),
}

impl Value {
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Single(v) => v as f64,
            Self::Double(v) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signed(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Single(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
        }
    }
}

/// Assemble a cell's bit pattern from bytes in `order`
pub fn to_bits(kind: ValueKind, bytes: &[u8], order: Endianness) -> Result<u64, MarshalError> {
    let width = kind.width();
    if bytes.len() < width {
        return Err(MarshalError::Width {
            kind,
            expected: width,
            actual: bytes.len(),
        });
    }
    let cell = &bytes[..width];
    let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
    Ok(match order {
        Endianness::Big => cell.iter().fold(0, fold),
        Endianness::Little => cell.iter().rev().fold(0, fold),
    })
}

/// Lay out the low `kind.width()` bytes of `bits` in `order`
pub fn from_bits(kind: ValueKind, bits: u64, order: Endianness) -> Vec<u8> {
    let width = kind.width();
    match order {
        Endianness::Big => bits.to_be_bytes()[8 - width..].to_vec(),
        Endianness::Little => bits.to_le_bytes()[..width].to_vec(),
    }
}

/// Reinterpret a cell's bit pattern as a value of `kind`
pub fn value_from_bits(kind: ValueKind, bits: u64) -> Value {
    match kind {
        ValueKind::I8 => Value::Signed(bits as u8 as i8 as i64),
        ValueKind::I16 => Value::Signed(bits as u16 as i16 as i64),
        ValueKind::I32 => Value::Signed(bits as u32 as i32 as i64),
        ValueKind::I64 => Value::Signed(bits as i64),
        ValueKind::U8 | ValueKind::U16 | ValueKind::U32 | ValueKind::U64 => {
            Value::Unsigned(bits & kind.cell_mask())
        }
        ValueKind::F32 => Value::Single(f32::from_bits(bits as u32)),
        ValueKind::F64 => Value::Double(f64::from_bits(bits)),
    }
}

/// Read exactly `kind.width()` bytes and reinterpret them
pub fn decode(kind: ValueKind, bytes: &[u8], order: Endianness) -> Result<Value, MarshalError> {
    to_bits(kind, bytes, order).map(|bits| value_from_bits(kind, bits))
}

/// Parse user text into the bit pattern `kind` would store
pub fn parse_bits(kind: ValueKind, text: &str) -> Result<u64, MarshalError> {
    let parse_error = || MarshalError::Parse {
        kind,
        text: text.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(parse_error());
    }

    if kind.is_float() {
        let value: f64 = trimmed.parse().map_err(|_| parse_error())?;
        let value = if value.is_infinite() && !is_explicit_infinity(trimmed) {
            // Overflowed while parsing, e.g. "1e400"
            value.signum() * f64::MAX
        } else {
            value
        };
        return Ok(float_bits(kind, value));
    }

    if let Some(value) = parse_integer(trimmed) {
        return Ok(wrap_integer(kind, value));
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(round_and_wrap(kind, value)),
        _ => Err(parse_error()),
    }
}

/// Encode user text for `kind`
pub fn encode_text(kind: ValueKind, text: &str, order: Endianness) -> Result<Vec<u8>, MarshalError> {
    parse_bits(kind, text).map(|bits| from_bits(kind, bits, order))
}

/// Bit pattern for a computed value, rounding and wrapping integers
///
/// Non-finite values written to integer kinds store 0.
pub fn numeric_bits(kind: ValueKind, value: f64) -> u64 {
    if kind.is_float() {
        float_bits(kind, value)
    } else if value.is_finite() {
        round_and_wrap(kind, value)
    } else {
        0
    }
}

/// Encode a computed value for `kind`
pub fn encode_numeric(kind: ValueKind, value: f64, order: Endianness) -> Vec<u8> {
    from_bits(kind, numeric_bits(kind, value), order)
}

fn is_explicit_infinity(text: &str) -> bool {
    let unsigned = text.trim_start_matches(['+', '-']);
    unsigned.to_ascii_lowercase().starts_with("inf")
}

fn parse_integer(text: &str) -> Option<i128> {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => unsigned.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn wrap_integer(kind: ValueKind, value: i128) -> u64 {
    (value as u128 as u64) & kind.cell_mask()
}

fn round_and_wrap(kind: ValueKind, value: f64) -> u64 {
    let rounded = value.round();
    if rounded.abs() < 1e38 {
        wrap_integer(kind, rounded as i128)
    } else {
        let modulus = 2f64.powi(kind.bits() as i32);
        rounded.rem_euclid(modulus) as u64 & kind.cell_mask()
    }
}

fn float_bits(kind: ValueKind, value: f64) -> u64 {
    match kind {
        ValueKind::F32 => {
            let single = if value.is_finite() {
                value.clamp(-(f32::MAX as f64), f32::MAX as f64) as f32
            } else {
                value as f32
            };
            single.to_bits() as u64
        }
        _ => value.to_bits(),
    }
}
