//! Number literals given on the command line.
//!
//! A literal keeps the exact bit pattern of its value together with its kind,
//! so `1.5f` and `1.5d` never compare equal: the search engine matches numbers
//! by bit pattern, not by numeric value.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::error::ParseError;

static HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?0x[0-9a-f]+$").expect("valid hex literal regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LiteralKind {
    Integer,
    Float,
    Double,
}

/// Decoded value of a literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    Integer(i64),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, Serialize)]
pub struct NumericLiteral {
    raw: String,
    kind: LiteralKind,
    bits: u64,
}

impl NumericLiteral {
    pub fn integer(value: i64) -> Self {
        Self::with_raw(value.to_string(), LiteralKind::Integer, value as u64)
    }

    fn with_raw(raw: String, kind: LiteralKind, bits: u64) -> Self {
        Self { raw, kind, bits }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> LiteralKind {
        self.kind
    }

    /// IEEE-754 pattern for floating kinds (32-bit patterns are zero-extended),
    /// two's complement for integers.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn value(&self) -> NumberValue {
        match self.kind {
            LiteralKind::Integer => NumberValue::Integer(self.bits as i64),
            LiteralKind::Float => NumberValue::Float(f32::from_bits(self.bits as u32)),
            LiteralKind::Double => NumberValue::Double(f64::from_bits(self.bits)),
        }
    }
}

impl PartialEq for NumericLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.bits == other.bits
    }
}

impl Eq for NumericLiteral {}

impl std::hash::Hash for NumericLiteral {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.bits.hash(state);
    }
}

impl fmt::Display for NumericLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            NumberValue::Integer(v) => write!(f, "{v}"),
            NumberValue::Float(v) => write!(f, "{v}f"),
            NumberValue::Double(v) => write!(f, "{v}d"),
        }
    }
}

/// Parses one literal token.
///
/// Rules, first match wins after lower-casing and dropping one trailing `l`:
/// hex (`0x1f`, signed) is an integer; a trailing `f` is a float; a trailing
/// `d` or any `.` is a double; anything else is a signed 64-bit integer.
/// The `l` marker is only accepted on integer forms.
pub fn parse_literal(text: &str) -> Result<NumericLiteral, ParseError> {
    let invalid = || ParseError::InvalidLiteral(text.to_string());
    let lower = text.trim().to_lowercase();
    let (num, long_marker) = match lower.strip_suffix('l') {
        Some(rest) => (rest, true),
        None => (lower.as_str(), false),
    };

    if HEX.is_match(num) {
        let digits = num.replacen("0x", "", 1);
        let value = i64::from_str_radix(&digits, 16).map_err(|_| invalid())?;
        return Ok(NumericLiteral::with_raw(
            text.to_string(),
            LiteralKind::Integer,
            value as u64,
        ));
    }

    let is_float = num.ends_with('f');
    let is_double = !is_float && (num.ends_with('d') || num.contains('.'));
    if long_marker && (is_float || is_double) {
        return Err(invalid());
    }

    if is_float {
        let body = &num[..num.len() - 1];
        let value: f32 = parse_decimal(body).ok_or_else(invalid)?;
        return Ok(NumericLiteral::with_raw(
            text.to_string(),
            LiteralKind::Float,
            u64::from(value.to_bits()),
        ));
    }

    if is_double {
        let body = num.strip_suffix('d').unwrap_or(num);
        let value: f64 = parse_decimal(body).ok_or_else(invalid)?;
        return Ok(NumericLiteral::with_raw(
            text.to_string(),
            LiteralKind::Double,
            value.to_bits(),
        ));
    }

    let value: i64 = num.parse().map_err(|_| invalid())?;
    Ok(NumericLiteral::with_raw(
        text.to_string(),
        LiteralKind::Integer,
        value as u64,
    ))
}

pub fn parse_literals<S: AsRef<str>>(texts: &[S]) -> Result<Vec<NumericLiteral>, ParseError> {
    texts.iter().map(|t| parse_literal(t.as_ref())).collect()
}

// `inf`/`nan` spellings are not literals; overflow to infinity is.
fn parse_decimal<T: std::str::FromStr>(body: &str) -> Option<T> {
    if body.chars().any(|c| c.is_ascii_alphabetic() && c != 'e') {
        return None;
    }
    body.parse().ok()
}
