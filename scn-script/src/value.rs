use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, ScriptError};

/// Wire kind of a decoded field.
///
/// The kind fixes both the byte width and the signedness used to re-encode
/// the value. A value never changes kind across a round trip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    /// NUL-terminated text in the blob's legacy encoding.
    Str,
    Bytes,
}

impl ValueKind {
    pub const ALL: [ValueKind; 8] = [
        ValueKind::U8,
        ValueKind::U16,
        ValueKind::U32,
        ValueKind::I8,
        ValueKind::I16,
        ValueKind::I32,
        ValueKind::Str,
        ValueKind::Bytes,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::I8 => "i8",
            ValueKind::I16 => "i16",
            ValueKind::I32 => "i32",
            ValueKind::Str => "str",
            ValueKind::Bytes => "bytes",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Fixed wire width, `None` for variable-length kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            ValueKind::U8 | ValueKind::I8 => Some(1),
            ValueKind::U16 | ValueKind::I16 => Some(2),
            ValueKind::U32 | ValueKind::I32 => Some(4),
            ValueKind::Str | ValueKind::Bytes => None,
        }
    }

    pub fn is_integer(self) -> bool {
        self.width().is_some()
    }

    /// Inclusive numeric range of an integer kind.
    pub fn range(self) -> Option<(i64, i64)> {
        match self {
            ValueKind::U8 => Some((0, u8::MAX as i64)),
            ValueKind::U16 => Some((0, u16::MAX as i64)),
            ValueKind::U32 => Some((0, u32::MAX as i64)),
            ValueKind::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            ValueKind::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            ValueKind::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            ValueKind::Str | ValueKind::Bytes => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded field that remembers its wire kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaggedValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    I16(i16),
    I32(i32),
    Str(String),
    Bytes(Vec<u8>),
}

impl TaggedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TaggedValue::U8(_) => ValueKind::U8,
            TaggedValue::U16(_) => ValueKind::U16,
            TaggedValue::U32(_) => ValueKind::U32,
            TaggedValue::I8(_) => ValueKind::I8,
            TaggedValue::I16(_) => ValueKind::I16,
            TaggedValue::I32(_) => ValueKind::I32,
            TaggedValue::Str(_) => ValueKind::Str,
            TaggedValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match *self {
            TaggedValue::U8(v) => Some(v as i64),
            TaggedValue::U16(v) => Some(v as i64),
            TaggedValue::U32(v) => Some(v as i64),
            TaggedValue::I8(v) => Some(v as i64),
            TaggedValue::I16(v) => Some(v as i64),
            TaggedValue::I32(v) => Some(v as i64),
            TaggedValue::Str(_) | TaggedValue::Bytes(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TaggedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Build an integer value of `kind`, validating the range of the kind.
    pub fn from_integer(kind: ValueKind, value: i64) -> Result<Self> {
        let mismatch = || ScriptError::TypeMismatch {
            expected: "integer kind".to_string(),
            found: kind,
        };
        let (lo, hi) = kind.range().ok_or_else(mismatch)?;
        if value < lo || value > hi {
            return Err(ScriptError::OutOfRange {
                kind,
                value: value.to_string(),
            });
        }
        // The range check above makes every cast lossless.
        Ok(match kind {
            ValueKind::U8 => TaggedValue::U8(value as u8),
            ValueKind::U16 => TaggedValue::U16(value as u16),
            ValueKind::U32 => TaggedValue::U32(value as u32),
            ValueKind::I8 => TaggedValue::I8(value as i8),
            ValueKind::I16 => TaggedValue::I16(value as i16),
            ValueKind::I32 => TaggedValue::I32(value as i32),
            ValueKind::Str | ValueKind::Bytes => return Err(mismatch()),
        })
    }

    /// Replace the payload, keeping the kind.
    pub fn with_integer(&self, value: i64) -> Result<Self> {
        Self::from_integer(self.kind(), value)
    }
}

/// True if plain text would be read back as a tagged literal.
fn looks_tagged(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, _)) => ValueKind::from_tag(prefix).is_some(),
        None => false,
    }
}

pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Parse hex pairs, with or without separating whitespace.
pub fn parse_hex(s: &str) -> std::result::Result<Vec<u8>, String> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in {s:?}"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(text, 16).map_err(|_| format!("invalid hex pair {text:?}"))
        })
        .collect()
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Str(s) if looks_tagged(s) => write!(f, "str:{s}"),
            TaggedValue::Str(s) => f.write_str(s),
            TaggedValue::Bytes(b) => write!(f, "bytes:{}", hex_string(b)),
            other => {
                // integer kinds only
                let v = other.as_integer().unwrap_or_default();
                write!(f, "{}:{}", other.kind(), v)
            }
        }
    }
}

impl FromStr for TaggedValue {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((prefix, rest)) = s.split_once(':') else {
            return Ok(TaggedValue::Str(s.to_string()));
        };
        let Some(kind) = ValueKind::from_tag(prefix) else {
            return Ok(TaggedValue::Str(s.to_string()));
        };
        let invalid = |reason: String| ScriptError::InvalidLiteral {
            literal: s.to_string(),
            reason,
        };
        match kind {
            ValueKind::Str => Ok(TaggedValue::Str(rest.to_string())),
            ValueKind::Bytes => parse_hex(rest).map(TaggedValue::Bytes).map_err(invalid),
            _ => {
                let n: i128 = rest
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| invalid(e.to_string()))?;
                let n = i64::try_from(n).map_err(|_| ScriptError::OutOfRange {
                    kind,
                    value: n.to_string(),
                })?;
                TaggedValue::from_integer(kind, n)
            }
        }
    }
}

impl Serialize for TaggedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaggedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
