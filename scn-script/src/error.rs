use scn_nls::Encoding;

use crate::signature::Signature;
use crate::value::ValueKind;

/// Everything that can stop one blob's decode -> edit -> encode cycle.
///
/// All variants are local to a single blob. Batch drivers report them and
/// move on to the next file.
#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error("truncated input: need {need} byte(s) at 0x{offset:X}, buffer length 0x{len:X}")]
    TruncatedInput { offset: usize, need: usize, len: usize },

    #[error("unterminated string starting at 0x{offset:X}")]
    UnterminatedString { offset: usize },

    #[error("malformed {encoding} text at 0x{offset:X}")]
    Undecodable { offset: usize, encoding: Encoding },

    #[error("text not representable in {encoding}: {text:?}")]
    Unencodable { text: String, encoding: Encoding },

    #[error("unknown opcode 0x{byte:02X} at 0x{offset:X}")]
    UnknownSignature { byte: u8, offset: usize },

    #[error("repeat count field [{index}] is not an integer: {found}")]
    InvalidRepeatCount { index: isize, found: String },

    #[error("{kind} value out of range: {value}")]
    OutOfRange { kind: ValueKind, value: String },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: ValueKind },

    #[error("malformed value literal {literal:?}: {reason}")]
    InvalidLiteral { literal: String, reason: String },

    #[error("opcode [{signature}] has no field {index}")]
    MissingField { signature: Signature, index: usize },

    #[error("opcode [{signature}] expects {expected} field(s), found {found}")]
    FieldCount {
        signature: Signature,
        expected: usize,
        found: usize,
    },

    #[error("{file}: opcode [{signature}] references missing offset {old_offset}")]
    DanglingReference {
        file: String,
        signature: Signature,
        old_offset: i64,
    },

    #[error("opcode [{signature}] at 0x{offset:X}: {source}")]
    Malformed {
        signature: Signature,
        offset: usize,
        #[source]
        source: Box<ScriptError>,
    },

    #[error("line-break record {index} follows [{previous}], expected one of [{allowed}]")]
    UnexpectedLineBreak {
        index: usize,
        previous: String,
        allowed: String,
    },

    #[error("invalid signature table: {0}")]
    Table(String),
}

pub type Result<T> = std::result::Result<T, ScriptError>;
