//! Fixed-width little-endian readers/writers and NUL-terminated text.
//!
//! Every reader returns the decoded [`TaggedValue`] together with the offset
//! just past the consumed bytes.

use byteorder::{ByteOrder, LittleEndian};
use scn_nls::TextCodec;

use crate::error::{Result, ScriptError};
use crate::value::{TaggedValue, ValueKind};

fn take(buf: &[u8], offset: usize, need: usize) -> Result<&[u8]> {
    offset
        .checked_add(need)
        .filter(|&end| end <= buf.len())
        .map(|end| &buf[offset..end])
        .ok_or(ScriptError::TruncatedInput {
            offset,
            need,
            len: buf.len(),
        })
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 1)?;
    Ok((TaggedValue::U8(b[0]), offset + 1))
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 2)?;
    Ok((TaggedValue::U16(LittleEndian::read_u16(b)), offset + 2))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 4)?;
    Ok((TaggedValue::U32(LittleEndian::read_u32(b)), offset + 4))
}

pub fn read_i8(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 1)?;
    Ok((TaggedValue::I8(b[0] as i8), offset + 1))
}

pub fn read_i16(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 2)?;
    Ok((TaggedValue::I16(LittleEndian::read_i16(b)), offset + 2))
}

pub fn read_i32(buf: &[u8], offset: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, 4)?;
    Ok((TaggedValue::I32(LittleEndian::read_i32(b)), offset + 4))
}

/// Read text up to (and consuming) the next NUL byte.
pub fn read_cstring(
    buf: &[u8],
    offset: usize,
    codec: &dyn TextCodec,
) -> Result<(TaggedValue, usize)> {
    let rest = buf.get(offset..).unwrap_or_default();
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(ScriptError::UnterminatedString { offset })?;
    let text = codec
        .decode(&rest[..len])
        .map_err(|_| ScriptError::Undecodable {
            offset,
            encoding: codec.encoding(),
        })?;
    Ok((TaggedValue::Str(text.into_owned()), offset + len + 1))
}

pub fn read_bytes(buf: &[u8], offset: usize, length: usize) -> Result<(TaggedValue, usize)> {
    let b = take(buf, offset, length)?;
    Ok((TaggedValue::Bytes(b.to_vec()), offset + length))
}

/// Dispatch on a scalar kind. Byte slices need a length and go through [`read_bytes`].
pub fn read_scalar(
    kind: ValueKind,
    buf: &[u8],
    offset: usize,
    codec: &dyn TextCodec,
) -> Result<(TaggedValue, usize)> {
    match kind {
        ValueKind::U8 => read_u8(buf, offset),
        ValueKind::U16 => read_u16(buf, offset),
        ValueKind::U32 => read_u32(buf, offset),
        ValueKind::I8 => read_i8(buf, offset),
        ValueKind::I16 => read_i16(buf, offset),
        ValueKind::I32 => read_i32(buf, offset),
        ValueKind::Str => read_cstring(buf, offset, codec),
        ValueKind::Bytes => Err(ScriptError::TypeMismatch {
            expected: "scalar kind".to_string(),
            found: kind,
        }),
    }
}

/// Emit `value` with exactly the width its kind declares.
pub fn write_value(out: &mut Vec<u8>, value: &TaggedValue, codec: &dyn TextCodec) -> Result<()> {
    match value {
        TaggedValue::U8(v) => out.push(*v),
        TaggedValue::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        TaggedValue::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        TaggedValue::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
        TaggedValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
        TaggedValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
        TaggedValue::Str(s) => {
            if s.contains('\0') {
                return Err(ScriptError::InvalidLiteral {
                    literal: s.clone(),
                    reason: "text may not contain NUL".to_string(),
                });
            }
            let encoded = codec.encode_cstr(s).map_err(|_| ScriptError::Unencodable {
                text: s.clone(),
                encoding: codec.encoding(),
            })?;
            out.extend_from_slice(&encoded);
        }
        TaggedValue::Bytes(b) => out.extend_from_slice(b),
    }
    Ok(())
}

/// Like [`write_value`], but the caller states which kind it expects.
pub fn write_expected(
    out: &mut Vec<u8>,
    value: &TaggedValue,
    expected: ValueKind,
    codec: &dyn TextCodec,
) -> Result<()> {
    if value.kind() != expected {
        return Err(ScriptError::TypeMismatch {
            expected: expected.to_string(),
            found: value.kind(),
        });
    }
    write_value(out, value, codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scn_nls::{Codec, Encoding};

    fn sjis() -> Codec {
        Codec::new(Encoding::ShiftJis)
    }

    #[test]
    fn little_endian_integers() {
        let buf = [0x34, 0x12, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_u16(&buf, 0).unwrap(), (TaggedValue::U16(0x1234), 2));
        assert_eq!(read_i32(&buf, 2).unwrap(), (TaggedValue::I32(-1), 6));
        assert_eq!(read_u32(&buf, 2).unwrap(), (TaggedValue::U32(u32::MAX), 6));
        assert_eq!(read_i8(&buf, 5).unwrap(), (TaggedValue::I8(-1), 6));
    }

    #[test]
    fn truncated_reads_fail() {
        let buf = [0x01, 0x02, 0x03];
        let err = read_u32(&buf, 0).unwrap_err();
        assert!(matches!(err, ScriptError::TruncatedInput { offset: 0, need: 4, len: 3 }));
        assert!(matches!(read_u8(&buf, 3), Err(ScriptError::TruncatedInput { .. })));
        assert!(matches!(read_bytes(&buf, 2, 2), Err(ScriptError::TruncatedInput { .. })));
        assert!(matches!(read_u16(&buf, usize::MAX), Err(ScriptError::TruncatedInput { .. })));
    }

    #[test]
    fn cstring_consumes_terminator() {
        let buf = b"\x00hello\x00\x15";
        let (v, next) = read_cstring(buf, 1, &sjis()).unwrap();
        assert_eq!(v, TaggedValue::Str("hello".into()));
        assert_eq!(next, 7);
    }

    #[test]
    fn cstring_decodes_shift_jis() {
        let buf = [0x82, 0xA0, 0x00];
        let (v, next) = read_cstring(&buf, 0, &sjis()).unwrap();
        assert_eq!(v, TaggedValue::Str("あ".into()));
        assert_eq!(next, 3);
    }

    #[test]
    fn cstring_without_terminator_fails() {
        let err = read_cstring(b"abc", 0, &sjis()).unwrap_err();
        assert!(matches!(err, ScriptError::UnterminatedString { offset: 0 }));
        let err = read_cstring(b"abc", 9, &sjis()).unwrap_err();
        assert!(matches!(err, ScriptError::UnterminatedString { offset: 9 }));
    }

    #[test]
    fn writers_invert_readers() {
        let codec = sjis();
        let mut out = Vec::new();
        for v in [
            TaggedValue::U8(7),
            TaggedValue::I16(-2),
            TaggedValue::U32(0x0403_0201),
            TaggedValue::Str("あ".into()),
            TaggedValue::Bytes(vec![0xAA]),
        ] {
            write_value(&mut out, &v, &codec).unwrap();
        }
        assert_eq!(
            out,
            vec![0x07, 0xFE, 0xFF, 0x01, 0x02, 0x03, 0x04, 0x82, 0xA0, 0x00, 0xAA]
        );
    }

    #[test]
    fn write_expected_rejects_other_kinds() {
        let mut out = Vec::new();
        let err = write_expected(&mut out, &TaggedValue::U16(1), ValueKind::U32, &sjis()).unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { found: ValueKind::U16, .. }));
        assert!(out.is_empty());
    }

    #[test]
    fn unencodable_text_fails() {
        let mut out = Vec::new();
        let err = write_value(&mut out, &TaggedValue::Str("\u{1F600}".into()), &sjis()).unwrap_err();
        assert!(matches!(err, ScriptError::Unencodable { .. }));
    }
}
