//! Rewrites offset-carrying fields after record lengths changed.

use std::collections::HashMap;

use serde::Deserialize;

use scn_nls::TextCodec;

use crate::encode::{Encoder, OffsetMap};
use crate::error::{Result, ScriptError};
use crate::record::Record;
use crate::signature::{Signature, SignatureTable};

/// Which fields of an opcode hold blob-local offsets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceRule {
    /// Every field. Spelled `all` in table files.
    All,
    /// Listed field indices.
    Fields(Vec<usize>),
    /// The `head` indices plus every field from `from` onwards.
    Tail { head: Vec<usize>, from: usize },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRule {
    Keyword(String),
    Fields(Vec<usize>),
    Tail { head: Vec<usize>, from: usize },
}

impl<'de> Deserialize<'de> for ReferenceRule {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match RawRule::deserialize(deserializer)? {
            RawRule::Keyword(keyword) if keyword == "all" => Ok(ReferenceRule::All),
            RawRule::Keyword(keyword) => Err(serde::de::Error::custom(format!(
                "unknown reference rule {keyword:?}"
            ))),
            RawRule::Fields(indices) => Ok(ReferenceRule::Fields(indices)),
            RawRule::Tail { head, from } => Ok(ReferenceRule::Tail { head, from }),
        }
    }
}

impl ReferenceRule {
    /// Field indices to relocate for a record with `field_count` fields.
    pub fn indices(&self, field_count: usize) -> Vec<usize> {
        match self {
            ReferenceRule::Fields(indices) => indices.clone(),
            ReferenceRule::Tail { head, from } => {
                let mut indices = head.clone();
                indices.extend((*from..field_count).filter(|i| !head.contains(i)));
                indices
            }
            ReferenceRule::All => (0..field_count).collect(),
        }
    }
}

/// Opcodes known to carry offsets. Read-only after construction.
#[derive(Clone, Debug, Default)]
pub struct ReferenceTable {
    rules: HashMap<Signature, ReferenceRule>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, signature: impl Into<Signature>, rule: ReferenceRule) -> Self {
        self.rules.insert(signature.into(), rule);
        self
    }

    pub fn insert(&mut self, signature: Signature, rule: ReferenceRule) {
        self.rules.insert(signature, rule);
    }

    pub fn rule(&self, signature: &Signature) -> Option<&ReferenceRule> {
        self.rules.get(signature)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Map every reference field through `offsets`, keeping each field's kind.
    ///
    /// Returns the number of fields rewritten. On error the records may be
    /// partially rewritten and must be discarded.
    pub fn relocate(&self, file: &str, records: &mut [Record], offsets: &OffsetMap) -> Result<usize> {
        let mut patched = 0;
        for record in records.iter_mut() {
            let Some(rule) = self.rules.get(&record.signature) else {
                continue;
            };
            for index in rule.indices(record.fields.len()) {
                let field = record.fields.get(index).ok_or_else(|| ScriptError::MissingField {
                    signature: record.signature.clone(),
                    index,
                })?;
                let old = field.as_integer().ok_or_else(|| ScriptError::TypeMismatch {
                    expected: "integer offset".to_string(),
                    found: field.kind(),
                })?;
                let new = usize::try_from(old)
                    .ok()
                    .and_then(|old| offsets.get(old))
                    .ok_or_else(|| ScriptError::DanglingReference {
                        file: file.to_string(),
                        signature: record.signature.clone(),
                        old_offset: old,
                    })?;
                let new = i64::try_from(new).map_err(|_| ScriptError::OutOfRange {
                    kind: field.kind(),
                    value: new.to_string(),
                })?;
                log::trace!("{file}: [{}] #{} field {index}: {old} -> {new}", record.signature, record.index);
                record.fields[index] = field.with_integer(new)?;
                patched += 1;
            }
        }
        Ok(patched)
    }
}

/// Two-pass encode: measure new offsets, patch references, then write.
///
/// Relocation only rewrites values in place, never widths, so the offsets
/// measured in the first pass hold for the second.
pub struct Reassembler<'a> {
    references: &'a ReferenceTable,
    table: Option<&'a SignatureTable>,
    codec: &'a dyn TextCodec,
}

impl<'a> Reassembler<'a> {
    pub fn new(references: &'a ReferenceTable, codec: &'a dyn TextCodec) -> Self {
        Self {
            references,
            table: None,
            codec,
        }
    }

    /// Check every record against `table` before writing it.
    pub fn conformed(mut self, table: &'a SignatureTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn reassemble(&self, file: &str, mut records: Vec<Record>) -> Result<Vec<u8>> {
        let encoder = Encoder::new(self.codec);
        let measured = match self.table {
            Some(table) => encoder.measure_conformed(table, &records)?,
            None => encoder.measure(&records)?,
        };
        if measured.offsets.is_identity() {
            log::debug!("{file}: layout unchanged");
        }
        let patched = self.references.relocate(file, &mut records, &measured.offsets)?;
        log::debug!("{file}: {} records, {patched} references rewritten", records.len());
        if patched == 0 {
            return Ok(measured.bytes);
        }
        encoder.emit(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TaggedValue, ValueKind};
    use pretty_assertions::assert_eq;

    fn sig(s: &str) -> Signature {
        Signature::hex(s).unwrap()
    }

    fn record(op: &str, offset: usize, fields: Vec<TaggedValue>) -> Record {
        Record {
            signature: sig(op),
            offset,
            index: 0,
            fields,
        }
    }

    fn offsets(pairs: &[(usize, usize)]) -> OffsetMap {
        let mut map = OffsetMap::default();
        for &(old, new) in pairs {
            map.insert(old, new);
        }
        map
    }

    #[test]
    fn rule_indices() {
        assert_eq!(ReferenceRule::Fields(vec![0, 3]).indices(10), vec![0, 3]);
        assert_eq!(ReferenceRule::All.indices(3), vec![0, 1, 2]);
        assert_eq!(
            ReferenceRule::Tail { head: vec![0], from: 4 }.indices(6),
            vec![0, 4, 5]
        );
        assert_eq!(
            ReferenceRule::Tail { head: vec![0, 4], from: 4 }.indices(5),
            vec![0, 4]
        );
    }

    #[test]
    fn rules_from_yaml() {
        let rules: Vec<ReferenceRule> =
            serde_yaml::from_str("- all\n- [0, 3]\n- { head: [0], from: 4 }\n").unwrap();
        assert_eq!(
            rules,
            vec![
                ReferenceRule::All,
                ReferenceRule::Fields(vec![0, 3]),
                ReferenceRule::Tail { head: vec![0], from: 4 },
            ]
        );
        assert!(serde_yaml::from_str::<ReferenceRule>("some").is_err());
    }

    #[test]
    fn relocates_and_keeps_kind() {
        let table = ReferenceTable::new()
            .with(sig("06"), ReferenceRule::All)
            .with(sig("15 FF"), ReferenceRule::Fields(vec![0]));
        let mut records = vec![
            record("06", 0, vec![TaggedValue::U32(20)]),
            record("15 FF", 5, vec![TaggedValue::U16(0), TaggedValue::U16(20)]),
            record("00", 20, vec![TaggedValue::Str("x".into())]),
        ];
        let map = offsets(&[(0, 0), (5, 5), (20, 17)]);
        let patched = table.relocate("a.bin", &mut records, &map).unwrap();
        assert_eq!(patched, 2);
        assert_eq!(records[0].fields, vec![TaggedValue::U32(17)]);
        // Only field 0 of "15 FF" is an offset.
        assert_eq!(records[1].fields, vec![TaggedValue::U16(0), TaggedValue::U16(20)]);
    }

    #[test]
    fn dangling_reference_names_file_opcode_and_offset() {
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::All);
        let mut records = vec![record("06", 0, vec![TaggedValue::U32(3)])];
        let err = table
            .relocate("scene/001", &mut records, &offsets(&[(0, 0)]))
            .unwrap_err();
        match err {
            ScriptError::DanglingReference { file, signature, old_offset } => {
                assert_eq!(file, "scene/001");
                assert_eq!(signature, sig("06"));
                assert_eq!(old_offset, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn negative_reference_is_dangling() {
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::All);
        let mut records = vec![record("06", 0, vec![TaggedValue::I32(-1)])];
        let err = table.relocate("f", &mut records, &offsets(&[(0, 0)])).unwrap_err();
        assert!(matches!(err, ScriptError::DanglingReference { old_offset: -1, .. }));
    }

    #[test]
    fn narrow_reference_overflow_is_out_of_range() {
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::All);
        let mut records = vec![record("06", 0, vec![TaggedValue::U8(0)])];
        let err = table.relocate("f", &mut records, &offsets(&[(0, 300)])).unwrap_err();
        assert!(matches!(err, ScriptError::OutOfRange { kind: ValueKind::U8, .. }));
    }

    #[test]
    fn text_reference_is_type_mismatch() {
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::Fields(vec![0]));
        let mut records = vec![record("06", 0, vec![TaggedValue::Str("x".into())])];
        let err = table.relocate("f", &mut records, &offsets(&[(0, 0)])).unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { found: ValueKind::Str, .. }));
    }

    #[test]
    fn missing_reference_field() {
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::Fields(vec![2]));
        let mut records = vec![record("06", 0, vec![TaggedValue::U32(0)])];
        let err = table.relocate("f", &mut records, &offsets(&[(0, 0)])).unwrap_err();
        assert!(matches!(err, ScriptError::MissingField { index: 2, .. }));
    }

    #[test]
    fn reassemble_shrinks_and_patches() {
        use scn_nls::{Codec, Encoding};
        let codec = Codec::new(Encoding::Utf8);
        let table = ReferenceTable::new().with(sig("06"), ReferenceRule::All);
        let records = vec![
            record("06", 0, vec![TaggedValue::U32(11)]),
            record("00", 5, vec![TaggedValue::Str("hi".into())]),
            record("15", 11, vec![]),
        ];
        // "hello" became "hi": the terminator moves from 11 to 8.
        let bytes = Reassembler::new(&table, &codec).reassemble("f", records).unwrap();
        assert_eq!(bytes, vec![0x06, 8, 0, 0, 0, 0x00, b'h', b'i', 0, 0x15]);
    }
}
