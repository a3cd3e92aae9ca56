use std::collections::BTreeMap;

use scn_nls::TextCodec;

use crate::error::Result;
use crate::primitives::{write_expected, write_value};
use crate::record::Record;
use crate::signature::SignatureTable;

/// Original record offset -> offset of the same record in the re-encoded blob.
///
/// Blob-local: build one per encode, never reuse across files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetMap(BTreeMap<usize, usize>);

impl OffsetMap {
    pub fn get(&self, old: usize) -> Option<usize> {
        self.0.get(&old).copied()
    }

    /// First record claiming an old offset keeps it.
    pub fn insert(&mut self, old: usize, new: usize) {
        if let Some(existing) = self.0.get(&old) {
            log::debug!("old offset 0x{old:X} already mapped to 0x{existing:X}, ignoring 0x{new:X}");
            return;
        }
        self.0.insert(old, new);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.0.iter().all(|(old, new)| old == new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&old, &new)| (old, new))
    }
}

/// Serialised records plus the offsets measured while writing them.
#[derive(Debug)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub offsets: OffsetMap,
}

/// Serialises records in field order. Knows nothing about the decoder.
pub struct Encoder<'a> {
    codec: &'a dyn TextCodec,
}

impl<'a> Encoder<'a> {
    pub fn new(codec: &'a dyn TextCodec) -> Self {
        Self { codec }
    }

    pub fn emit_record(&self, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(record.signature.bytes());
        for field in &record.fields {
            write_value(out, field, self.codec)?;
        }
        Ok(())
    }

    /// Emit a record after checking every field against its signature's grammar.
    pub fn emit_conformed(&self, table: &SignatureTable, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        let mut body = Vec::new();
        table.walk_fields(record, |field, kind| write_expected(&mut body, field, kind, self.codec))?;
        out.extend_from_slice(record.signature.bytes());
        out.extend_from_slice(&body);
        Ok(())
    }

    pub fn emit(&self, records: &[Record]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for record in records {
            self.emit_record(record, &mut out)?;
        }
        Ok(out)
    }

    /// Emit all records and record where each one landed. No relocation happens here.
    pub fn measure(&self, records: &[Record]) -> Result<Encoded> {
        let mut bytes = Vec::new();
        let mut offsets = OffsetMap::default();
        for record in records {
            offsets.insert(record.offset, bytes.len());
            self.emit_record(record, &mut bytes)?;
        }
        Ok(Encoded { bytes, offsets })
    }

    /// [`Encoder::measure`] with every record conformed to `table` first.
    pub fn measure_conformed(&self, table: &SignatureTable, records: &[Record]) -> Result<Encoded> {
        let mut bytes = Vec::new();
        let mut offsets = OffsetMap::default();
        for record in records {
            offsets.insert(record.offset, bytes.len());
            self.emit_conformed(table, record, &mut bytes)?;
        }
        Ok(Encoded { bytes, offsets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;
    use crate::signature::{FieldDecoder, Signature};
    use crate::value::TaggedValue;
    use pretty_assertions::assert_eq;
    use scn_nls::{Codec, Encoding};

    fn record(op: &str, offset: usize, fields: Vec<TaggedValue>) -> Record {
        Record {
            signature: Signature::hex(op).unwrap(),
            offset,
            index: 0,
            fields,
        }
    }

    #[test]
    fn measure_tracks_new_offsets() {
        let codec = Codec::new(Encoding::ShiftJis);
        let records = vec![
            record("00", 0, vec![TaggedValue::Str("hi".into())]),
            record("15", 7, vec![]),
            record("06", 8, vec![TaggedValue::U32(7)]),
        ];
        let encoded = Encoder::new(&codec).measure(&records).unwrap();
        assert_eq!(encoded.bytes, vec![0x00, b'h', b'i', 0x00, 0x15, 0x06, 7, 0, 0, 0]);
        assert_eq!(encoded.offsets.iter().collect::<Vec<_>>(), vec![(0, 0), (7, 4), (8, 5)]);
        assert!(!encoded.offsets.is_identity());
    }

    #[test]
    fn duplicate_old_offsets_keep_first() {
        let mut map = OffsetMap::default();
        map.insert(4, 10);
        map.insert(4, 20);
        assert_eq!(map.get(4), Some(10));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn conformed_emission_rejects_retagged_fields() {
        let codec = Codec::new(Encoding::ShiftJis);
        let table = SignatureTable::builder()
            .op(Signature::hex("06").unwrap(), vec![FieldDecoder::U32])
            .build()
            .unwrap();
        let good = record("06", 0, vec![TaggedValue::U32(1)]);
        let bad = record("06", 0, vec![TaggedValue::U16(1)]);
        let encoder = Encoder::new(&codec);

        let mut out = Vec::new();
        encoder.emit_conformed(&table, &good, &mut out).unwrap();
        assert_eq!(out, vec![0x06, 1, 0, 0, 0]);

        let mut out = Vec::new();
        let err = encoder.emit_conformed(&table, &bad, &mut out).unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { .. }));
        assert!(out.is_empty());
    }
}
