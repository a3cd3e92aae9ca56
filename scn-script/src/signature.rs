//! Opcode signatures and the table that maps them to field decoders.
//!
//! Tables are authored as nested groups (shared prefixes, an optional
//! `default` entry for the bare prefix) and flattened once into a single
//! signature -> decoder list mapping.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, ScriptError};
use crate::record::Record;
use crate::value::{hex_string, parse_hex, TaggedValue, ValueKind};

/// The byte sequence that identifies an opcode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse space-separated hex pairs, e.g. `"10 FF 00 05"`.
    pub fn hex(s: &str) -> Result<Self> {
        s.parse()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn concat(&self, tail: &Signature) -> Signature {
        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&tail.0);
        Signature(bytes)
    }
}

impl From<&[u8]> for Signature {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for Signature {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_string(&self.0))
    }
}

impl FromStr for Signature {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = parse_hex(s).map_err(|reason| ScriptError::InvalidLiteral {
            literal: s.to_string(),
            reason,
        })?;
        if bytes.is_empty() {
            return Err(ScriptError::InvalidLiteral {
                literal: s.to_string(),
                reason: "empty signature".to_string(),
            });
        }
        Ok(Signature(bytes))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// One step of a record's field grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldDecoder {
    /// A single integer or NUL-terminated string.
    Scalar(ValueKind),
    /// A raw slice of a literal length.
    Slice(usize),
    /// `inner` applied a literal number of times.
    Repeat { inner: Box<FieldDecoder>, count: usize },
    /// `inner` applied as many times as an earlier field of the same record says.
    /// Negative indices count from the end of the fields decoded so far.
    RepeatBy { inner: Box<FieldDecoder>, field: isize },
    /// Stop decoding the blob after this record.
    End,
}

impl FieldDecoder {
    pub const U8: FieldDecoder = FieldDecoder::Scalar(ValueKind::U8);
    pub const U16: FieldDecoder = FieldDecoder::Scalar(ValueKind::U16);
    pub const U32: FieldDecoder = FieldDecoder::Scalar(ValueKind::U32);
    pub const I8: FieldDecoder = FieldDecoder::Scalar(ValueKind::I8);
    pub const I16: FieldDecoder = FieldDecoder::Scalar(ValueKind::I16);
    pub const I32: FieldDecoder = FieldDecoder::Scalar(ValueKind::I32);
    pub const STR: FieldDecoder = FieldDecoder::Scalar(ValueKind::Str);

    pub fn slice(len: usize) -> Self {
        FieldDecoder::Slice(len)
    }

    pub fn repeat(self, count: usize) -> Self {
        FieldDecoder::Repeat {
            inner: Box::new(self),
            count,
        }
    }

    pub fn repeat_by(self, field: isize) -> Self {
        FieldDecoder::RepeatBy {
            inner: Box::new(self),
            field,
        }
    }
}

impl fmt::Display for FieldDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDecoder::Scalar(kind) => write!(f, "{kind}"),
            FieldDecoder::Slice(len) => write!(f, "bytes({len})"),
            FieldDecoder::Repeat { inner, count } => write!(f, "{inner}*{count}"),
            FieldDecoder::RepeatBy { inner, field } => write!(f, "{inner}*[{field}]"),
            FieldDecoder::End => f.write_str("end"),
        }
    }
}

impl FromStr for FieldDecoder {
    type Err = ScriptError;

    /// `base ('*' N | '*[' I ']')*` where base is a kind tag, `bytes(N)` or `end`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| ScriptError::Table(format!("field decoder {s:?}: {reason}"));

        let mut parts = s.trim().split('*');
        let base = parts.next().unwrap_or_default().trim();
        let mut decoder = if base == "end" {
            FieldDecoder::End
        } else if let Some(len) = base.strip_prefix("bytes(").and_then(|r| r.strip_suffix(')')) {
            let len = len.trim().parse().map_err(|_| invalid("bad slice length"))?;
            FieldDecoder::Slice(len)
        } else {
            match ValueKind::from_tag(base) {
                Some(ValueKind::Bytes) => return Err(invalid("bytes needs a length, use bytes(N)")),
                Some(kind) => FieldDecoder::Scalar(kind),
                None => return Err(invalid("unknown kind")),
            }
        };

        for suffix in parts {
            let suffix = suffix.trim();
            decoder = match suffix.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                Some(index) => {
                    let field = index.trim().parse().map_err(|_| invalid("bad field index"))?;
                    decoder.repeat_by(field)
                }
                None => {
                    let count = suffix.parse().map_err(|_| invalid("bad repeat count"))?;
                    decoder.repeat(count)
                }
            };
        }
        Ok(decoder)
    }
}

/// Resolve a context-dependent repeat count from the fields decoded so far.
pub(crate) fn repeat_count(context: &[TaggedValue], field: isize) -> Result<usize> {
    let position = if field < 0 {
        context.len().checked_sub(field.unsigned_abs())
    } else {
        Some(field as usize)
    };
    let value = position.and_then(|i| context.get(i));
    let invalid = |found: String| ScriptError::InvalidRepeatCount {
        index: field,
        found,
    };
    match value {
        None => Err(invalid("<missing>".to_string())),
        Some(v) => match v.as_integer() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(invalid(v.to_string())),
        },
    }
}

/// Authoring form of a table entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TableNode {
    Fields(Vec<FieldDecoder>),
    Group(Vec<(GroupKey, TableNode)>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupKey {
    /// Appended to the enclosing prefix.
    Prefix(Signature),
    /// Decoders for the enclosing prefix itself.
    Default,
}

#[derive(Debug, Default)]
pub struct TableBuilder {
    root: Vec<(Signature, TableNode)>,
}

impl TableBuilder {
    pub fn op(mut self, signature: impl Into<Signature>, fields: Vec<FieldDecoder>) -> Self {
        self.root.push((signature.into(), TableNode::Fields(fields)));
        self
    }

    pub fn node(mut self, signature: impl Into<Signature>, node: TableNode) -> Self {
        self.root.push((signature.into(), node));
        self
    }

    pub fn build(self) -> Result<SignatureTable> {
        SignatureTable::from_entries(flatten(&self.root)?)
    }
}

/// Flatten nested groups into one signature -> decoders mapping.
pub fn flatten(root: &[(Signature, TableNode)]) -> Result<BTreeMap<Signature, Vec<FieldDecoder>>> {
    fn insert(
        out: &mut BTreeMap<Signature, Vec<FieldDecoder>>,
        signature: Signature,
        fields: &[FieldDecoder],
    ) -> Result<()> {
        if signature.is_empty() {
            return Err(ScriptError::Table("empty signature".to_string()));
        }
        if out.contains_key(&signature) {
            return Err(ScriptError::Table(format!("duplicate signature [{signature}]")));
        }
        out.insert(signature, fields.to_vec());
        Ok(())
    }

    fn walk(
        out: &mut BTreeMap<Signature, Vec<FieldDecoder>>,
        prefix: Signature,
        node: &TableNode,
    ) -> Result<()> {
        match node {
            TableNode::Fields(fields) => insert(out, prefix, fields),
            TableNode::Group(children) => {
                for (key, child) in children {
                    match (key, child) {
                        (GroupKey::Prefix(tail), _) => walk(out, prefix.concat(tail), child)?,
                        (GroupKey::Default, TableNode::Fields(fields)) => {
                            insert(out, prefix.clone(), fields)?
                        }
                        (GroupKey::Default, TableNode::Group(_)) => {
                            return Err(ScriptError::Table(format!(
                                "default entry of [{prefix}] must be a decoder list"
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }

    let mut out = BTreeMap::new();
    for (signature, node) in root {
        walk(&mut out, signature.clone(), node)?;
    }
    Ok(out)
}

/// Read-only after construction; share it across every blob of a batch.
#[derive(Clone, Debug, Default)]
pub struct SignatureTable {
    entries: HashMap<Signature, Vec<FieldDecoder>>,
    /// Candidates per first byte, longest first, ties broken bytewise.
    candidates: HashMap<u8, Vec<Signature>>,
}

impl SignatureTable {
    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    pub fn from_entries(entries: BTreeMap<Signature, Vec<FieldDecoder>>) -> Result<Self> {
        let mut candidates: HashMap<u8, Vec<Signature>> = HashMap::new();
        for signature in entries.keys() {
            let Some(&first) = signature.bytes().first() else {
                return Err(ScriptError::Table("empty signature".to_string()));
            };
            candidates.entry(first).or_default().push(signature.clone());
        }
        for list in candidates.values_mut() {
            list.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        }
        Ok(Self {
            entries: entries.into_iter().collect(),
            candidates,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, signature: &Signature) -> Option<&[FieldDecoder]> {
        self.entries.get(signature).map(Vec::as_slice)
    }

    /// Longest signature that prefixes `buf[pos..]`.
    pub fn longest_match(&self, buf: &[u8], pos: usize) -> Option<(&Signature, &[FieldDecoder])> {
        let rest = buf.get(pos..)?;
        let first = rest.first()?;
        self.candidates
            .get(first)?
            .iter()
            .find(|sig| rest.starts_with(sig.bytes()))
            .and_then(|sig| self.entries.get_key_value(sig))
            .map(|(sig, fields)| (sig, fields.as_slice()))
    }

    /// Check that an (edited) record still fits its signature's grammar.
    pub fn conform(&self, record: &Record) -> Result<()> {
        self.walk_fields(record, |_, _| Ok(()))
    }

    /// Visit every field of `record` together with the kind its grammar expects.
    pub fn walk_fields<'r>(
        &self,
        record: &'r Record,
        mut visit: impl FnMut(&'r TaggedValue, ValueKind) -> Result<()>,
    ) -> Result<()> {
        let decoders = self
            .get(&record.signature)
            .ok_or(ScriptError::UnknownSignature {
                byte: record.signature.bytes().first().copied().unwrap_or_default(),
                offset: record.offset,
            })?;

        let mut walker = FieldWalker {
            record,
            cursor: 0,
            visit: &mut visit,
        };
        for decoder in decoders {
            let context = walker.cursor;
            if walker.step(decoder, context)? == Walk::Stop {
                break;
            }
        }
        if walker.cursor != record.fields.len() {
            return Err(ScriptError::FieldCount {
                signature: record.signature.clone(),
                expected: walker.cursor,
                found: record.fields.len(),
            });
        }
        Ok(())
    }
}

#[derive(PartialEq, Eq)]
enum Walk {
    Continue,
    Stop,
}

struct FieldWalker<'r, 'v, V> {
    record: &'r Record,
    cursor: usize,
    visit: &'v mut V,
}

impl<'r, V> FieldWalker<'r, '_, V>
where
    V: FnMut(&'r TaggedValue, ValueKind) -> Result<()>,
{
    fn next_field(&mut self) -> Result<&'r TaggedValue> {
        let fields = &self.record.fields;
        let field = fields.get(self.cursor).ok_or_else(|| ScriptError::FieldCount {
            signature: self.record.signature.clone(),
            expected: self.cursor + 1,
            found: fields.len(),
        })?;
        self.cursor += 1;
        Ok(field)
    }

    fn step(&mut self, decoder: &FieldDecoder, context: usize) -> Result<Walk> {
        match decoder {
            FieldDecoder::Scalar(kind) => {
                let field = self.next_field()?;
                if field.kind() != *kind {
                    return Err(ScriptError::TypeMismatch {
                        expected: kind.to_string(),
                        found: field.kind(),
                    });
                }
                (self.visit)(field, *kind)?;
            }
            FieldDecoder::Slice(len) => {
                let field = self.next_field()?;
                match field {
                    TaggedValue::Bytes(b) if b.len() == *len => (self.visit)(field, ValueKind::Bytes)?,
                    other => {
                        return Err(ScriptError::TypeMismatch {
                            expected: format!("bytes({len})"),
                            found: other.kind(),
                        });
                    }
                }
            }
            FieldDecoder::Repeat { inner, count } => {
                for _ in 0..*count {
                    if self.step(inner, context)? == Walk::Stop {
                        return Ok(Walk::Stop);
                    }
                }
            }
            FieldDecoder::RepeatBy { inner, field } => {
                let count = repeat_count(&self.record.fields[..context], *field)?;
                for _ in 0..count {
                    if self.step(inner, context)? == Walk::Stop {
                        return Ok(Walk::Stop);
                    }
                }
            }
            FieldDecoder::End => return Ok(Walk::Stop),
        }
        Ok(Walk::Continue)
    }
}
