use scn_nls::TextCodec;

use crate::error::{Result, ScriptError};
use crate::primitives::{read_bytes, read_scalar};
use crate::record::Record;
use crate::signature::{repeat_count, FieldDecoder, Signature, SignatureTable};
use crate::value::TaggedValue;

/// Why decoding of a blob stopped.
#[derive(Debug)]
pub enum Halt {
    /// The whole buffer was consumed.
    Exhausted,
    /// An end-marker decoder fired; the record carrying it is included.
    EndMarker,
    /// No signature matches at `offset` (absolute, including the origin).
    Unknown { byte: u8, offset: usize },
    /// A field decoder failed inside the opcode starting at `offset`.
    Malformed(ScriptError),
}

#[derive(Debug)]
pub struct Decoded {
    pub records: Vec<Record>,
    /// Blob-relative offset where decoding stopped.
    pub consumed: usize,
    pub halt: Halt,
}

impl Decoded {
    pub fn is_complete(&self) -> bool {
        matches!(self.halt, Halt::Exhausted | Halt::EndMarker)
    }

    /// All records, or the error that stopped decoding early.
    pub fn into_records(self) -> Result<Vec<Record>> {
        match self.halt {
            Halt::Exhausted | Halt::EndMarker => Ok(self.records),
            Halt::Unknown { byte, offset } => Err(ScriptError::UnknownSignature { byte, offset }),
            Halt::Malformed(e) => Err(e),
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Greedy longest-signature-match scanner over one blob.
pub struct Decoder<'a> {
    table: &'a SignatureTable,
    codec: &'a dyn TextCodec,
    /// Added to reported positions when the blob sits inside a larger file.
    origin: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(table: &'a SignatureTable, codec: &'a dyn TextCodec) -> Self {
        Self {
            table,
            codec,
            origin: 0,
        }
    }

    pub fn with_origin(mut self, origin: usize) -> Self {
        self.origin = origin;
        self
    }

    fn apply(
        &self,
        decoder: &FieldDecoder,
        buf: &[u8],
        pos: usize,
        context: &[TaggedValue],
        out: &mut Vec<TaggedValue>,
    ) -> Result<(usize, Flow)> {
        match decoder {
            FieldDecoder::Scalar(kind) => {
                let (value, next) = read_scalar(*kind, buf, pos, self.codec)?;
                out.push(value);
                Ok((next, Flow::Continue))
            }
            FieldDecoder::Slice(len) => {
                let (value, next) = read_bytes(buf, pos, *len)?;
                out.push(value);
                Ok((next, Flow::Continue))
            }
            FieldDecoder::Repeat { inner, count } => self.apply_n(inner, *count, buf, pos, context, out),
            FieldDecoder::RepeatBy { inner, field } => {
                let count = repeat_count(context, *field)?;
                self.apply_n(inner, count, buf, pos, context, out)
            }
            FieldDecoder::End => Ok((pos, Flow::Stop)),
        }
    }

    fn apply_n(
        &self,
        inner: &FieldDecoder,
        count: usize,
        buf: &[u8],
        mut pos: usize,
        context: &[TaggedValue],
        out: &mut Vec<TaggedValue>,
    ) -> Result<(usize, Flow)> {
        for _ in 0..count {
            let (next, flow) = self.apply(inner, buf, pos, context, out)?;
            pos = next;
            if let Flow::Stop = flow {
                return Ok((pos, Flow::Stop));
            }
        }
        Ok((pos, Flow::Continue))
    }

    /// Decode the fields of one record whose signature ends at `pos`.
    fn decode_fields(
        &self,
        decoders: &[FieldDecoder],
        buf: &[u8],
        mut pos: usize,
    ) -> Result<(Vec<TaggedValue>, usize, Flow)> {
        let mut fields = Vec::new();
        for decoder in decoders {
            // Repeat results join the record only once the whole decoder is done,
            // so context indices always see the fields before this decoder.
            let mut produced = Vec::new();
            let (next, flow) = self.apply(decoder, buf, pos, &fields, &mut produced)?;
            fields.append(&mut produced);
            pos = next;
            if let Flow::Stop = flow {
                return Ok((fields, pos, Flow::Stop));
            }
        }
        Ok((fields, pos, Flow::Continue))
    }

    pub fn decode(&self, buf: &[u8]) -> Decoded {
        let mut records: Vec<Record> = Vec::new();
        let mut pos = 0usize;

        while pos < buf.len() {
            let Some((signature, decoders)) = self.table.longest_match(buf, pos) else {
                let byte = buf[pos];
                log::debug!("unknown opcode 0x{:02X} at 0x{:X}", byte, pos + self.origin);
                return Decoded {
                    records,
                    consumed: pos,
                    halt: Halt::Unknown {
                        byte,
                        offset: pos + self.origin,
                    },
                };
            };

            let start = pos;
            let (fields, next, flow) = match self.decode_fields(decoders, buf, start + signature.len()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    return Decoded {
                        records,
                        consumed: start,
                        halt: Halt::Malformed(self.malformed(signature, start, e)),
                    };
                }
            };

            records.push(Record {
                signature: signature.clone(),
                offset: start,
                index: records.len(),
                fields,
            });
            pos = next;

            if let Flow::Stop = flow {
                return Decoded {
                    records,
                    consumed: pos,
                    halt: Halt::EndMarker,
                };
            }
        }

        Decoded {
            records,
            consumed: pos,
            halt: Halt::Exhausted,
        }
    }

    fn malformed(&self, signature: &Signature, start: usize, source: ScriptError) -> ScriptError {
        ScriptError::Malformed {
            signature: signature.clone(),
            offset: start + self.origin,
            source: Box::new(source),
        }
    }
}
