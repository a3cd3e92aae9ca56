//! Byte-oriented LZ used for archive segments.
//!
//! A segment starts with the little-endian unpacked size. Each chunk is
//! either a literal run (`ctl < 0x80`, `ctl + 1` bytes follow) or a
//! back-reference (`ctl >= 0x80` plus one more byte) that copies up to 32
//! bytes from at most 1024 bytes back, one byte at a time.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PackError, Result};

pub const MAX_LITERAL: usize = 0x80;
pub const MAX_DISTANCE: usize = 0x400;
pub const MAX_MATCH: usize = 0x20;
const MIN_MATCH: usize = 3;
const MAX_CHAIN: usize = 64;

/// How [`compress`] chooses chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Literal runs only. Always valid, never smaller.
    #[default]
    Literal,
    /// Longest back-reference within the window at each position.
    Greedy,
}

/// The size header of a segment. Zero marks a stored segment.
pub fn unpacked_size(segment: &[u8]) -> Result<usize> {
    if segment.len() < 4 {
        return Err(PackError::MissingHeader(segment.len()));
    }
    Ok(LittleEndian::read_u32(segment) as usize)
}

pub fn decompress(segment: &[u8]) -> Result<Vec<u8>> {
    let expected = unpacked_size(segment)?;
    if expected == 0 {
        return Ok(segment[4..].to_vec());
    }

    let mut out = Vec::with_capacity(expected);
    let mut pos = 4;
    let truncated = |pos: usize, produced: usize| PackError::TruncatedStream {
        offset: pos,
        produced,
        expected,
    };

    while out.len() < expected {
        let chunk = pos;
        let &ctl = segment.get(pos).ok_or_else(|| truncated(pos, out.len()))?;
        pos += 1;

        if ctl & 0x80 != 0 {
            let &lo = segment.get(pos).ok_or_else(|| truncated(pos, out.len()))?;
            pos += 1;
            let distance = ((((ctl as usize) << 3) | (lo as usize >> 5)) & 0x3FF) + 1;
            let count = (lo as usize & 0x1F) + 1;
            if distance > out.len() {
                return Err(PackError::BadBackReference {
                    offset: chunk,
                    distance,
                    produced: out.len(),
                });
            }
            if out.len() + count > expected {
                return Err(PackError::Overrun { offset: chunk, expected });
            }
            // Overlapping copies read bytes written earlier in this same run.
            for _ in 0..count {
                let byte = out[out.len() - distance];
                out.push(byte);
            }
        } else {
            let count = (ctl & 0x7F) as usize + 1;
            if out.len() + count > expected {
                return Err(PackError::Overrun { offset: chunk, expected });
            }
            let run = segment
                .get(pos..pos + count)
                .ok_or_else(|| truncated(pos, out.len()))?;
            out.extend_from_slice(run);
            pos += count;
        }
    }

    if pos < segment.len() {
        log::trace!("ignoring {} trailing byte(s) after LZ stream", segment.len() - pos);
    }
    Ok(out)
}

pub fn compress(data: &[u8], mode: Mode) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len() + data.len() / MAX_LITERAL + 1);
    let mut header = [0u8; 4];
    LittleEndian::write_u32(&mut header, data.len() as u32);
    out.extend_from_slice(&header);

    match mode {
        Mode::Literal => push_literals(&mut out, data),
        Mode::Greedy => compress_greedy(data, &mut out),
    }
    out
}

fn push_literals(out: &mut Vec<u8>, mut run: &[u8]) {
    while !run.is_empty() {
        let n = run.len().min(MAX_LITERAL);
        out.push((n - 1) as u8);
        out.extend_from_slice(&run[..n]);
        run = &run[n..];
    }
}

fn push_match(out: &mut Vec<u8>, distance: usize, len: usize) {
    let d = distance - 1;
    out.push(0x80 | (d >> 3) as u8);
    out.push((((d & 7) << 5) | (len - 1)) as u8);
}

fn key(data: &[u8], pos: usize) -> u32 {
    (data[pos] as u32) << 16 | (data[pos + 1] as u32) << 8 | data[pos + 2] as u32
}

/// Hash chains over 3-byte prefixes.
struct Chains {
    head: HashMap<u32, usize>,
    prev: Vec<usize>,
}

impl Chains {
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH <= data.len() {
            if let Some(old) = self.head.insert(key(data, pos), pos) {
                self.prev[pos] = old;
            }
        }
    }

    fn first(&self, data: &[u8], pos: usize) -> Option<usize> {
        self.head.get(&key(data, pos)).copied()
    }

    fn next(&self, pos: usize) -> Option<usize> {
        Some(self.prev[pos]).filter(|&p| p != usize::MAX)
    }
}

fn compress_greedy(data: &[u8], out: &mut Vec<u8>) {
    let mut chains = Chains {
        head: HashMap::new(),
        prev: vec![usize::MAX; data.len()],
    };

    let mut literal_start = 0;
    let mut pos = 0;
    while pos < data.len() {
        let mut best = (0usize, 0usize);
        if pos + MIN_MATCH <= data.len() {
            let limit = (data.len() - pos).min(MAX_MATCH);
            let mut candidate = chains.first(data, pos);
            let mut steps = 0;
            while let Some(cand) = candidate {
                let distance = pos - cand;
                if distance > MAX_DISTANCE || steps == MAX_CHAIN {
                    break;
                }
                let len = (0..limit)
                    .take_while(|&k| data[cand + k] == data[pos + k])
                    .count();
                if len > best.1 {
                    best = (distance, len);
                    if len == limit {
                        break;
                    }
                }
                candidate = chains.next(cand);
                steps += 1;
            }
        }

        let (distance, len) = best;
        if len >= MIN_MATCH {
            push_literals(out, &data[literal_start..pos]);
            push_match(out, distance, len);
            for p in pos..pos + len {
                chains.insert(data, p);
            }
            pos += len;
            literal_start = pos;
        } else {
            chains.insert(data, pos);
            pos += 1;
        }
    }
    push_literals(out, &data[literal_start..]);
}
