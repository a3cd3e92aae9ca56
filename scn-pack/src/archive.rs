//! Segment archive: `count - 1`, then `count` absolute offsets, then the data.
//! The last segment runs to the end of the file.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PackError, Result};

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    data.get(offset..offset + 4)
        .map(LittleEndian::read_u32)
        .ok_or(PackError::TruncatedIndex)
}

/// Offsets of every segment, validated against `len`.
pub fn read_index(data: &[u8]) -> Result<Vec<u32>> {
    let count = (read_u32(data, 0)? as usize)
        .checked_add(1)
        .ok_or(PackError::TruncatedIndex)?;
    let header = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .filter(|&n| n <= data.len())
        .ok_or(PackError::TruncatedIndex)?;

    let high = u32::try_from(data.len()).map_err(|_| PackError::TooLarge)?;
    let mut offsets = Vec::with_capacity(count);
    for index in 0..count {
        let offset = read_u32(data, 4 + index * 4)?;
        if index == 0 && offset as usize != header {
            return Err(PackError::IndexMisaligned {
                expected: header as u32,
                found: offset,
            });
        }
        let low = offsets.last().copied().unwrap_or(header as u32);
        if offset < low || offset > high {
            return Err(PackError::SegmentOutOfOrder {
                index,
                offset,
                low,
                high,
            });
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Split an archive into its segments.
pub fn split(data: &[u8]) -> Result<Vec<&[u8]>> {
    let offsets = read_index(data)?;
    let ends = offsets
        .iter()
        .skip(1)
        .map(|&o| o as usize)
        .chain(std::iter::once(data.len()));
    Ok(offsets
        .iter()
        .zip(ends)
        .map(|(&start, end)| &data[start as usize..end])
        .collect())
}

/// Lay segments out back to back behind a fresh index.
pub fn join<S: AsRef<[u8]>>(segments: &[S]) -> Result<Vec<u8>> {
    if segments.is_empty() {
        return Err(PackError::Empty);
    }
    let header = 4 + segments.len() * 4;
    let total = segments
        .iter()
        .map(|s| s.as_ref().len())
        .sum::<usize>()
        + header;
    if u32::try_from(total).is_err() {
        return Err(PackError::TooLarge);
    }

    let mut out = vec![0u8; header];
    LittleEndian::write_u32(&mut out[0..4], (segments.len() - 1) as u32);
    for (i, segment) in segments.iter().enumerate() {
        let slot = 4 + i * 4;
        let start = out.len() as u32;
        LittleEndian::write_u32(&mut out[slot..slot + 4], start);
        out.extend_from_slice(segment.as_ref());
    }
    Ok(out)
}
