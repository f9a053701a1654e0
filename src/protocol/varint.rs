//! Varint codec for frame length prefixes.
//!
//! Little-endian base-128: each byte carries 7 data bits, least-significant
//! group first, with 0x80 set on every byte except the last. Used only for
//! framing; message payloads are MessagePack.
//!
//! Canonical width is unsigned 32-bit, which covers any realistic frame
//! size in at most [`MAX_PREFIX_LEN`] bytes.

use crate::error::{HubwireError, Result};

/// Worst-case encoded length of a u32 varint.
pub const MAX_PREFIX_LEN: usize = 5;

/// Number of bytes [`write_varint_at`] will emit for `value`.
///
/// Value 0 still takes one byte.
pub fn required_byte_count(mut value: u32) -> usize {
    let mut bytes = 0;
    loop {
        value >>= 7;
        bytes += 1;
        if value == 0 {
            return bytes;
        }
    }
}

/// Write `value` into `buf` starting at `offset`, returning the number of
/// bytes written.
///
/// # Panics
///
/// Panics if `buf` is too short; size the region with
/// [`required_byte_count`] first.
pub fn write_varint_at(buf: &mut [u8], offset: usize, mut value: u32) -> usize {
    let mut pos = offset;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf[pos] = byte;
        pos += 1;
        if value == 0 {
            return pos - offset;
        }
    }
}

/// Read one varint from `buf` at `*offset`, advancing the offset past it.
///
/// Running off the end of the region, or a value that does not fit in 32
/// bits, is a framing error.
pub fn read_varint(buf: &[u8], offset: &mut usize) -> Result<u32> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        if shift >= 35 {
            return Err(HubwireError::Framing(
                "varint length prefix exceeds 32 bits".to_string(),
            ));
        }
        let byte = *buf.get(*offset).ok_or_else(|| {
            HubwireError::Framing(format!(
                "varint length prefix runs past end of region at offset {offset}",
                offset = *offset
            ))
        })?;
        *offset += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    u32::try_from(value)
        .map_err(|_| HubwireError::Framing("varint length prefix exceeds 32 bits".to_string()))
}
