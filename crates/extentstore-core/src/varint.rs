//! Variable-length Integer Encoding (Varint)
//!
//! Unsigned LEB128-style varints used for the variable-length parts of the
//! delta encoding. Each byte carries 7 bits of payload and 1 continuation
//! bit, so small lengths cost a single byte on disk.
//!
//! Decoding is fallible: the scanner decodes descriptors out of a metadata
//! region whose declared size came from an on-disk header, so a truncated or
//! overlong varint must surface as `None` (a framing problem) rather than a
//! panic.

use bytes::{Buf, BufMut};

/// Encode an unsigned integer as a varint.
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8(value as u8 | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode a varint; `None` if the buffer is truncated or the encoding
/// overflows 64 bits.
pub fn decode_varint_u64(buf: &mut impl Buf) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return None;
        }
        let byte = buf.get_u8();
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Some(value);
        }

        shift += 7;

        if shift >= 64 {
            return None;
        }
    }
}

/// Number of bytes `encode_varint_u64` will emit for `value`.
pub fn varint_len_u64(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    std::cmp::max(1, bits.div_ceil(7))
}
