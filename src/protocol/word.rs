//! Word length prefix encoding
//!
//! Every word on the wire is preceded by a variable-length prefix:
//!
//! ```text
//! length < 0x80        1 byte   0xxxxxxx
//! length < 0x4000      2 bytes  10xxxxxx xxxxxxxx
//! length < 0x200000    3 bytes  110xxxxx xxxxxxxx xxxxxxxx
//! length < 0x10000000  4 bytes  1110xxxx xxxxxxxx xxxxxxxx xxxxxxxx
//! otherwise            5 bytes  11110000 xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
//! ```
//!
//! Lead bytes `0xF1..=0xFF` are reserved for control purposes and never
//! start a word.

use bytes::{BufMut, BytesMut};

use super::constants::{
    LEN_1_BYTE_MAX, LEN_2_BYTE_MAX, LEN_3_BYTE_MAX, LEN_4_BYTE_MAX, LEN_5_BYTE_MARKER,
};
use super::error::ProtocolError;

/// Append the length prefix for a word of `len` bytes
pub fn encode_length(len: usize, buf: &mut BytesMut) {
    if len < LEN_1_BYTE_MAX {
        buf.put_u8(len as u8);
    } else if len < LEN_2_BYTE_MAX {
        buf.put_u16(len as u16 | 0x8000);
    } else if len < LEN_3_BYTE_MAX {
        let prefixed = len as u32 | 0x00C0_0000;
        buf.put_slice(&prefixed.to_be_bytes()[1..]);
    } else if len < LEN_4_BYTE_MAX {
        buf.put_u32(len as u32 | 0xE000_0000);
    } else {
        buf.put_u8(LEN_5_BYTE_MARKER);
        buf.put_u32(len as u32);
    }
}

/// Append a length-prefixed word
pub fn encode_word(word: &str, buf: &mut BytesMut) {
    encode_length(word.len(), buf);
    buf.put_slice(word.as_bytes());
}

/// Decode a length prefix from the start of `buf`
///
/// Returns `(word_len, prefix_len)`, or `None` if more bytes are needed.
pub fn decode_length(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    let prefix_len = if first & 0x80 == 0x00 {
        1
    } else if first & 0xC0 == 0x80 {
        2
    } else if first & 0xE0 == 0xC0 {
        3
    } else if first & 0xF0 == 0xE0 {
        4
    } else if first == LEN_5_BYTE_MARKER {
        5
    } else {
        return Err(ProtocolError::ReservedControlByte(first));
    };

    if buf.len() < prefix_len {
        return Ok(None);
    }

    let len = match prefix_len {
        1 => first as usize,
        2 => ((first as usize & 0x3F) << 8) | buf[1] as usize,
        3 => ((first as usize & 0x1F) << 16) | (buf[1] as usize) << 8 | buf[2] as usize,
        4 => {
            ((first as usize & 0x0F) << 24)
                | (buf[1] as usize) << 16
                | (buf[2] as usize) << 8
                | buf[3] as usize
        }
        _ => u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize,
    };

    Ok(Some((len, prefix_len)))
}
