//! Length/Value codec
//!
//! The two high bits of the first byte select the representation:
//!
//! - `00xxxxxx`: 6-bit length inline
//! - `01xxxxxx xxxxxxxx`: 14-bit length
//! - `10000000` + 4 bytes: 32-bit big-endian length
//! - `10000001` + 8 bytes: 64-bit big-endian length
//! - `11xxxxxx`: special string encoding, low 6 bits are the encoding tag
//!
//! Strings that are the canonical base-10 rendering of an integer fitting in
//! 32 bits are packed as a tag byte plus a big-endian 1/2/4-byte integer.

use crate::error::{PersistError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const LEN_6BIT: u8 = 0;
pub const LEN_14BIT: u8 = 1;
pub const LEN_ENCVAL: u8 = 3;
pub const LEN_32BIT: u8 = 0x80;
pub const LEN_64BIT: u8 = 0x81;

pub const ENC_INT8: u8 = 0;
pub const ENC_INT16: u8 = 1;
pub const ENC_INT32: u8 = 2;

/// A decoded length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// A plain length or count
    Plain(u64),
    /// A special-encoding tag (low 6 bits of a `11xxxxxx` byte)
    Encoded(u8),
}

/// Fail with `UnexpectedEof` unless `n` more bytes are available
pub(crate) fn ensure(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(PersistError::UnexpectedEof);
    }
    Ok(())
}

pub(crate) fn read_u8(buf: &mut Bytes) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn read_u64(buf: &mut Bytes) -> Result<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

/// Write a length using the smallest representation
pub fn write_length(buf: &mut BytesMut, len: u64) {
    if len < 1 << 6 {
        buf.put_u8((LEN_6BIT << 6) | len as u8);
    } else if len < 1 << 14 {
        buf.put_u8((LEN_14BIT << 6) | (len >> 8) as u8);
        buf.put_u8(len as u8);
    } else if len <= u32::MAX as u64 {
        buf.put_u8(LEN_32BIT);
        buf.put_u32(len as u32);
    } else {
        buf.put_u8(LEN_64BIT);
        buf.put_u64(len);
    }
}

/// Read a length prefix or special-encoding tag
pub fn read_length(buf: &mut Bytes) -> Result<Length> {
    let first = read_u8(buf)?;
    match first >> 6 {
        LEN_6BIT => Ok(Length::Plain((first & 0x3f) as u64)),
        LEN_14BIT => {
            let low = read_u8(buf)?;
            Ok(Length::Plain((((first & 0x3f) as u64) << 8) | low as u64))
        }
        LEN_ENCVAL => Ok(Length::Encoded(first & 0x3f)),
        _ => match first {
            LEN_32BIT => {
                ensure(buf, 4)?;
                Ok(Length::Plain(buf.get_u32() as u64))
            }
            LEN_64BIT => Ok(Length::Plain(read_u64(buf)?)),
            other => Err(PersistError::corrupt(format!(
                "unknown length prefix {:#04x}",
                other
            ))),
        },
    }
}

/// Read a length that must not be a special encoding
pub fn read_plain_length(buf: &mut Bytes) -> Result<u64> {
    match read_length(buf)? {
        Length::Plain(len) => Ok(len),
        Length::Encoded(tag) => Err(PersistError::corrupt(format!(
            "expected a length, found string encoding {}",
            tag
        ))),
    }
}

/// The integer a string can be packed as, if any
fn packable_integer(s: &[u8]) -> Option<i32> {
    // Longest canonical i32 rendering is "-2147483648"
    if s.is_empty() || s.len() > 11 {
        return None;
    }
    let value: i64 = std::str::from_utf8(s).ok()?.parse().ok()?;
    if value.to_string().as_bytes() != s {
        return None;
    }
    i32::try_from(value).ok()
}

/// Write a string, packing canonical integers
pub fn write_string(buf: &mut BytesMut, s: &[u8]) {
    match packable_integer(s) {
        Some(value) => write_packed_integer(buf, value),
        None => {
            write_length(buf, s.len() as u64);
            buf.put_slice(s);
        }
    }
}

fn write_packed_integer(buf: &mut BytesMut, value: i32) {
    let special = LEN_ENCVAL << 6;
    if let Ok(v) = i8::try_from(value) {
        buf.put_u8(special | ENC_INT8);
        buf.put_i8(v);
    } else if let Ok(v) = i16::try_from(value) {
        buf.put_u8(special | ENC_INT16);
        buf.put_i16(v);
    } else {
        buf.put_u8(special | ENC_INT32);
        buf.put_i32(value);
    }
}

/// Read a string written by `write_string`
pub fn read_string(buf: &mut Bytes) -> Result<Bytes> {
    match read_length(buf)? {
        Length::Plain(len) => {
            let len = usize::try_from(len).map_err(|_| PersistError::UnexpectedEof)?;
            ensure(buf, len)?;
            Ok(buf.split_to(len))
        }
        Length::Encoded(ENC_INT8) => {
            ensure(buf, 1)?;
            Ok(Bytes::from(buf.get_i8().to_string()))
        }
        Length::Encoded(ENC_INT16) => {
            ensure(buf, 2)?;
            Ok(Bytes::from(buf.get_i16().to_string()))
        }
        Length::Encoded(ENC_INT32) => {
            ensure(buf, 4)?;
            Ok(Bytes::from(buf.get_i32().to_string()))
        }
        Length::Encoded(tag) => Err(PersistError::corrupt(format!(
            "unknown string encoding {}",
            tag
        ))),
    }
}
