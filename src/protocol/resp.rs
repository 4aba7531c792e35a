//! RESP2 parser and encoder
//!
//! The parser works on an immutable `Bytes` view and reports how many bytes a
//! complete value occupied, so a journal can be walked record by record
//! without copying or re-buffering.

use super::types::{RespValue, RespError};
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse one RESP value from the start of `data`
    ///
    /// Returns Ok(Some((value, consumed))) if a complete value was parsed,
    /// Ok(None) if more data is needed,
    /// Err(e) if parsing failed
    pub fn parse(data: &Bytes) -> Result<Option<(RespValue, usize)>, RespError> {
        Self::parse_at(data, 0)
    }

    /// Parse one command (array of bulk strings) from the start of `data`
    pub fn parse_command(data: &Bytes) -> Result<Option<(Vec<Bytes>, usize)>, RespError> {
        match Self::parse_at(data, 0)? {
            Some((value, end)) => Ok(Some((value.into_command()?, end))),
            None => Ok(None),
        }
    }

    fn parse_at(data: &Bytes, pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        if pos >= data.len() {
            return Ok(None);
        }

        match data[pos] {
            b'+' => Ok(Self::read_line(data, pos)?.map(|(line, end)| {
                (RespValue::SimpleString(String::from_utf8_lossy(line).into_owned()), end)
            })),
            b'-' => Ok(Self::read_line(data, pos)?.map(|(line, end)| {
                (RespValue::Error(String::from_utf8_lossy(line).into_owned()), end)
            })),
            b':' => match Self::read_line(data, pos)? {
                Some((line, end)) => Ok(Some((RespValue::Integer(Self::parse_int(line)?), end))),
                None => Ok(None),
            },
            b'$' => Self::parse_bulk_string(data, pos),
            b'*' => Self::parse_array(data, pos),
            other => Err(RespError::InvalidProtocol(format!(
                "Unknown type prefix: {:?}",
                other as char
            ))),
        }
    }

    /// Parse bulk string: $6\r\nfoobar\r\n or $-1\r\n (null)
    fn parse_bulk_string(data: &Bytes, pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let (line, start) = match Self::read_line(data, pos)? {
            Some(found) => found,
            None => return Ok(None),
        };
        let len = Self::parse_int(line)?;

        if len == -1 {
            return Ok(Some((RespValue::Null, start)));
        }
        if len < 0 {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid bulk string length: {}",
                len
            )));
        }

        let end = start + len as usize;
        if data.len() < end + 2 {
            return Ok(None);
        }
        if &data[end..end + 2] != CRLF {
            return Err(RespError::InvalidProtocol(
                "Missing CRLF after bulk string data".to_string(),
            ));
        }

        Ok(Some((RespValue::BulkString(data.slice(start..end)), end + 2)))
    }

    /// Parse array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    fn parse_array(data: &Bytes, pos: usize) -> Result<Option<(RespValue, usize)>, RespError> {
        let (line, mut cursor) = match Self::read_line(data, pos)? {
            Some(found) => found,
            None => return Ok(None),
        };
        let count = Self::parse_int(line)?;

        if count == -1 {
            return Ok(Some((RespValue::Null, cursor)));
        }
        if count < 0 {
            return Err(RespError::InvalidProtocol(format!(
                "Invalid array count: {}",
                count
            )));
        }

        let mut elements = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            match Self::parse_at(data, cursor)? {
                Some((value, next)) => {
                    elements.push(value);
                    cursor = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), cursor)))
    }

    /// Return the line after the type byte (without CRLF) and the offset past it
    fn read_line(data: &Bytes, pos: usize) -> Result<Option<(&[u8], usize)>, RespError> {
        let body = &data[pos + 1..];
        match body.windows(2).position(|w| w == CRLF) {
            Some(i) => Ok(Some((&body[..i], pos + 1 + i + 2))),
            None => Ok(None),
        }
    }

    fn parse_int(line: &[u8]) -> Result<i64, RespError> {
        let s = std::str::from_utf8(line).map_err(|_| RespError::InvalidUtf8)?;
        s.parse::<i64>().map_err(|_| RespError::IntegerOverflow)
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => Self::encode_bulk(buf, bytes),
            RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }

    /// Encode a command as an array of bulk strings
    pub fn encode_command<T: AsRef<[u8]>>(buf: &mut BytesMut, parts: &[T]) {
        buf.put_u8(b'*');
        buf.put_slice(parts.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        for part in parts {
            Self::encode_bulk(buf, part.as_ref());
        }
    }

    fn encode_bulk(buf: &mut BytesMut, bytes: &[u8]) {
        buf.put_u8(b'$');
        buf.put_slice(bytes.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(bytes);
        buf.put_slice(CRLF);
    }
}
