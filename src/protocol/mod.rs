//! RESP2 protocol implementation
//!
//! Journal records are commands in RESP array-of-bulk-strings form, so this
//! module is both the reply format of the dispatcher and the record codec of
//! the append-only file.

mod types;
mod resp;

pub use types::{RespValue, RespError};
pub use resp::{RespParser, RespEncoder};

use bytes::Bytes;

/// A replayable command: the command name followed by its arguments
pub type LogRecord = Vec<Bytes>;

/// Build a record from anything byte-like
pub fn record<I, T>(parts: I) -> LogRecord
where
    I: IntoIterator<Item = T>,
    T: Into<Bytes>,
{
    parts.into_iter().map(Into::into).collect()
}
