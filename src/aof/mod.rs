//! Append-Only File (AOF) persistence module
//!
//! Provides durability by logging every successful write command to disk.
//! Records are RESP arrays of bulk strings, the same shape clients send, so
//! the journal can be replayed through the normal command path. A `SELECT`
//! record precedes the first record of each run of commands for a database.

mod writer;
mod reader;
mod replay;
mod rewrite;

pub use writer::{Journal, JournalPermit};
pub use reader::JournalReader;
pub use replay::{load_journal, replay_records, ReplayStats};
pub use rewrite::{rewrite_journal, write_store_commands, RewriteStats};

use crate::protocol::{LogRecord, RespEncoder};
use bytes::{Bytes, BytesMut};

/// Items per command when a collection is re-emitted in chunks
pub const REWRITE_ITEMS_PER_COMMAND: usize = 64;

/// The `SELECT <db>` record
pub fn select_record(db: usize) -> LogRecord {
    vec![Bytes::from_static(b"SELECT"), Bytes::from(db.to_string())]
}

/// Append the wire form of `record` to `buf`
pub fn encode_record(buf: &mut BytesMut, record: &[Bytes]) {
    RespEncoder::encode_command(buf, record);
}

/// Whether `record` is a `SELECT` command
pub fn is_select(record: &[Bytes]) -> bool {
    record
        .first()
        .map_or(false, |name| name.eq_ignore_ascii_case(b"SELECT"))
}
