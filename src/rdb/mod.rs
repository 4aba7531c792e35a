//! Snapshot (RDB) persistence module
//!
//! A snapshot is a single self-describing binary file holding every live key
//! of every non-empty database, written atomically through a temporary file.
//!
//! Layout: `FRMDB` magic, 4-byte ASCII version, then opcode-tagged sections:
//! auxiliary fields, per-database `SELECTDB` + `RESIZEDB` headers followed by
//! typed key records, and an `EOF` opcode trailed by an 8-byte xxh64 checksum
//! of everything before it.

pub mod encoding;
mod object;
mod writer;
mod loader;

pub use object::{read_object, value_type, write_object};
pub use writer::{dump_databases, dump_store, SnapshotStats, SnapshotWriter};
pub use loader::{load_snapshot, load_snapshot_bytes, LoadStats};

/// File magic tag
pub const MAGIC: &[u8; 5] = b"FRMDB";

/// Format version written by this build
pub const VERSION: &[u8; 4] = b"0001";

/// Auxiliary key/value field
pub const OP_AUX: u8 = 0xFA;
/// Entry count of the current database
pub const OP_RESIZEDB: u8 = 0xFB;
/// Absolute expiry in epoch milliseconds (8 bytes big-endian) for the next key
pub const OP_EXPIRETIME_MS: u8 = 0xFC;
/// Switch the current database
pub const OP_SELECTDB: u8 = 0xFE;
/// End of data, followed by the checksum trailer
pub const OP_EOF: u8 = 0xFF;

pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;
