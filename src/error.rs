//! Error types for the persistence layer

use crate::persist::JobKind;
use std::io;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, PersistError>;

/// Errors raised while writing, reading or replaying persistence files
#[derive(Debug, Error)]
pub enum PersistError {
    /// Underlying file system failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot header does not carry the expected magic tag
    #[error("not a valid snapshot")]
    InvalidSnapshot,

    /// Snapshot header carries a version this build cannot read
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(String),

    /// Input ended in the middle of a record
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// A record decoded to something that violates the format
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// Snapshot trailer does not match the file contents
    #[error("checksum mismatch: expected {expected:#018x}, computed {actual:#018x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    /// A journal record could not be decoded
    #[error("malformed journal record at offset {offset}: {reason}")]
    MalformedRecord { offset: u64, reason: String },

    /// The journal ends with an incomplete record; `offset` is where the last
    /// complete record ends
    #[error("journal truncated after offset {offset} ({applied} records applied)")]
    TruncatedJournal { offset: u64, applied: usize },

    /// Another heavy persistence job holds the gate
    #[error("{0} already in progress")]
    InProgress(JobKind),

    /// Journal operations requested while journaling is off
    #[error("append only file is disabled")]
    JournalDisabled,

    /// The journal consumer task is gone
    #[error("journal writer has stopped")]
    WriterClosed,

    /// The forked snapshot child exited abnormally
    #[error("background save child failed: {0}")]
    ChildFailed(String),

    /// Configuration rejected during validation
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PersistError {
    /// Build a corruption error from anything printable
    pub fn corrupt(reason: impl Into<String>) -> Self {
        PersistError::Corrupt(reason.into())
    }

    /// Whether this error came from the concurrency guard
    pub fn is_in_progress(&self) -> bool {
        matches!(self, PersistError::InProgress(_))
    }
}
