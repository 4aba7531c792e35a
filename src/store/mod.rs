//! In-memory storage module
//!
//! Holds the live data set and defines the `Store` contract the persistence
//! layer consumes: enumerate entries with their expiry, count them, replay a
//! command, and restore a decoded entry.

mod entry;
mod value;
mod memory;
mod keyspace;

pub use entry::Entry;
pub use value::Value;
pub use memory::MemoryStore;
pub use keyspace::Keyspace;

use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix epoch milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One key as seen by a dump or rewrite pass
#[derive(Debug, Clone, PartialEq)]
pub struct DumpEntry {
    pub key: Bytes,
    pub value: Value,
    /// Absolute expiry as Unix epoch milliseconds
    pub expire_at: Option<u64>,
}

/// Every entry of one logical database, captured for a background dump
#[derive(Debug, Clone, Default)]
pub struct DatabaseDump {
    pub index: usize,
    pub entries: Vec<DumpEntry>,
}

/// The storage contract consumed by snapshots, journal replay and compaction
pub trait Store: Send + Sync {
    /// Number of logical databases
    fn databases(&self) -> usize;

    /// Number of entries `for_each` will visit in database `db`
    fn len(&self, db: usize) -> usize;

    /// Visit every entry of database `db` until `visit` returns false
    fn for_each(&self, db: usize, visit: &mut dyn FnMut(&Bytes, &Value, Option<u64>) -> bool);

    /// Execute a command against database `db`
    fn execute(&mut self, db: usize, command: &[Bytes]) -> RespValue;

    /// Insert a decoded entry into database `db`, replacing any existing key
    fn restore(&mut self, db: usize, entry: DumpEntry);

    /// An empty store with the same number of databases
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Copy every entry of every non-empty database
    fn collect_all(&self) -> Vec<DatabaseDump> {
        (0..self.databases())
            .filter(|&db| self.len(db) > 0)
            .map(|index| {
                let mut entries = Vec::with_capacity(self.len(index));
                self.for_each(index, &mut |key, value, expire_at| {
                    entries.push(DumpEntry {
                        key: key.clone(),
                        value: value.clone(),
                        expire_at,
                    });
                    true
                });
                DatabaseDump { index, entries }
            })
            .collect()
    }
}

/// Every entry of every database, ordered by database then key
#[cfg(test)]
pub(crate) fn sorted_contents<S: Store + ?Sized>(store: &S) -> Vec<(usize, Vec<DumpEntry>)> {
    store
        .collect_all()
        .into_iter()
        .map(|mut dump| {
            dump.entries.sort_by(|a, b| a.key.cmp(&b.key));
            (dump.index, dump.entries)
        })
        .collect()
}
