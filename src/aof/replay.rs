//! AOF replay
//!
//! Rebuilds store state by running journal records through the normal
//! command path, the way a client connection would.

use super::{is_select, JournalReader};
use crate::error::{PersistError, Result};
use crate::protocol::RespValue;
use crate::store::Store;
use bytes::Bytes;
use std::path::Path;
use tracing::{info, warn};

/// Outcome of a replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records decoded and applied, `SELECT` included
    pub records: usize,
    /// Records whose execution returned an error reply
    pub rejected: usize,
    /// Offset just past the last applied record
    pub bytes: u64,
}

/// Replays records against a store, tracking `SELECT` like a client session
struct ReplayConnection<'a, S: Store + ?Sized> {
    store: &'a mut S,
    db: usize,
}

impl<'a, S: Store + ?Sized> ReplayConnection<'a, S> {
    fn new(store: &'a mut S) -> Self {
        ReplayConnection { store, db: 0 }
    }

    fn apply(&mut self, record: &[Bytes]) -> std::result::Result<RespValue, String> {
        if is_select(record) {
            let index = record
                .get(1)
                .and_then(|arg| std::str::from_utf8(arg).ok())
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|&db| db < self.store.databases() && record.len() == 2)
                .ok_or_else(|| "invalid SELECT".to_string())?;
            self.db = index;
            return Ok(RespValue::ok());
        }
        Ok(self.store.execute(self.db, record))
    }
}

/// Load the journal at `path` into `store`
///
/// `max_bytes` bounds the read to a prefix of the file. Replay stops at the
/// first record that cannot be decoded; everything before it stays applied.
pub fn load_journal<S: Store + ?Sized>(
    path: &Path,
    max_bytes: Option<u64>,
    store: &mut S,
) -> Result<ReplayStats> {
    let mut reader = JournalReader::open(path, max_bytes)?;
    let stats = replay_records(&mut reader, store)?;
    info!(
        "replayed {} journal records from {:?} ({} bytes)",
        stats.records, path, stats.bytes
    );
    Ok(stats)
}

/// Replay every remaining record of `reader` into `store`
pub fn replay_records<S: Store + ?Sized>(
    reader: &mut JournalReader,
    store: &mut S,
) -> Result<ReplayStats> {
    let mut conn = ReplayConnection::new(store);
    let mut stats = ReplayStats::default();

    loop {
        let offset = reader.offset();
        let record = match reader.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                warn!(
                    "journal replay stopped at offset {} after {} records: {}",
                    offset, stats.records, e
                );
                return Err(e);
            }
        };

        match conn.apply(&record) {
            Ok(reply) => {
                if let RespValue::Error(msg) = &reply {
                    warn!(
                        "journal record at offset {} was rejected: {}",
                        offset, msg
                    );
                    stats.rejected += 1;
                }
            }
            Err(reason) => {
                return Err(PersistError::MalformedRecord { offset, reason });
            }
        }
        stats.records += 1;
        stats.bytes = reader.offset();
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::encode_record;
    use crate::protocol::record;
    use crate::store::{Keyspace, Value};
    use bytes::BytesMut;

    fn journal_bytes(records: &[&[&'static str]]) -> BytesMut {
        let mut buf = BytesMut::new();
        for parts in records {
            encode_record(&mut buf, &record(parts.iter().copied()));
        }
        buf
    }

    fn string_at(store: &Keyspace, db: usize, key: &str) -> Option<Value> {
        store
            .db(db)
            .and_then(|d| d.get_entry(&Bytes::copy_from_slice(key.as_bytes())))
            .map(|e| e.value.clone())
    }

    #[test]
    fn test_select_routes_records() {
        let data = journal_bytes(&[
            &["SET", "a", "1"],
            &["SELECT", "1"],
            &["SET", "b", "2"],
        ]);
        let mut store = Keyspace::new(2);
        let stats = replay_records(&mut JournalReader::from_bytes(data.freeze()), &mut store).unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(string_at(&store, 0, "a"), Some(Value::string("1")));
        assert_eq!(string_at(&store, 1, "b"), Some(Value::string("2")));
        assert_eq!(string_at(&store, 0, "b"), None);
    }

    #[test]
    fn test_truncated_fourth_record() {
        let mut data = journal_bytes(&[
            &["SET", "a", "1"],
            &["SET", "b", "2"],
            &["RPUSH", "l", "x", "y"],
            &["SET", "c", "3"],
        ]);
        let keep = data.len() - 5;
        data.truncate(keep);

        let mut store = Keyspace::new(1);
        let err = replay_records(&mut JournalReader::from_bytes(data.freeze()), &mut store).unwrap_err();
        assert!(matches!(err, PersistError::TruncatedJournal { applied: 3, .. }));

        assert_eq!(store.len(0), 3);
        assert_eq!(string_at(&store, 0, "c"), None);
    }

    #[test]
    fn test_rejected_command_does_not_stop_replay() {
        let data = journal_bytes(&[
            &["SET", "s", "v"],
            &["RPUSH", "s", "x"],
            &["SET", "t", "w"],
        ]);
        let mut store = Keyspace::new(1);
        let stats = replay_records(&mut JournalReader::from_bytes(data.freeze()), &mut store).unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(string_at(&store, 0, "t"), Some(Value::string("w")));
    }

    #[test]
    fn test_select_out_of_range_is_malformed() {
        let data = journal_bytes(&[&["SET", "a", "1"], &["SELECT", "7"], &["SET", "b", "2"]]);
        let mut store = Keyspace::new(2);
        let err = replay_records(&mut JournalReader::from_bytes(data.freeze()), &mut store).unwrap_err();
        assert!(matches!(err, PersistError::MalformedRecord { .. }));
        assert_eq!(store.len(0), 1);
    }

    #[test]
    fn test_bounded_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let first = journal_bytes(&[&["SET", "a", "1"]]);
        let mut all = first.clone();
        all.extend_from_slice(&journal_bytes(&[&["SET", "b", "2"]]));
        std::fs::write(&path, &all).unwrap();

        let mut store = Keyspace::new(1);
        let stats = load_journal(&path, Some(first.len() as u64), &mut store).unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.bytes, first.len() as u64);
        assert_eq!(string_at(&store, 0, "b"), None);
    }
}
