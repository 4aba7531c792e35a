//! AOF reader
//!
//! Walks the journal record by record. The read can be bounded to a prefix
//! of the file, which is how compaction reads a frozen part of a journal that
//! is still being appended to.

use crate::error::{PersistError, Result};
use crate::protocol::{LogRecord, RespParser};
use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Sequential journal reader
pub struct JournalReader {
    data: Bytes,
    pos: usize,
    records: usize,
}

impl JournalReader {
    /// Load the journal, or only its first `max_bytes` bytes
    pub fn open(path: &Path, max_bytes: Option<u64>) -> Result<Self> {
        let file = File::open(path)?;
        let mut data = Vec::new();
        match max_bytes {
            Some(limit) => {
                file.take(limit).read_to_end(&mut data)?;
            }
            None => {
                let mut file = file;
                file.read_to_end(&mut data)?;
            }
        }
        Ok(Self::from_bytes(Bytes::from(data)))
    }

    pub fn from_bytes(data: Bytes) -> Self {
        JournalReader {
            data,
            pos: 0,
            records: 0,
        }
    }

    /// Offset just past the last record returned
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    /// Total bytes available to this reader
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Records returned so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Decode the next record
    ///
    /// Returns Ok(None) at a clean end of input. A record cut short by the end
    /// of input yields `TruncatedJournal`; anything else that does not decode
    /// as a non-empty array of bulk strings yields `MalformedRecord`.
    pub fn next_record(&mut self) -> Result<Option<LogRecord>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let rest = self.data.slice(self.pos..);
        match RespParser::parse_command(&rest) {
            Ok(Some((record, used))) => {
                if record.is_empty() {
                    return Err(self.malformed("empty command"));
                }
                self.pos += used;
                self.records += 1;
                Ok(Some(record))
            }
            Ok(None) => Err(PersistError::TruncatedJournal {
                offset: self.pos as u64,
                applied: self.records,
            }),
            Err(e) => Err(self.malformed(e.to_string())),
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> PersistError {
        PersistError::MalformedRecord {
            offset: self.pos as u64,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_RECORDS: &[u8] = b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nDEL\r\n$1\r\na\r\n";

    #[test]
    fn test_reads_records_in_order() {
        let mut reader = JournalReader::from_bytes(Bytes::from_static(TWO_RECORDS));
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first[0], Bytes::from("SET"));
        assert_eq!(reader.offset(), 27);

        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from("DEL"), Bytes::from("a")]);
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.records(), 2);
    }

    #[test]
    fn test_truncated_tail() {
        let cut = &TWO_RECORDS[..TWO_RECORDS.len() - 3];
        let mut reader = JournalReader::from_bytes(Bytes::copy_from_slice(cut));
        assert!(reader.next_record().unwrap().is_some());

        match reader.next_record() {
            Err(PersistError::TruncatedJournal { offset, applied }) => {
                assert_eq!(offset, 27);
                assert_eq!(applied, 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_record() {
        let mut reader = JournalReader::from_bytes(Bytes::from_static(b"+OK\r\n"));
        assert!(matches!(
            reader.next_record(),
            Err(PersistError::MalformedRecord { offset: 0, .. })
        ));

        let mut reader = JournalReader::from_bytes(Bytes::from_static(b"*0\r\n"));
        assert!(matches!(
            reader.next_record(),
            Err(PersistError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_bounded_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        std::fs::write(&path, TWO_RECORDS).unwrap();

        let mut reader = JournalReader::open(&path, Some(27)).unwrap();
        assert_eq!(reader.len(), 27);
        assert!(reader.next_record().unwrap().is_some());
        assert!(reader.next_record().unwrap().is_none());

        let reader = JournalReader::open(&path, None).unwrap();
        assert_eq!(reader.len(), TWO_RECORDS.len() as u64);
    }
}
