//! Snapshot writer
//!
//! Records are encoded into an in-memory buffer that is flushed to the
//! underlying writer in large chunks, feeding the checksum on the way.

use super::encoding::{write_length, write_string};
use super::object::write_object;
use super::{MAGIC, OP_AUX, OP_EOF, OP_EXPIRETIME_MS, OP_RESIZEDB, OP_SELECTDB, VERSION};
use crate::error::{PersistError, Result};
use crate::store::{now_ms, DatabaseDump, Store, Value};
use bytes::{BufMut, BytesMut};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh64::Xxh64;

const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Counters reported by a finished snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub databases: usize,
    pub keys: usize,
    pub bytes: u64,
}

/// Streaming snapshot encoder
pub struct SnapshotWriter<W: Write> {
    out: W,
    buf: BytesMut,
    hasher: Xxh64,
    stats: SnapshotStats,
}

impl<W: Write> SnapshotWriter<W> {
    /// Start a snapshot: header and auxiliary fields
    pub fn new(out: W) -> Result<Self> {
        let mut writer = SnapshotWriter {
            out,
            buf: BytesMut::with_capacity(FLUSH_THRESHOLD * 2),
            hasher: Xxh64::new(0),
            stats: SnapshotStats::default(),
        };

        writer.buf.put_slice(MAGIC);
        writer.buf.put_slice(VERSION);
        writer.write_aux(b"ferrum-ver", env!("CARGO_PKG_VERSION").as_bytes());
        writer.write_aux(b"ctime", (now_ms() / 1000).to_string().as_bytes());
        Ok(writer)
    }

    fn write_aux(&mut self, key: &[u8], value: &[u8]) {
        self.buf.put_u8(OP_AUX);
        write_string(&mut self.buf, key);
        write_string(&mut self.buf, value);
    }

    /// Open database `index`, announcing exactly `len` following records
    pub fn begin_database(&mut self, index: usize, len: usize) -> Result<()> {
        self.buf.put_u8(OP_SELECTDB);
        write_length(&mut self.buf, index as u64);
        self.buf.put_u8(OP_RESIZEDB);
        write_length(&mut self.buf, len as u64);
        self.stats.databases += 1;
        Ok(())
    }

    /// Write one key record, preceded by its expiry if any
    pub fn write_entry(&mut self, key: &[u8], value: &Value, expire_at: Option<u64>) -> Result<()> {
        if let Some(at) = expire_at {
            self.buf.put_u8(OP_EXPIRETIME_MS);
            self.buf.put_u64(at);
        }
        write_object(&mut self.buf, key, value);
        self.stats.keys += 1;

        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_buf()?;
        }
        Ok(())
    }

    /// Write the EOF opcode and checksum trailer, returning the inner writer
    pub fn finish(mut self) -> Result<(W, SnapshotStats)> {
        self.buf.put_u8(OP_EOF);
        self.flush_buf()?;

        let checksum = self.hasher.digest();
        self.out.write_all(&checksum.to_be_bytes())?;
        self.out.flush()?;
        self.stats.bytes += 8;

        Ok((self.out, self.stats))
    }

    fn flush_buf(&mut self) -> Result<()> {
        self.hasher.update(&self.buf);
        self.out.write_all(&self.buf)?;
        self.stats.bytes += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }
}

/// Dump every entry of `store` to `path`
///
/// Each non-empty database gets a `SELECTDB`/`RESIZEDB` header whose count
/// matches the records written after it. Entries are written as stored,
/// including expired ones the store has not reaped yet.
pub fn dump_store<S: Store + ?Sized>(store: &S, path: &Path) -> Result<SnapshotStats> {
    write_atomically(path, |writer| {
        for db in 0..store.databases() {
            let len = store.len(db);
            if len == 0 {
                continue;
            }
            writer.begin_database(db, len)?;

            let mut written = 0usize;
            let mut failure = None;
            store.for_each(db, &mut |key, value, expire_at| {
                match writer.write_entry(key, value, expire_at) {
                    Ok(()) => {
                        written += 1;
                        true
                    }
                    Err(e) => {
                        failure = Some(e);
                        false
                    }
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }
            if written != len {
                return Err(PersistError::corrupt(format!(
                    "database {} announced {} keys but visited {}",
                    db, len, written
                )));
            }
        }
        Ok(())
    })
}

/// Dump entries captured earlier to `path`
pub fn dump_databases(dumps: &[DatabaseDump], path: &Path) -> Result<SnapshotStats> {
    write_atomically(path, |writer| {
        for dump in dumps.iter().filter(|d| !d.entries.is_empty()) {
            writer.begin_database(dump.index, dump.entries.len())?;
            for entry in &dump.entries {
                writer.write_entry(&entry.key, &entry.value, entry.expire_at)?;
            }
        }
        Ok(())
    })
}

/// Temporary file used while a snapshot for `path` is being written
fn temp_path(path: &Path) -> PathBuf {
    let target = path.file_name().and_then(|n| n.to_str()).unwrap_or("dump.rdb");
    path.with_file_name(format!("temp-{}-{}", std::process::id(), target))
}

/// Write through a temporary file in the target directory, fsync it, then
/// rename it over `path`. On failure the temporary file is removed and the
/// previous snapshot is left untouched.
///
/// Nothing here logs: a forked child runs this with only one thread alive.
fn write_atomically<F>(path: &Path, fill: F) -> Result<SnapshotStats>
where
    F: FnOnce(&mut SnapshotWriter<BufWriter<File>>) -> Result<()>,
{
    let tmp = temp_path(path);
    let result = (|| -> Result<SnapshotStats> {
        let file = File::create(&tmp)?;
        let mut writer = SnapshotWriter::new(BufWriter::new(file))?;
        fill(&mut writer)?;
        let (out, stats) = writer.finish()?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(stats)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DumpEntry;
    use bytes::Bytes;

    #[test]
    fn test_header_and_trailer() {
        let writer = SnapshotWriter::new(Vec::new()).unwrap();
        let (out, stats) = writer.finish().unwrap();

        assert_eq!(&out[..5], MAGIC);
        assert_eq!(&out[5..9], VERSION);
        assert_eq!(out[9], OP_AUX);
        assert_eq!(out[out.len() - 9], OP_EOF);
        assert_eq!(stats.bytes, out.len() as u64);

        let body = &out[..out.len() - 8];
        let trailer = u64::from_be_bytes(out[out.len() - 8..].try_into().unwrap());
        assert_eq!(trailer, xxhash_rust::xxh64::xxh64(body, 0));
    }

    #[test]
    fn test_expiry_prefix() {
        let mut writer = SnapshotWriter::new(Vec::new()).unwrap();
        writer.begin_database(0, 1).unwrap();
        let start = writer.buf.len();
        writer
            .write_entry(b"k", &Value::string("v"), Some(0x0102030405060708))
            .unwrap();

        assert_eq!(writer.buf[start], OP_EXPIRETIME_MS);
        assert_eq!(&writer.buf[start + 1..start + 9], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_dump_databases_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.rdb");
        std::fs::write(&path, b"previous").unwrap();

        let dumps = vec![
            DatabaseDump {
                index: 3,
                entries: vec![DumpEntry {
                    key: Bytes::from("k"),
                    value: Value::string("v"),
                    expire_at: None,
                }],
            },
            DatabaseDump::default(),
        ];
        let stats = dump_databases(&dumps, &path).unwrap();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.databases, 1);

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[..5], MAGIC);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_failed_dump_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.rdb");
        std::fs::write(&path, b"previous").unwrap();

        let result = write_atomically(&path, |_| Err(PersistError::corrupt("boom")));
        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_temp_path_follows_target() {
        let dir = tempfile::tempdir().unwrap();
        let a = temp_path(&dir.path().join("a.rdb"));
        let b = temp_path(&dir.path().join("b.rdb"));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(a.to_string_lossy().ends_with("-a.rdb"));
    }
}
