//! Snapshot loader

use super::encoding::{read_plain_length, read_string, read_u64, read_u8};
use super::object::read_object;
use super::{MAGIC, OP_AUX, OP_EOF, OP_EXPIRETIME_MS, OP_RESIZEDB, OP_SELECTDB, VERSION};
use crate::error::{PersistError, Result};
use crate::store::{now_ms, DumpEntry, Store};
use bytes::{Buf, Bytes};
use std::path::Path;
use tracing::{debug, info, warn};

/// Counters reported by a finished load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Keys inserted into the store
    pub loaded: usize,
    /// Keys dropped because their expiry had passed
    pub expired: usize,
    /// Whether a non-zero checksum trailer was present and verified
    pub checksum_verified: bool,
}

/// Load the snapshot at `path` into `store`
///
/// Keys whose expiry is at or before the load time are discarded. Any
/// decoding failure aborts the load with a typed error.
pub fn load_snapshot<S: Store + ?Sized>(path: &Path, store: &mut S) -> Result<LoadStats> {
    let data = Bytes::from(std::fs::read(path)?);
    let stats = load_snapshot_bytes(data, store)?;
    info!(
        "loaded {} keys from snapshot {:?} ({} expired keys skipped)",
        stats.loaded, path, stats.expired
    );
    Ok(stats)
}

/// Load a snapshot held in memory into `store`
pub fn load_snapshot_bytes<S: Store + ?Sized>(data: Bytes, store: &mut S) -> Result<LoadStats> {
    let mut buf = data.clone();
    if buf.remaining() < MAGIC.len() + VERSION.len() || &buf[..MAGIC.len()] != MAGIC {
        return Err(PersistError::InvalidSnapshot);
    }
    buf.advance(MAGIC.len());

    let version = buf.split_to(VERSION.len());
    if &version[..] != VERSION {
        return Err(PersistError::UnsupportedVersion(
            String::from_utf8_lossy(&version).into_owned(),
        ));
    }

    let now = now_ms();
    let mut stats = LoadStats::default();
    let mut db = 0usize;

    loop {
        match read_u8(&mut buf)? {
            OP_EOF => {
                let body_len = data.len() - buf.remaining();
                if buf.remaining() >= 8 {
                    let expected = buf.get_u64();
                    if expected != 0 {
                        let actual = xxhash_rust::xxh64::xxh64(&data[..body_len], 0);
                        if actual != expected {
                            return Err(PersistError::ChecksumMismatch { expected, actual });
                        }
                        stats.checksum_verified = true;
                    }
                }
                break;
            }
            OP_SELECTDB => {
                let index = read_plain_length(&mut buf)?;
                db = usize::try_from(index)
                    .ok()
                    .filter(|&i| i < store.databases())
                    .ok_or_else(|| {
                        PersistError::corrupt(format!("database index {} out of range", index))
                    })?;
            }
            OP_RESIZEDB => {
                let count = read_plain_length(&mut buf)?;
                for _ in 0..count {
                    load_entry(&mut buf, store, db, now, &mut stats)?;
                }
            }
            OP_AUX => {
                let key = read_string(&mut buf)?;
                let value = read_string(&mut buf)?;
                debug!(
                    "snapshot aux field {}={}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
            other => {
                warn!("skipping unknown snapshot opcode {:#04x}", other);
            }
        }
    }

    Ok(stats)
}

fn load_entry<S: Store + ?Sized>(
    buf: &mut Bytes,
    store: &mut S,
    db: usize,
    now: u64,
    stats: &mut LoadStats,
) -> Result<()> {
    let mut type_byte = read_u8(buf)?;
    let mut expire_at = None;
    if type_byte == OP_EXPIRETIME_MS {
        expire_at = Some(read_u64(buf)?);
        type_byte = read_u8(buf)?;
    }

    let (key, value) = read_object(buf, type_byte)?;
    if matches!(expire_at, Some(at) if at <= now) {
        stats.expired += 1;
        return Ok(());
    }

    store.restore(db, DumpEntry { key, value, expire_at });
    stats.loaded += 1;
    Ok(())
}
