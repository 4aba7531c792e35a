//! AOF rewrite (compaction)
//!
//! Three phases, only the first and last under the journal lock:
//!
//! 1. Freeze: fsync the journal, record its length `L` and the writer's
//!    database cursor, create an empty scratch file.
//! 2. Rebuild: replay the first `L` bytes into a scratch store and write the
//!    minimal commands that recreate it. Writers keep appending meanwhile.
//! 3. Stitch: append `SELECT <cursor at freeze>` and every byte written
//!    after `L` to the scratch file, then `SELECT <current cursor>`, fsync,
//!    rename it over the journal and reopen the handle.
//!
//! Any failure removes the scratch file and leaves the journal untouched.

use super::{encode_record, load_journal, select_record, Journal, REWRITE_ITEMS_PER_COMMAND};
use crate::commands::format_score;
use crate::error::{PersistError, Result};
use crate::store::{now_ms, Store, Value};
use bytes::{Bytes, BytesMut};
use std::io::{self, BufWriter, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error, info, warn};

const FLUSH_THRESHOLD: usize = 64 * 1024;

/// Outcome of a completed rewrite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Keys re-emitted from the frozen prefix
    pub keys: usize,
    /// Bytes of re-emitted commands
    pub base_bytes: u64,
    /// Bytes copied from after the freeze point
    pub tail_bytes: u64,
    /// Size of the new journal
    pub size: u64,
}

/// State carried from the freeze phase to the later ones
struct RewriteContext {
    scratch: std::fs::File,
    db_at_start: Option<usize>,
    offset_at_start: u64,
}

fn scratch_path(journal: &Path) -> PathBuf {
    let target = journal
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("appendonly.aof");
    journal.with_file_name(format!("temp-rewriteaof-{}-{}", std::process::id(), target))
}

/// Compact `journal`, using `scratch` (an empty store) to rebuild its state
pub async fn rewrite_journal<S>(journal: &Journal, scratch: S) -> Result<RewriteStats>
where
    S: Store + 'static,
{
    let path = journal.path().to_path_buf();
    let tmp = scratch_path(&path);

    let result = run_phases(journal, scratch, &path, &tmp).await;
    match &result {
        Ok(stats) => info!(
            "journal rewrite finished: {} keys, {} tail bytes, {} bytes total",
            stats.keys, stats.tail_bytes, stats.size
        ),
        Err(e) => {
            warn!("journal rewrite failed: {}", e);
            let _ = tokio::fs::remove_file(&tmp).await;
        }
    }
    result
}

async fn run_phases<S>(journal: &Journal, scratch: S, path: &Path, tmp: &Path) -> Result<RewriteStats>
where
    S: Store + 'static,
{
    let ctx = {
        let mut file = journal.shared.lock().await;
        file.sync().await?;
        RewriteContext {
            scratch: std::fs::File::create(tmp)?,
            db_at_start: file.cursor,
            offset_at_start: file.written,
        }
    };
    debug!(
        "journal rewrite frozen at offset {} (db {:?})",
        ctx.offset_at_start, ctx.db_at_start
    );

    let RewriteContext {
        scratch: scratch_file,
        db_at_start,
        offset_at_start,
    } = ctx;

    let source = path.to_path_buf();
    let (scratch_file, base_bytes, keys) = tokio::task::spawn_blocking(move || {
        let mut store = scratch;
        load_journal(&source, Some(offset_at_start), &mut store)?;
        let mut out = BufWriter::new(scratch_file);
        let (bytes, keys) = write_store_commands(&store, &mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        Ok::<_, PersistError>((file, bytes, keys))
    })
    .await
    .map_err(|e| PersistError::Io(io::Error::new(io::ErrorKind::Other, e)))??;

    let mut scratch = tokio::fs::File::from_std(scratch_file);
    let mut file = journal.shared.lock().await;

    if let Some(db) = db_at_start {
        write_record(&mut scratch, &select_record(db)).await?;
    }

    let tail_len = file.written.saturating_sub(offset_at_start);
    let mut original = tokio::fs::File::open(path).await?;
    original.seek(SeekFrom::Start(offset_at_start)).await?;
    let mut tail = original.take(tail_len);
    let tail_bytes = tokio::io::copy(&mut tail, &mut scratch).await?;
    if tail_bytes != tail_len {
        return Err(PersistError::corrupt(format!(
            "journal shrank during rewrite: copied {} of {} tail bytes",
            tail_bytes, tail_len
        )));
    }

    if let Some(db) = file.cursor {
        write_record(&mut scratch, &select_record(db)).await?;
    }
    scratch.flush().await?;
    scratch.sync_all().await?;
    drop(scratch);

    tokio::fs::rename(tmp, path).await?;
    if let Err(e) = file.reopen(path).await {
        // The writer still holds the replaced file; appends would be lost
        error!("failed to reopen journal {:?} after rewrite, retrying: {}", path, e);
        file.reopen(path).await?;
    }

    Ok(RewriteStats {
        keys,
        base_bytes,
        tail_bytes,
        size: file.written,
    })
}

async fn write_record(file: &mut tokio::fs::File, record: &[Bytes]) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_record(&mut buf, record);
    file.write_all(&buf).await?;
    Ok(())
}

/// Write the commands that rebuild every live key of `store`
///
/// Each non-empty database starts with `SELECT`. Collections are emitted in
/// chunks of at most `REWRITE_ITEMS_PER_COMMAND` items, keys with an expiry
/// are followed by `PEXPIREAT`, and already expired keys are skipped.
/// Returns the number of bytes written and of keys emitted.
pub fn write_store_commands<S, W>(store: &S, out: &mut W) -> Result<(u64, usize)>
where
    S: Store + ?Sized,
    W: Write,
{
    let now = now_ms();
    let mut buf = BytesMut::with_capacity(FLUSH_THRESHOLD * 2);
    let mut bytes = 0u64;
    let mut keys = 0usize;

    for db in 0..store.databases() {
        if store.len(db) == 0 {
            continue;
        }
        encode_record(&mut buf, &select_record(db));

        let mut failure = None;
        store.for_each(db, &mut |key, value, expire_at| {
            if matches!(expire_at, Some(at) if at <= now) || value.is_empty_collection() {
                return true;
            }
            emit_value(&mut buf, key, value);
            if let Some(at) = expire_at {
                encode_record(
                    &mut buf,
                    &[
                        Bytes::from_static(b"PEXPIREAT"),
                        key.clone(),
                        Bytes::from(at.to_string()),
                    ],
                );
            }
            keys += 1;

            if buf.len() >= FLUSH_THRESHOLD {
                if let Err(e) = out.write_all(&buf) {
                    failure = Some(e);
                    return false;
                }
                bytes += buf.len() as u64;
                buf.clear();
            }
            true
        });
        if let Some(e) = failure {
            return Err(e.into());
        }
    }

    out.write_all(&buf)?;
    out.flush()?;
    bytes += buf.len() as u64;
    Ok((bytes, keys))
}

fn emit_value(buf: &mut BytesMut, key: &Bytes, value: &Value) {
    match value {
        Value::String(s) => encode_record(
            buf,
            &[Bytes::from_static(b"SET"), key.clone(), s.clone()],
        ),
        Value::List(list) => emit_chunked(buf, "RPUSH", key, 1, list.iter().cloned()),
        Value::Set(set) => emit_chunked(buf, "SADD", key, 1, set.iter().cloned()),
        Value::Hash(hash) => emit_chunked(
            buf,
            "HSET",
            key,
            2,
            hash.iter().flat_map(|(f, v)| [f.clone(), v.clone()]),
        ),
        Value::SortedSet(zset) => emit_chunked(
            buf,
            "ZADD",
            key,
            2,
            zset.iter()
                .flat_map(|(m, s)| [Bytes::from(format_score(*s)), m.clone()]),
        ),
    }
}

/// Emit `name key args...`, starting a new command every
/// `REWRITE_ITEMS_PER_COMMAND` items of `arity` arguments each
fn emit_chunked(
    buf: &mut BytesMut,
    name: &'static str,
    key: &Bytes,
    arity: usize,
    args: impl Iterator<Item = Bytes>,
) {
    let full = 2 + arity * REWRITE_ITEMS_PER_COMMAND;
    let mut command: Vec<Bytes> = Vec::with_capacity(full);
    for arg in args {
        if command.is_empty() {
            command.push(Bytes::from_static(name.as_bytes()));
            command.push(key.clone());
        }
        command.push(arg);
        if command.len() == full {
            encode_record(buf, &command);
            command.clear();
        }
    }
    if !command.is_empty() {
        encode_record(buf, &command);
    }
}
