//! Persistence controllers
//!
//! `Persistence` ties the store to its two files: it restores state at
//! startup, feeds the journal, and runs SAVE, BGSAVE and BGREWRITEAOF under
//! a shared single-flight gate.

mod gate;
mod snapshot;
mod status;
mod scheduler;

pub use gate::{GateGuard, GateState, JobKind, PersistenceGate};
pub use scheduler::spawn_scheduler;
pub use snapshot::{snapshotter_for, BackgroundDump, CopySnapshot, PointInTimeSnapshot};
#[cfg(unix)]
pub use snapshot::ForkSnapshot;
pub use status::PersistenceStatus;

use crate::aof::{self, load_journal, Journal, RewriteStats};
use crate::config::PersistenceConfig;
use crate::error::{PersistError, Result};
use crate::rdb::{dump_store, load_snapshot, SnapshotStats};
use crate::store::Store;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A detached persistence job; awaiting it is optional
pub type BackgroundJob<T> = JoinHandle<Result<T>>;

/// Where the state was restored from at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Journal { records: usize },
    Snapshot { keys: usize },
    Empty,
}

/// The durability subsystem of one store
pub struct Persistence<S: Store + 'static> {
    config: PersistenceConfig,
    store: Arc<RwLock<S>>,
    gate: PersistenceGate,
    journal: Option<Journal>,
    snapshotter: Box<dyn PointInTimeSnapshot<S>>,
    status: Arc<PersistenceStatus>,
    restored_from: RestoreSource,
    closed: AtomicBool,
}

impl<S: Store + 'static> Persistence<S> {
    /// Restore `store` from disk and start the journal writer
    ///
    /// The journal wins when journaling is on and the file exists; otherwise
    /// the snapshot is loaded if present. Failing to read either is fatal.
    pub async fn open(config: PersistenceConfig, mut store: S) -> Result<Self> {
        config.validate()?;
        let restored_from = restore(&config, &mut store)?;

        if config.append_only && !config.journal_path.exists() {
            write_journal_base(&config, &store)?;
        }

        let journal = if config.append_only {
            Some(Journal::open(&config).await?)
        } else {
            None
        };

        let status = Arc::new(PersistenceStatus::new());
        if let Some(journal) = &journal {
            status.set_rewrite_base_size(journal.size().await);
        }

        let snapshotter = snapshotter_for(config.snapshot_mode);
        info!(
            "persistence ready ({:?}, journal {}, {} snapshots)",
            restored_from,
            if journal.is_some() { "on" } else { "off" },
            snapshotter.name()
        );

        Ok(Persistence {
            config,
            store: Arc::new(RwLock::new(store)),
            gate: PersistenceGate::new(),
            journal,
            snapshotter,
            status,
            restored_from,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RwLock<S>> {
        &self.store
    }

    pub fn gate(&self) -> &PersistenceGate {
        &self.gate
    }

    pub fn journal(&self) -> Option<&Journal> {
        self.journal.as_ref()
    }

    pub fn status(&self) -> &Arc<PersistenceStatus> {
        &self.status
    }

    pub fn restored_from(&self) -> RestoreSource {
        self.restored_from
    }

    /// Queue a record for database `db`; a no-op when journaling is off
    pub async fn append(&self, db: usize, record: crate::protocol::LogRecord) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.append(db, record).await,
            None => Ok(()),
        }
    }

    /// Count writes towards the automatic save trigger
    pub fn note_write(&self) {
        self.status.note_writes(1);
    }

    /// Dump the store in the foreground
    ///
    /// Writers are blocked for the whole dump.
    pub fn save(&self) -> Result<SnapshotStats> {
        let _guard = self.gate.try_acquire(JobKind::Save)?;
        let observed = self.status.dirty();

        let result = {
            let store = self.store.read();
            dump_store(&*store, &self.config.snapshot_path)
        };
        self.status.record_save(result.is_ok(), observed);

        match &result {
            Ok(stats) => info!(
                "DB saved on disk: {} keys, {} bytes",
                stats.keys, stats.bytes
            ),
            Err(e) => error!("SAVE failed: {}", e),
        }
        result
    }

    /// Start a background dump and return without waiting for it
    ///
    /// The gate is held until the dump finishes; if the point-in-time capture
    /// itself fails the gate is released before the error is returned.
    pub fn bgsave(&self) -> Result<BackgroundJob<SnapshotStats>> {
        let guard = self.gate.try_acquire(JobKind::BgSave)?;
        let observed = self.status.dirty();

        let dump = self
            .snapshotter
            .start(&self.store, self.config.snapshot_path.clone())?;
        info!("background saving started ({})", self.snapshotter.name());

        let status = Arc::clone(&self.status);
        Ok(tokio::spawn(async move {
            let result = match dump.await {
                Ok(result) => result,
                Err(e) => Err(PersistError::ChildFailed(e.to_string())),
            };
            status.record_bgsave(result.is_ok(), observed);
            match &result {
                Ok(_) => info!("background saving terminated with success"),
                Err(e) => error!("background saving failed: {}", e),
            }
            drop(guard);
            result
        }))
    }

    /// Start compacting the journal in the background
    pub fn rewrite_journal(&self) -> Result<BackgroundJob<RewriteStats>> {
        let journal = self.journal.clone().ok_or(PersistError::JournalDisabled)?;
        let guard = self.gate.try_acquire(JobKind::Rewrite)?;
        let scratch = self.store.read().fresh();
        info!("background append only file rewriting started");

        let status = Arc::clone(&self.status);
        Ok(tokio::spawn(async move {
            let result = aof::rewrite_journal(&journal, scratch).await;
            status.record_rewrite(result.as_ref().ok().map(|stats| stats.size));
            drop(guard);
            result
        }))
    }

    /// Unix seconds of the last successful dump
    pub fn last_save(&self) -> u64 {
        self.status.last_save()
    }

    /// Resolve once no persistence job is running
    pub async fn wait_idle(&self) {
        self.gate.wait_idle().await;
    }

    /// The INFO `# Persistence` and `# Keyspace` sections
    pub async fn info(&self) -> String {
        let journal_size = match &self.journal {
            Some(journal) => Some(journal.size().await),
            None => None,
        };
        let running = self.gate.running();

        let mut out = String::new();
        self.status.render(
            &mut out,
            running == Some(JobKind::BgSave),
            running == Some(JobKind::Rewrite),
            journal_size,
        );

        out.push_str("\r\n# Keyspace\r\n");
        let store = self.store.read();
        for db in 0..store.databases() {
            let keys = store.len(db);
            if keys > 0 {
                out.push_str(&format!("db{}:keys={}\r\n", db, keys));
            }
        }
        out
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Wait for running jobs, then drain and close the journal
    pub async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        self.wait_idle().await;
        if let Some(journal) = &self.journal {
            journal.shutdown().await?;
        }
        Ok(())
    }
}

/// Load whichever file startup should trust into `store`
fn restore<S: Store>(config: &PersistenceConfig, store: &mut S) -> Result<RestoreSource> {
    if config.append_only && config.journal_path.exists() {
        let records = match load_journal(&config.journal_path, None, store) {
            Ok(stats) => stats.records,
            Err(PersistError::TruncatedJournal { offset, applied }) if config.load_truncated => {
                warn!(
                    "journal {:?} ends with an incomplete record, trimming it to {} bytes ({} records kept)",
                    config.journal_path, offset, applied
                );
                OpenOptions::new()
                    .write(true)
                    .open(&config.journal_path)?
                    .set_len(offset)?;
                applied
            }
            Err(e) => return Err(e),
        };
        return Ok(RestoreSource::Journal { records });
    }

    if config.snapshot_path.exists() {
        let stats = load_snapshot(&config.snapshot_path, store)?;
        return Ok(RestoreSource::Snapshot { keys: stats.loaded });
    }

    Ok(RestoreSource::Empty)
}

/// Seed a new journal with commands recreating the loaded state
fn write_journal_base<S: Store>(config: &PersistenceConfig, store: &S) -> Result<()> {
    let path = &config.journal_path;
    let tmp = path.with_extension("aof.base");

    let result = (|| -> Result<(u64, usize)> {
        let mut out = BufWriter::new(File::create(&tmp)?);
        let written = aof::write_store_commands(store, &mut out)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(written)
    })();

    match result {
        Ok((bytes, keys)) => {
            info!("journal {:?} created with {} keys ({} bytes)", path, keys, bytes);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
