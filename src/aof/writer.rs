//! AOF writer
//!
//! Producers hand records to a bounded queue; one background task owns the
//! file handle and the database cursor and performs every write. The file
//! sits behind an async mutex that compaction also takes for its short
//! freeze and swap steps.

use super::{encode_record, select_record};
use crate::config::{FsyncPolicy, PersistenceConfig};
use crate::error::{PersistError, Result};
use crate::protocol::LogRecord;
use bytes::BytesMut;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// A queued record and the database it belongs to
#[derive(Debug)]
pub(crate) struct JournalEntry {
    db: usize,
    command: LogRecord,
}

enum Control {
    Sync(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// The open journal file and the state only its writer mutates
pub(crate) struct JournalFile {
    file: File,
    /// Database of the last record written, None until the first write
    pub(crate) cursor: Option<usize>,
    /// Length of the file up to the last complete record
    pub(crate) written: u64,
    unsynced: bool,
}

impl JournalFile {
    pub(crate) async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path).await?;
        let written = file.metadata().await?.len();
        Ok(JournalFile {
            file,
            cursor: None,
            written,
            unsynced: false,
        })
    }

    /// Write a batch, emitting `SELECT` whenever the database changes
    ///
    /// On failure the file is cut back to the last complete record and the
    /// cursor forgotten, so the next write starts with a fresh `SELECT`.
    async fn write_batch(&mut self, batch: &[JournalEntry]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(batch.len() * 64);
        let mut cursor = self.cursor;
        for entry in batch {
            if cursor != Some(entry.db) {
                encode_record(&mut buf, &select_record(entry.db));
                cursor = Some(entry.db);
            }
            encode_record(&mut buf, &entry.command);
        }

        let result: std::io::Result<()> = async {
            self.file.write_all(&buf).await?;
            self.file.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                self.written += buf.len() as u64;
                self.cursor = cursor;
                self.unsynced = true;
                Ok(())
            }
            Err(e) => {
                error!(
                    "journal write failed, dropping {} records: {}",
                    batch.len(),
                    e
                );
                if let Err(trunc) = self.file.set_len(self.written).await {
                    error!("failed to cut journal back to {} bytes: {}", self.written, trunc);
                }
                self.cursor = None;
                Err(e.into())
            }
        }
    }

    pub(crate) async fn sync(&mut self) -> Result<()> {
        if self.unsynced {
            self.file.sync_all().await?;
            self.unsynced = false;
        }
        Ok(())
    }

    /// Replace the handle after the journal was swapped on disk
    pub(crate) async fn reopen(&mut self, path: &Path) -> Result<()> {
        let cursor = self.cursor;
        *self = JournalFile::open(path).await?;
        self.cursor = cursor;
        Ok(())
    }
}

/// Handle to the append-only journal
///
/// Cloning is cheap; every clone feeds the same writer task.
#[derive(Clone)]
pub struct Journal {
    entries: mpsc::Sender<JournalEntry>,
    control: mpsc::UnboundedSender<Control>,
    pub(crate) shared: Arc<Mutex<JournalFile>>,
    path: PathBuf,
    worker: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

/// A reserved queue slot
///
/// Reserving before the command runs and sending while the store lock is
/// still held keeps journal order identical to execution order.
pub struct JournalPermit<'a> {
    permit: mpsc::Permit<'a, JournalEntry>,
}

impl JournalPermit<'_> {
    pub fn append(self, db: usize, command: LogRecord) {
        self.permit.send(JournalEntry { db, command });
    }
}

impl Journal {
    /// Open (or create) the journal described by `config` and start its writer
    pub async fn open(config: &PersistenceConfig) -> Result<Self> {
        Self::open_with(
            &config.journal_path,
            config.append_fsync,
            config.fsync_interval(),
            config.queue_capacity,
        )
        .await
    }

    pub async fn open_with(
        path: &Path,
        policy: FsyncPolicy,
        interval: Duration,
        capacity: usize,
    ) -> Result<Self> {
        let file = JournalFile::open(path).await?;
        info!(
            "journal {:?} opened ({} bytes, fsync {:?})",
            path, file.written, policy
        );

        let shared = Arc::new(Mutex::new(file));
        let (entries, entries_rx) = mpsc::channel(capacity.max(1));
        let (control, control_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_writer(
            entries_rx,
            control_rx,
            Arc::clone(&shared),
            policy,
            interval,
            capacity.max(1),
        ));

        Ok(Journal {
            entries,
            control,
            shared,
            path: path.to_path_buf(),
            worker: Arc::new(parking_lot::Mutex::new(Some(worker))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve a queue slot, waiting while the queue is full
    pub async fn reserve(&self) -> Result<JournalPermit<'_>> {
        let permit = self
            .entries
            .reserve()
            .await
            .map_err(|_| PersistError::WriterClosed)?;
        Ok(JournalPermit { permit })
    }

    /// Queue a record for database `db`
    pub async fn append(&self, db: usize, command: LogRecord) -> Result<()> {
        self.reserve().await?.append(db, command);
        Ok(())
    }

    /// Wait until every record queued before this call is written and fsynced
    pub async fn sync(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Control::Sync(tx))
            .map_err(|_| PersistError::WriterClosed)?;
        rx.await.map_err(|_| PersistError::WriterClosed)?
    }

    /// Bytes of complete records currently in the journal
    pub async fn size(&self) -> u64 {
        self.shared.lock().await.written
    }

    /// Drain the queue, fsync and stop the writer
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::Shutdown(tx)).is_err() {
            return Ok(());
        }
        let result = rx.await.map_err(|_| PersistError::WriterClosed)?;

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("journal {:?} closed", self.path);
        result
    }
}

async fn run_writer(
    mut entries: mpsc::Receiver<JournalEntry>,
    mut control: mpsc::UnboundedReceiver<Control>,
    shared: Arc<Mutex<JournalFile>>,
    policy: FsyncPolicy,
    interval: Duration,
    max_batch: usize,
) {
    let immediate = policy != FsyncPolicy::EverySecond;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut batch = Vec::new();

    loop {
        tokio::select! {
            biased;

            message = control.recv() => {
                drain(&mut entries, &mut batch);
                let result = write_pending(&shared, &mut batch, true).await;
                match message {
                    Some(Control::Sync(reply)) => {
                        let _ = reply.send(result);
                    }
                    Some(Control::Shutdown(reply)) => {
                        // recv only returns None once every reserved permit
                        // has been filled or dropped
                        entries.close();
                        while let Some(entry) = entries.recv().await {
                            batch.push(entry);
                        }
                        let rest = write_pending(&shared, &mut batch, true).await;
                        let _ = reply.send(result.and(rest));
                        break;
                    }
                    None => break,
                }
            }

            entry = entries.recv() => match entry {
                Some(entry) => {
                    batch.push(entry);
                    drain(&mut entries, &mut batch);
                    if immediate || batch.len() >= max_batch {
                        let fsync = policy == FsyncPolicy::Always;
                        let _ = write_pending(&shared, &mut batch, fsync).await;
                    }
                }
                None => {
                    let _ = write_pending(&shared, &mut batch, true).await;
                    break;
                }
            },

            _ = ticker.tick(), if !immediate => {
                drain(&mut entries, &mut batch);
                if let Err(e) = write_pending(&shared, &mut batch, true).await {
                    debug!("journal tick failed: {}", e);
                }
            }
        }
    }
    debug!("journal writer stopped");
}

fn drain(entries: &mut mpsc::Receiver<JournalEntry>, batch: &mut Vec<JournalEntry>) {
    while let Ok(entry) = entries.try_recv() {
        batch.push(entry);
    }
}

async fn write_pending(
    shared: &Mutex<JournalFile>,
    batch: &mut Vec<JournalEntry>,
    fsync: bool,
) -> Result<()> {
    let mut journal = shared.lock().await;
    let written = if batch.is_empty() {
        Ok(())
    } else {
        journal.write_batch(batch).await
    };
    batch.clear();
    written?;

    if fsync {
        if let Err(e) = journal.sync().await {
            error!("journal fsync failed: {}", e);
            return Err(e);
        }
    }
    Ok(())
}
