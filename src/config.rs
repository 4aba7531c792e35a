//! Persistence configuration
//!
//! All knobs the durability subsystem reads. Loadable from a JSON file; any
//! field left out keeps its default.

use crate::error::{PersistError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Journal fsync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsyncPolicy {
    /// Drain every record as soon as it is queued and fsync after each batch
    Always,
    /// Drain on a timer and fsync once per tick
    #[serde(rename = "everysec")]
    EverySecond,
    /// Drain immediately and let the OS decide when to sync
    No,
}

impl Default for FsyncPolicy {
    fn default() -> Self {
        FsyncPolicy::EverySecond
    }
}

/// How background saves obtain their point-in-time view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    /// Copy every entry under a read lock, then write on a blocking task
    #[default]
    Copy,
    /// Duplicate the process and let the child write (Unix only)
    Fork,
}

/// Persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Whether write commands are journaled
    pub append_only: bool,
    /// Journal fsync policy
    pub append_fsync: FsyncPolicy,
    /// Tick length of the `everysec` policy
    pub fsync_interval_ms: u64,
    /// Path to the journal
    pub journal_path: PathBuf,
    /// Path to the snapshot
    pub snapshot_path: PathBuf,
    /// Number of logical databases
    pub databases: usize,
    /// Writes accumulated before the scheduler triggers BGSAVE (0 disables)
    pub save_threshold: u64,
    /// How often the scheduler checks its triggers
    pub save_interval_ms: u64,
    /// Point-in-time strategy for BGSAVE
    pub snapshot_mode: SnapshotMode,
    /// Capacity of the journal producer queue
    pub queue_capacity: usize,
    /// Accept a journal whose last record is cut short
    pub load_truncated: bool,
    /// Minimum journal size before automatic compaction
    pub rewrite_min_size: u64,
    /// Growth over the post-compaction size that triggers compaction (0 disables)
    pub rewrite_growth_percent: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            append_only: true,
            append_fsync: FsyncPolicy::default(),
            fsync_interval_ms: 1000,
            journal_path: PathBuf::from("ferrumdb.aof"),
            snapshot_path: PathBuf::from("dump.rdb"),
            databases: 16,
            save_threshold: 1000,
            save_interval_ms: 60_000,
            snapshot_mode: SnapshotMode::default(),
            queue_capacity: 4096,
            load_truncated: true,
            rewrite_min_size: 64 * 1024 * 1024,
            rewrite_growth_percent: 100,
        }
    }
}

impl PersistenceConfig {
    /// Configuration rooted in `dir`, using the default file names
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        PersistenceConfig {
            journal_path: dir.join("ferrumdb.aof"),
            snapshot_path: dir.join("dump.rdb"),
            ..Default::default()
        }
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let config: PersistenceConfig = serde_json::from_slice(&raw)
            .map_err(|e| PersistError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the subsystem cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.databases == 0 {
            return Err(PersistError::Config("databases must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(PersistError::Config("queue_capacity must be at least 1".into()));
        }
        if self.fsync_interval_ms == 0 {
            return Err(PersistError::Config("fsync_interval_ms must be positive".into()));
        }
        if self.save_interval_ms == 0 {
            return Err(PersistError::Config("save_interval_ms must be positive".into()));
        }
        if self.journal_path == self.snapshot_path {
            return Err(PersistError::Config(
                "journal_path and snapshot_path must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn fsync_interval(&self) -> Duration {
        Duration::from_millis(self.fsync_interval_ms)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }
}
