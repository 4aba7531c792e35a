//! Point-in-time views for background saves
//!
//! `CopySnapshot` clones every entry under a read lock and writes the copy
//! on a blocking task. `ForkSnapshot` duplicates the process while holding
//! the read lock; the child writes the memory it inherited and exits.

use crate::config::SnapshotMode;
use crate::error::{PersistError, Result};
use crate::rdb::{dump_databases, SnapshotStats};
use crate::store::Store;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A background dump in flight
pub type BackgroundDump = JoinHandle<Result<SnapshotStats>>;

/// Capture a consistent-enough view of the store and dump it in the background
pub trait PointInTimeSnapshot<S: Store>: Send + Sync {
    /// Capture the view synchronously and start writing it to `path`
    fn start(&self, store: &Arc<RwLock<S>>, path: PathBuf) -> Result<BackgroundDump>;

    fn name(&self) -> &'static str;
}

/// Copy every entry, then write without holding the lock
///
/// Writers are blocked only while the copy is taken.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopySnapshot;

impl<S: Store + 'static> PointInTimeSnapshot<S> for CopySnapshot {
    fn start(&self, store: &Arc<RwLock<S>>, path: PathBuf) -> Result<BackgroundDump> {
        let dumps = store.read().collect_all();
        Ok(tokio::task::spawn_blocking(move || {
            dump_databases(&dumps, &path)
        }))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Duplicate the process and let the child write its frozen memory
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkSnapshot;

#[cfg(unix)]
impl<S: Store + 'static> PointInTimeSnapshot<S> for ForkSnapshot {
    fn start(&self, store: &Arc<RwLock<S>>, path: PathBuf) -> Result<BackgroundDump> {
        // Holding the read lock across fork() guarantees no writer is halfway
        // through a mutation in the memory the child inherits.
        let guard = store.read();

        // SAFETY: the child only runs the snapshot writer, which allocates and
        // does file I/O but takes no lock another thread could have held at
        // fork time, then leaves through _exit without running destructors.
        let pid = unsafe { libc::fork() };
        match pid {
            -1 => Err(PersistError::Io(std::io::Error::last_os_error())),
            0 => {
                let code = match crate::rdb::dump_store(&*guard, &path) {
                    Ok(_) => 0,
                    Err(_) => 1,
                };
                // SAFETY: terminates the child immediately
                unsafe { libc::_exit(code) }
            }
            child => {
                drop(guard);
                Ok(tokio::task::spawn_blocking(move || wait_child(child, &path)))
            }
        }
    }

    fn name(&self) -> &'static str {
        "fork"
    }
}

#[cfg(unix)]
fn wait_child(pid: libc::pid_t, path: &std::path::Path) -> Result<SnapshotStats> {
    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: waits on a child this process created
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc != -1 {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err.into());
        }
    }

    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 {
        let bytes = std::fs::metadata(path)?.len();
        Ok(SnapshotStats {
            bytes,
            ..SnapshotStats::default()
        })
    } else if libc::WIFSIGNALED(status) {
        Err(PersistError::ChildFailed(format!(
            "killed by signal {}",
            libc::WTERMSIG(status)
        )))
    } else {
        Err(PersistError::ChildFailed(format!(
            "exited with status {}",
            libc::WEXITSTATUS(status)
        )))
    }
}

/// The capability configured by `mode`
pub fn snapshotter_for<S: Store + 'static>(mode: SnapshotMode) -> Box<dyn PointInTimeSnapshot<S>> {
    match mode {
        SnapshotMode::Copy => Box::new(CopySnapshot),
        #[cfg(unix)]
        SnapshotMode::Fork => Box::new(ForkSnapshot),
        #[cfg(not(unix))]
        SnapshotMode::Fork => {
            tracing::warn!("fork snapshots are unavailable on this platform, copying instead");
            Box::new(CopySnapshot)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdb::load_snapshot;
    use crate::store::{sorted_contents, Keyspace};
    use bytes::Bytes;

    fn seeded() -> Arc<RwLock<Keyspace>> {
        let mut store = Keyspace::new(2);
        for i in 0..100 {
            let command = vec![
                Bytes::from("SET"),
                Bytes::from(format!("key{}", i)),
                Bytes::from(i.to_string()),
            ];
            store.execute(i % 2, &command);
        }
        Arc::new(RwLock::new(store))
    }

    #[tokio::test]
    async fn test_copy_is_taken_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.rdb");
        let store = seeded();
        let expected = sorted_contents(&*store.read());

        let dump = CopySnapshot.start(&store, path.clone()).unwrap();
        store
            .write()
            .execute(0, &[Bytes::from("SET"), Bytes::from("late"), Bytes::from("x")]);
        let stats = dump.await.unwrap().unwrap();
        assert_eq!(stats.keys, 100);

        let mut loaded = Keyspace::new(2);
        load_snapshot(&path, &mut loaded).unwrap();
        assert_eq!(sorted_contents(&loaded), expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fork_child_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.rdb");
        let store = seeded();

        let dump = ForkSnapshot.start(&store, path.clone()).unwrap();
        let stats = dump.await.unwrap().unwrap();
        assert!(stats.bytes > 0);

        let mut loaded = Keyspace::new(2);
        load_snapshot(&path, &mut loaded).unwrap();
        assert_eq!(sorted_contents(&loaded), sorted_contents(&*store.read()));
    }

    #[test]
    fn test_mode_selection() {
        let copy: Box<dyn PointInTimeSnapshot<Keyspace>> = snapshotter_for(SnapshotMode::Copy);
        assert_eq!(copy.name(), "copy");
        let fork: Box<dyn PointInTimeSnapshot<Keyspace>> = snapshotter_for(SnapshotMode::Fork);
        assert_eq!(fork.name(), if cfg!(unix) { "fork" } else { "copy" });
    }
}
