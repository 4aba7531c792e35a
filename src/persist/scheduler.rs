//! Periodic BGSAVE and BGREWRITEAOF triggers

use super::{JobKind, Persistence};
use crate::store::Store;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Spawn the trigger loop
///
/// The task only holds a weak reference and stops once the persistence
/// layer is shut down or dropped.
pub fn spawn_scheduler<S: Store + 'static>(persistence: &Arc<Persistence<S>>) -> JoinHandle<()> {
    let weak = Arc::downgrade(persistence);
    let period = persistence.config().save_interval();

    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(persistence) = Weak::upgrade(&weak) else {
                break;
            };
            if persistence.is_closed() {
                break;
            }
            run_triggers(&persistence).await;
        }
        debug!("persistence scheduler stopped");
    })
}

/// Check both triggers once and start whichever job is due
///
/// BGSAVE is checked first; if it starts, the rewrite waits for a later tick.
pub(crate) async fn run_triggers<S: Store + 'static>(persistence: &Persistence<S>) -> Option<JobKind> {
    let config = persistence.config();
    let status = persistence.status();

    let dirty = status.dirty();
    if config.save_threshold > 0 && dirty >= config.save_threshold {
        info!("{} changes since last save, starting background save", dirty);
        match persistence.bgsave() {
            Ok(_) => return Some(JobKind::BgSave),
            Err(e) if e.is_in_progress() => debug!("scheduled save deferred: {}", e),
            Err(e) => warn!("scheduled save failed to start: {}", e),
        }
        return None;
    }

    let journal = persistence.journal()?;
    if config.rewrite_growth_percent == 0 {
        return None;
    }
    let size = journal.size().await;
    let base = status.rewrite_base_size();
    if size < config.rewrite_min_size || !grown_past(size, base, config.rewrite_growth_percent) {
        return None;
    }

    info!(
        "journal grew from {} to {} bytes, starting background rewrite",
        base, size
    );
    match persistence.rewrite_journal() {
        Ok(_) => Some(JobKind::Rewrite),
        Err(e) if e.is_in_progress() => {
            debug!("scheduled rewrite deferred: {}", e);
            None
        }
        Err(e) => {
            warn!("scheduled rewrite failed to start: {}", e);
            None
        }
    }
}

/// Whether `size` exceeds `base` by at least `percent` percent
fn grown_past(size: u64, base: u64, percent: u64) -> bool {
    let threshold = base.saturating_mul(100 + percent) / 100;
    size >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FsyncPolicy, PersistenceConfig, SnapshotMode};
    use crate::protocol::record;
    use crate::store::Keyspace;
    use std::time::Duration;

    fn config(dir: &std::path::Path) -> PersistenceConfig {
        PersistenceConfig {
            append_fsync: FsyncPolicy::Always,
            snapshot_mode: SnapshotMode::Copy,
            save_threshold: 3,
            save_interval_ms: 20,
            rewrite_growth_percent: 0,
            ..PersistenceConfig::in_dir(dir)
        }
    }

    async fn apply_writes(persistence: &Persistence<Keyspace>, n: usize) {
        for i in 0..n {
            let command = record(["SET".to_string(), format!("key{}", i), i.to_string()]);
            persistence.store().write().execute(0, &command);
            persistence.append(0, command).await.unwrap();
            persistence.note_write();
        }
    }

    #[test]
    fn test_growth_threshold() {
        assert!(grown_past(200, 100, 100));
        assert!(!grown_past(199, 100, 100));
        assert!(grown_past(150, 100, 50));
        assert!(grown_past(1, 0, 100));
    }

    #[tokio::test]
    async fn test_save_below_threshold_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::open(config(dir.path()), Keyspace::new(16))
            .await
            .unwrap();
        apply_writes(&persistence, 2).await;

        assert_eq!(run_triggers(&persistence).await, None);
        assert!(persistence.gate().is_idle());
        persistence.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_rewrite_triggered_by_growth() {
        let dir = tempfile::tempdir().unwrap();
        let config = PersistenceConfig {
            save_threshold: 0,
            rewrite_min_size: 1,
            rewrite_growth_percent: 100,
            ..config(dir.path())
        };
        let persistence = Persistence::open(config, Keyspace::new(16)).await.unwrap();
        apply_writes(&persistence, 10).await;
        persistence.journal().unwrap().sync().await.unwrap();

        assert_eq!(run_triggers(&persistence).await, Some(JobKind::Rewrite));
        persistence.wait_idle().await;
        assert!(persistence.status().last_rewrite_ok());
        assert_eq!(
            persistence.status().rewrite_base_size(),
            persistence.journal().unwrap().size().await
        );
        persistence.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_runs_background_save() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(
            Persistence::open(config(dir.path()), Keyspace::new(16))
                .await
                .unwrap(),
        );
        apply_writes(&persistence, 5).await;

        let scheduler = spawn_scheduler(&persistence);
        let saved = time::timeout(Duration::from_secs(5), async {
            while persistence.status().dirty() > 0 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(saved.is_ok());
        persistence.wait_idle().await;
        assert!(persistence.config().snapshot_path.exists());

        persistence.shutdown().await.unwrap();
        time::timeout(Duration::from_secs(5), scheduler)
            .await
            .unwrap()
            .unwrap();
    }
}
