//! Persistence counters shared by the controllers, the scheduler and INFO

use crate::store::now_ms;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug)]
pub struct PersistenceStatus {
    dirty: AtomicU64,
    last_save: AtomicU64,
    last_bgsave_ok: AtomicBool,
    last_rewrite_ok: AtomicBool,
    rewrite_base_size: AtomicU64,
}

impl Default for PersistenceStatus {
    fn default() -> Self {
        PersistenceStatus {
            dirty: AtomicU64::new(0),
            last_save: AtomicU64::new(now_ms() / 1000),
            last_bgsave_ok: AtomicBool::new(true),
            last_rewrite_ok: AtomicBool::new(true),
            rewrite_base_size: AtomicU64::new(0),
        }
    }
}

impl PersistenceStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `n` writes since the last successful dump
    pub fn note_writes(&self, n: u64) {
        self.dirty.fetch_add(n, Ordering::Relaxed);
    }

    pub fn dirty(&self) -> u64 {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Record the outcome of a dump that started when `observed` writes were pending
    ///
    /// Writes that arrived while the dump ran stay counted.
    pub fn record_save(&self, ok: bool, observed: u64) {
        if ok {
            let _ = self
                .dirty
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                    Some(d.saturating_sub(observed))
                });
            self.last_save.store(now_ms() / 1000, Ordering::Relaxed);
        }
    }

    pub fn record_bgsave(&self, ok: bool, observed: u64) {
        self.last_bgsave_ok.store(ok, Ordering::Relaxed);
        self.record_save(ok, observed);
    }

    /// Record a rewrite outcome; `size` is the new journal size on success
    pub fn record_rewrite(&self, size: Option<u64>) {
        self.last_rewrite_ok.store(size.is_some(), Ordering::Relaxed);
        if let Some(size) = size {
            self.rewrite_base_size.store(size, Ordering::Relaxed);
        }
    }

    pub fn set_rewrite_base_size(&self, size: u64) {
        self.rewrite_base_size.store(size, Ordering::Relaxed);
    }

    /// Unix seconds of the last successful dump (or of startup)
    pub fn last_save(&self) -> u64 {
        self.last_save.load(Ordering::Relaxed)
    }

    pub fn last_bgsave_ok(&self) -> bool {
        self.last_bgsave_ok.load(Ordering::Relaxed)
    }

    pub fn last_rewrite_ok(&self) -> bool {
        self.last_rewrite_ok.load(Ordering::Relaxed)
    }

    pub fn rewrite_base_size(&self) -> u64 {
        self.rewrite_base_size.load(Ordering::Relaxed)
    }

    /// Render the `# Persistence` INFO section
    pub fn render(
        &self,
        out: &mut String,
        bgsave_running: bool,
        rewrite_running: bool,
        journal_size: Option<u64>,
    ) {
        let ok = |flag: bool| if flag { "ok" } else { "err" };
        let _ = writeln!(out, "# Persistence\r");
        let _ = writeln!(out, "rdb_changes_since_last_save:{}\r", self.dirty());
        let _ = writeln!(out, "rdb_bgsave_in_progress:{}\r", bgsave_running as u8);
        let _ = writeln!(out, "rdb_last_save_time:{}\r", self.last_save());
        let _ = writeln!(out, "rdb_last_bgsave_status:{}\r", ok(self.last_bgsave_ok()));
        let _ = writeln!(out, "aof_enabled:{}\r", journal_size.is_some() as u8);
        let _ = writeln!(out, "aof_rewrite_in_progress:{}\r", rewrite_running as u8);
        let _ = writeln!(out, "aof_last_bgrewrite_status:{}\r", ok(self.last_rewrite_ok()));
        if let Some(size) = journal_size {
            let _ = writeln!(out, "aof_current_size:{}\r", size);
            let _ = writeln!(out, "aof_base_size:{}\r", self.rewrite_base_size());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_reset_by_observed_amount() {
        let status = PersistenceStatus::new();
        status.note_writes(10);
        let observed = status.dirty();
        status.note_writes(3);

        status.record_bgsave(true, observed);
        assert_eq!(status.dirty(), 3);
        assert!(status.last_bgsave_ok());
    }

    #[test]
    fn test_failed_save_keeps_counter() {
        let status = PersistenceStatus::new();
        status.note_writes(5);
        status.record_bgsave(false, 5);
        assert_eq!(status.dirty(), 5);
        assert!(!status.last_bgsave_ok());
    }

    #[test]
    fn test_render() {
        let status = PersistenceStatus::new();
        status.note_writes(2);
        status.record_rewrite(Some(1234));

        let mut out = String::new();
        status.render(&mut out, true, false, Some(2000));
        assert!(out.starts_with("# Persistence\r\n"));
        assert!(out.contains("rdb_changes_since_last_save:2\r\n"));
        assert!(out.contains("rdb_bgsave_in_progress:1\r\n"));
        assert!(out.contains("aof_base_size:1234\r\n"));
        assert!(out.contains("aof_current_size:2000\r\n"));
    }
}
