//! ferrum-durable - durability for an in-memory key-value store
//!
//! Two persistence mechanisms over one keyspace:
//! - a point-in-time binary snapshot (`rdb`)
//! - an append-only journal of write commands with online compaction (`aof`)
//!
//! `persist` coordinates them behind a single-flight gate, restores state at
//! startup and schedules background jobs; `dispatch` is the thin front door
//! that executes commands and journals writes.

pub mod protocol;
pub mod store;
pub mod commands;
pub mod rdb;
pub mod aof;
pub mod persist;
pub mod dispatch;
pub mod config;
pub mod error;

/// Re-export commonly used types
pub use store::{Keyspace, MemoryStore, Entry, Store, Value};
pub use protocol::{RespValue, RespError};
pub use commands::{Command, CommandContext};
pub use config::{FsyncPolicy, PersistenceConfig, SnapshotMode};
pub use error::{PersistError, Result};
pub use persist::{spawn_scheduler, JobKind, Persistence, PersistenceGate};
pub use dispatch::Dispatcher;

/// Route `tracing` output through the test harness; set `RUST_LOG` to see it
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
