//! Command dispatcher
//!
//! Routes incoming commands either to the persistence controllers or to the
//! store, and journals every successful write in execution order.

use crate::aof::JournalPermit;
use crate::commands::{parse_integer, CommandRegistry};
use crate::persist::Persistence;
use crate::protocol::{LogRecord, RespValue};
use crate::store::{Keyspace, Store};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-client front door to the shared keyspace
///
/// Each logical client owns one dispatcher; they share the persistence layer.
pub struct Dispatcher {
    persistence: Arc<Persistence<Keyspace>>,
    registry: Arc<CommandRegistry>,
    selected_db: usize,
}

impl Dispatcher {
    /// Create a dispatcher with database 0 selected
    pub fn new(persistence: Arc<Persistence<Keyspace>>) -> Self {
        let registry = Arc::clone(persistence.store().read().registry());
        Dispatcher {
            persistence,
            registry,
            selected_db: 0,
        }
    }

    pub fn selected_db(&self) -> usize {
        self.selected_db
    }

    pub fn persistence(&self) -> &Arc<Persistence<Keyspace>> {
        &self.persistence
    }

    /// Dispatch a command
    ///
    /// Takes a RESP array of bulk strings, the command name first.
    pub async fn dispatch(&mut self, value: RespValue) -> RespValue {
        let parts = match value.into_command() {
            Ok(parts) if !parts.is_empty() => parts,
            Ok(_) => return RespValue::error("ERR empty command array"),
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let name = parts[0].to_ascii_uppercase();
        debug!("Dispatching command: {}", String::from_utf8_lossy(&name));

        match name.as_slice() {
            b"SELECT" => self.select(&parts),
            b"SAVE" => self.admin(&parts, |this| match this.persistence.save() {
                Ok(_) => RespValue::ok(),
                Err(e) => RespValue::error(format!("ERR {}", e)),
            }),
            b"BGSAVE" => self.admin(&parts, |this| match this.persistence.bgsave() {
                Ok(_) => RespValue::simple_string("Background saving started"),
                Err(e) => RespValue::error(format!("ERR {}", e)),
            }),
            b"BGREWRITEAOF" => self.admin(&parts, |this| match this.persistence.rewrite_journal() {
                Ok(_) => RespValue::simple_string("Background append only file rewriting started"),
                Err(e) => RespValue::error(format!("ERR {}", e)),
            }),
            b"LASTSAVE" => self.admin(&parts, |this| {
                RespValue::integer(this.persistence.last_save() as i64)
            }),
            b"INFO" => RespValue::bulk_string(self.persistence.info().await),
            _ => self.execute(parts).await,
        }
    }

    fn admin(&self, parts: &[Bytes], run: impl FnOnce(&Self) -> RespValue) -> RespValue {
        if parts.len() != 1 {
            return wrong_arity(&parts[0]);
        }
        run(self)
    }

    fn select(&mut self, parts: &[Bytes]) -> RespValue {
        if parts.len() != 2 {
            return wrong_arity(&parts[0]);
        }
        let index = match parse_integer(&parts[1]) {
            Ok(index) => index,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };
        if index < 0 || index as usize >= self.persistence.config().databases {
            return RespValue::error("ERR DB index is out of range");
        }
        self.selected_db = index as usize;
        RespValue::ok()
    }

    /// Run a store command and journal it when it is a successful write
    ///
    /// The queue slot is reserved before the store lock is taken and filled
    /// while the lock is still held.
    async fn execute(&self, parts: Vec<Bytes>) -> RespValue {
        let db = self.selected_db;
        let is_write = self.registry.is_write(&parts[0]);

        let permit = match self.persistence.journal() {
            Some(journal) if is_write => match journal.reserve().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    warn!("journal unavailable, write will not be logged: {}", e);
                    None
                }
            },
            _ => None,
        };

        let mut store = self.persistence.store().write();
        let reply = store.execute(db, &parts);
        if is_write && !reply.is_error() {
            if let Some(permit) = permit {
                journal_write(permit, &store, db, parts);
            }
            self.persistence.note_write();
        }
        reply
    }
}

/// Send the journal form of an executed write
///
/// Relative expiries are rewritten to the absolute instant the store now
/// holds, or to a DEL when the key is gone.
fn journal_write(permit: JournalPermit<'_>, store: &Keyspace, db: usize, parts: Vec<Bytes>) {
    let record: LogRecord = if parts[0].eq_ignore_ascii_case(b"EXPIRE") {
        let key = parts[1].clone();
        let expire_at = store
            .db(db)
            .and_then(|memory| memory.get_entry(&key))
            .and_then(|entry| entry.expire_at);
        match expire_at {
            Some(at) => vec![
                Bytes::from_static(b"PEXPIREAT"),
                key,
                Bytes::from(at.to_string()),
            ],
            None => vec![Bytes::from_static(b"DEL"), key],
        }
    } else {
        parts
    };
    permit.append(db, record);
}

fn wrong_arity(name: &Bytes) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        String::from_utf8_lossy(name).to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::JournalReader;
    use crate::config::{FsyncPolicy, PersistenceConfig, SnapshotMode};
    use crate::persist::JobKind;
    use crate::protocol::record;
    use crate::store::now_ms;

    fn command(parts: &[&str]) -> RespValue {
        RespValue::array(
            parts
                .iter()
                .map(|part| RespValue::bulk_string(Bytes::from(part.to_string())))
                .collect(),
        )
    }

    async fn dispatcher(dir: &std::path::Path) -> Dispatcher {
        let config = PersistenceConfig {
            append_fsync: FsyncPolicy::Always,
            snapshot_mode: SnapshotMode::Copy,
            ..PersistenceConfig::in_dir(dir)
        };
        let persistence = Persistence::open(config, Keyspace::new(16)).await.unwrap();
        Dispatcher::new(Arc::new(persistence))
    }

    fn journal_records(dispatcher: &Dispatcher) -> Vec<LogRecord> {
        let path = dispatcher.persistence().config().journal_path.clone();
        let mut reader = JournalReader::open(&path, None).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[tokio::test]
    async fn test_dispatch_set_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;

        let result = dispatcher.dispatch(command(&["SET", "mykey", "myvalue"])).await;
        assert_eq!(result, RespValue::ok());

        let result = dispatcher.dispatch(command(&["get", "mykey"])).await;
        assert_eq!(result, RespValue::bulk_string(Bytes::from("myvalue")));
        assert_eq!(dispatcher.persistence().status().dirty(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;

        let result = dispatcher.dispatch(command(&["UNKNOWN"])).await;
        assert!(matches!(result, RespValue::Error(_)));
        assert!(dispatcher.dispatch(RespValue::array(vec![])).await.is_error());
        assert!(dispatcher.dispatch(RespValue::integer(1)).await.is_error());
    }

    #[tokio::test]
    async fn test_select_routes_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;

        dispatcher.dispatch(command(&["SET", "a", "1"])).await;
        assert_eq!(dispatcher.dispatch(command(&["SELECT", "1"])).await, RespValue::ok());
        assert_eq!(dispatcher.selected_db(), 1);
        assert_eq!(dispatcher.dispatch(command(&["GET", "a"])).await, RespValue::null());

        assert!(dispatcher.dispatch(command(&["SELECT", "16"])).await.is_error());
        assert!(dispatcher.dispatch(command(&["SELECT", "x"])).await.is_error());
        assert_eq!(dispatcher.selected_db(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_journaled_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;

        dispatcher.dispatch(command(&["SET", "a", "1"])).await;
        dispatcher.dispatch(command(&["GET", "a"])).await;
        // Rejected writes are not journaled
        assert!(dispatcher.dispatch(command(&["LPUSH", "a", "x"])).await.is_error());
        dispatcher.dispatch(command(&["SELECT", "2"])).await;
        dispatcher.dispatch(command(&["LPUSH", "l", "x"])).await;
        dispatcher.persistence().shutdown().await.unwrap();

        let records = journal_records(&dispatcher);
        assert_eq!(
            records,
            vec![
                record(["SELECT", "0"]),
                record(["SET", "a", "1"]),
                record(["SELECT", "2"]),
                record(["LPUSH", "l", "x"]),
            ]
        );
        assert_eq!(dispatcher.persistence().status().dirty(), 2);
    }

    #[tokio::test]
    async fn test_expire_journaled_as_absolute() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;
        let before = now_ms();

        dispatcher.dispatch(command(&["SET", "k", "v"])).await;
        assert_eq!(
            dispatcher.dispatch(command(&["EXPIRE", "k", "100"])).await,
            RespValue::integer(1)
        );
        dispatcher.dispatch(command(&["SET", "gone", "v"])).await;
        dispatcher.dispatch(command(&["EXPIRE", "gone", "-1"])).await;
        dispatcher.persistence().shutdown().await.unwrap();

        let records = journal_records(&dispatcher);
        assert_eq!(records.len(), 5);
        assert_eq!(records[2][0], Bytes::from("PEXPIREAT"));
        let at: u64 = std::str::from_utf8(&records[2][2]).unwrap().parse().unwrap();
        assert!(at >= before + 100_000 && at <= now_ms() + 100_000);
        assert_eq!(records[4], record(["DEL", "gone"]));
    }

    #[tokio::test]
    async fn test_persistence_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut dispatcher = dispatcher(dir.path()).await;
        dispatcher.dispatch(command(&["HSET", "h", "f", "v"])).await;

        assert_eq!(dispatcher.dispatch(command(&["SAVE"])).await, RespValue::ok());
        assert!(dispatcher.persistence().config().snapshot_path.exists());
        assert!(matches!(
            dispatcher.dispatch(command(&["LASTSAVE"])).await,
            RespValue::Integer(t) if t > 0
        ));

        let guard = dispatcher.persistence().gate().try_acquire(JobKind::Save).unwrap();
        assert_eq!(
            dispatcher.dispatch(command(&["BGSAVE"])).await,
            RespValue::error("ERR Save already in progress")
        );
        drop(guard);

        assert_eq!(
            dispatcher.dispatch(command(&["BGSAVE"])).await,
            RespValue::simple_string("Background saving started")
        );
        dispatcher.persistence().wait_idle().await;
        assert_eq!(
            dispatcher.dispatch(command(&["BGREWRITEAOF"])).await,
            RespValue::simple_string("Background append only file rewriting started")
        );
        dispatcher.persistence().wait_idle().await;

        assert!(dispatcher.dispatch(command(&["SAVE", "now"])).await.is_error());
        match dispatcher.dispatch(command(&["INFO"])).await {
            RespValue::BulkString(info) => {
                let info = String::from_utf8(info.to_vec()).unwrap();
                assert!(info.contains("rdb_last_bgsave_status:ok\r\n"));
                assert!(info.contains("db0:keys=1\r\n"));
            }
            other => panic!("unexpected INFO reply: {:?}", other),
        }
        dispatcher.persistence().shutdown().await.unwrap();
    }
}
