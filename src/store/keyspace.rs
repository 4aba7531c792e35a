//! Multi-database keyspace

use super::{DumpEntry, Entry, MemoryStore, Store, Value};
use crate::commands::{CommandContext, CommandRegistry};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::sync::Arc;

/// A fixed number of logical databases sharing one command registry
pub struct Keyspace {
    dbs: Vec<MemoryStore>,
    registry: Arc<CommandRegistry>,
}

impl Keyspace {
    pub fn new(databases: usize) -> Self {
        Self::with_registry(databases, Arc::new(CommandRegistry::new()))
    }

    pub fn with_registry(databases: usize, registry: Arc<CommandRegistry>) -> Self {
        Keyspace {
            dbs: (0..databases.max(1)).map(|_| MemoryStore::new()).collect(),
            registry,
        }
    }

    pub fn db(&self, index: usize) -> Option<&MemoryStore> {
        self.dbs.get(index)
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}

impl Store for Keyspace {
    fn databases(&self) -> usize {
        self.dbs.len()
    }

    fn len(&self, db: usize) -> usize {
        self.dbs.get(db).map_or(0, MemoryStore::len)
    }

    fn for_each(&self, db: usize, visit: &mut dyn FnMut(&Bytes, &Value, Option<u64>) -> bool) {
        if let Some(store) = self.dbs.get(db) {
            for (key, entry) in store.iter() {
                if !visit(key, &entry.value, entry.expire_at) {
                    break;
                }
            }
        }
    }

    fn execute(&mut self, db: usize, command: &[Bytes]) -> RespValue {
        let registry = Arc::clone(&self.registry);
        match self.dbs.get_mut(db) {
            Some(store) => registry.execute(&mut CommandContext::new(store), command),
            None => RespValue::error("ERR DB index is out of range"),
        }
    }

    fn restore(&mut self, db: usize, entry: DumpEntry) {
        if let Some(store) = self.dbs.get_mut(db) {
            store.insert(entry.key, Entry::with_expire_at(entry.value, entry.expire_at));
        }
    }

    fn fresh(&self) -> Self {
        Keyspace::with_registry(self.dbs.len(), Arc::clone(&self.registry))
    }
}
