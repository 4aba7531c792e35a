//! Command registry
//!
//! Centralized registry for all available commands.
//! This allows loose coupling between command implementations and the dispatcher.

use super::{Command, CommandContext, string, key, ttl, list, hash, set, zset, admin};
use crate::protocol::RespValue;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new command registry and register all commands
    pub fn new() -> Self {
        let mut registry = CommandRegistry {
            commands: HashMap::new(),
        };

        // Strings
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::GetCommand));

        // Keys
        registry.register(Arc::new(key::DelCommand));
        registry.register(Arc::new(key::ExistsCommand));

        // Expiry
        registry.register(Arc::new(ttl::ExpireCommand));
        registry.register(Arc::new(ttl::PExpireAtCommand));
        registry.register(Arc::new(ttl::TtlCommand));
        registry.register(Arc::new(ttl::PersistCommand));

        // Lists
        registry.register(Arc::new(list::LPushCommand));
        registry.register(Arc::new(list::RPushCommand));
        registry.register(Arc::new(list::LRangeCommand));
        registry.register(Arc::new(list::LLenCommand));

        // Hashes
        registry.register(Arc::new(hash::HSetCommand));
        registry.register(Arc::new(hash::HGetCommand));
        registry.register(Arc::new(hash::HGetAllCommand));
        registry.register(Arc::new(hash::HDelCommand));

        // Sets
        registry.register(Arc::new(set::SAddCommand));
        registry.register(Arc::new(set::SRemCommand));
        registry.register(Arc::new(set::SMembersCommand));
        registry.register(Arc::new(set::SCardCommand));

        // Sorted sets
        registry.register(Arc::new(zset::ZAddCommand));
        registry.register(Arc::new(zset::ZRemCommand));
        registry.register(Arc::new(zset::ZScoreCommand));
        registry.register(Arc::new(zset::ZCardCommand));

        // Admin
        registry.register(Arc::new(admin::FlushDbCommand));
        registry.register(Arc::new(admin::DbSizeCommand));

        registry
    }

    /// Register a command
    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_uppercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &[u8]) -> Option<Arc<dyn Command>> {
        let name = std::str::from_utf8(name).ok()?;
        self.commands.get(&name.to_uppercase()).cloned()
    }

    /// Whether `name` is a registered write command
    pub fn is_write(&self, name: &[u8]) -> bool {
        self.get(name).map_or(false, |cmd| cmd.is_write())
    }

    /// Look up, arity-check and run a full command (name first)
    pub fn execute(&self, ctx: &mut CommandContext<'_>, parts: &[Bytes]) -> RespValue {
        let Some((name, args)) = parts.split_first() else {
            return RespValue::error("ERR empty command");
        };

        let command = match self.get(name) {
            Some(cmd) => cmd,
            None => {
                return RespValue::error(format!(
                    "ERR unknown command '{}'",
                    String::from_utf8_lossy(name)
                ));
            }
        };

        let too_many = command.max_args().map_or(false, |max| args.len() > max);
        if args.len() < command.min_args() || too_many {
            return RespValue::error(format!(
                "ERR wrong number of arguments for '{}' command",
                command.name().to_lowercase()
            ));
        }

        command.execute(ctx, args)
    }

    /// Get all command names
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::record;
    use crate::store::MemoryStore;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = CommandRegistry::new();
        assert!(registry.get(b"set").is_some());
        assert!(registry.get(b"SeT").is_some());
        assert!(registry.get(b"nope").is_none());
        assert!(registry.command_names().len() >= 26);
    }

    #[test]
    fn test_write_flags() {
        let registry = CommandRegistry::new();
        assert!(registry.is_write(b"SET"));
        assert!(registry.is_write(b"zadd"));
        assert!(registry.is_write(b"PEXPIREAT"));
        assert!(!registry.is_write(b"GET"));
        assert!(!registry.is_write(b"DBSIZE"));
        assert!(!registry.is_write(b"UNKNOWN"));
    }

    #[test]
    fn test_arity_and_unknown() {
        let registry = CommandRegistry::new();
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);

        assert!(registry.execute(&mut ctx, &record(["GET"])).is_error());
        assert!(registry.execute(&mut ctx, &record(["GET", "a", "b"])).is_error());
        assert!(registry.execute(&mut ctx, &record(["FROB", "a"])).is_error());
        assert!(registry.execute(&mut ctx, &[]).is_error());
        assert_eq!(registry.execute(&mut ctx, &record(["SET", "a", "b"])), RespValue::ok());
    }
}
