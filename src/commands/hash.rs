//! Hash commands (HSET, HGET, HGETALL, HDEL)

use super::{Command, CommandContext};
use crate::protocol::RespValue;
use crate::store::Value;
use bytes::Bytes;

/// HSET command - Set fields in the hash stored at key
///
/// Syntax: HSET key field value [field value ...]
pub struct HSetCommand;

impl Command for HSetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        // Check that we have pairs of field/value
        if (args.len() - 1) % 2 != 0 {
            return RespValue::error("ERR wrong number of arguments for 'hset' command");
        }

        let value = ctx.store.get_or_insert_with(&args[0], Value::empty_hash);
        let hash = match value.as_hash_mut() {
            Some(hash) => hash,
            None => return RespValue::wrong_type(),
        };

        let mut added = 0;
        for pair in args[1..].chunks_exact(2) {
            if hash.insert(pair[0].clone(), pair[1].clone()).is_none() {
                added += 1;
            }
        }

        RespValue::integer(added)
    }

    fn name(&self) -> &'static str {
        "HSET"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// HGET command - Get the value of a hash field
///
/// Syntax: HGET key field
pub struct HGetCommand;

impl Command for HGetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_hash() {
                Some(hash) => hash
                    .get(&args[1])
                    .map_or(RespValue::null(), |v| RespValue::bulk_string(v.clone())),
                None => RespValue::wrong_type(),
            },
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "HGET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// HGETALL command - Get all fields and values of a hash
///
/// Syntax: HGETALL key
pub struct HGetAllCommand;

impl Command for HGetAllCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_hash() {
                Some(hash) => {
                    let mut items = Vec::with_capacity(hash.len() * 2);
                    for (field, value) in hash {
                        items.push(RespValue::bulk_string(field.clone()));
                        items.push(RespValue::bulk_string(value.clone()));
                    }
                    RespValue::array(items)
                }
                None => RespValue::wrong_type(),
            },
            None => RespValue::array(vec![]),
        }
    }

    fn name(&self) -> &'static str {
        "HGETALL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// HDEL command - Delete one or more hash fields
///
/// Syntax: HDEL key field [field ...]
pub struct HDelCommand;

impl Command for HDelCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let removed = match ctx.store.get_mut(&args[0]) {
            Some(value) => match value.as_hash_mut() {
                Some(hash) => args[1..].iter().filter(|f| hash.remove(*f).is_some()).count(),
                None => return RespValue::wrong_type(),
            },
            None => 0,
        };

        ctx.store.remove_if_empty(&args[0]);
        RespValue::integer(removed as i64)
    }

    fn name(&self) -> &'static str {
        "HDEL"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::record;
    use crate::store::MemoryStore;

    #[test]
    fn test_hset_hget() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);

        let result = HSetCommand.execute(&mut ctx, &record(["h", "f1", "v1", "f2", "v2"]));
        assert_eq!(result, RespValue::integer(2));
        let result = HSetCommand.execute(&mut ctx, &record(["h", "f1", "v3"]));
        assert_eq!(result, RespValue::integer(0));

        let result = HGetCommand.execute(&mut ctx, &record(["h", "f1"]));
        assert_eq!(result, RespValue::bulk_string("v3"));
        let result = HGetCommand.execute(&mut ctx, &record(["h", "nope"]));
        assert_eq!(result, RespValue::null());
    }

    #[test]
    fn test_hset_odd_pairs() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        assert!(HSetCommand.execute(&mut ctx, &record(["h", "f1", "v1", "f2"])).is_error());
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        HSetCommand.execute(&mut ctx, &record(["h", "f1", "v1"]));

        let result = HDelCommand.execute(&mut ctx, &record(["h", "f1", "f2"]));
        assert_eq!(result, RespValue::integer(1));
        assert!(!ctx.store.exists(&Bytes::from("h")));
    }

    #[test]
    fn test_hgetall() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        HSetCommand.execute(&mut ctx, &record(["h", "f", "v"]));

        let result = HGetAllCommand.execute(&mut ctx, &record(["h"]));
        assert_eq!(
            result,
            RespValue::array(vec![RespValue::bulk_string("f"), RespValue::bulk_string("v")])
        );
    }
}
