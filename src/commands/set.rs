//! Set commands (SADD, SREM, SMEMBERS, SCARD)

use super::{Command, CommandContext};
use crate::protocol::RespValue;
use crate::store::Value;
use bytes::Bytes;

/// SADD command - Add one or more members to a set
///
/// Syntax: SADD key member [member ...]
pub struct SAddCommand;

impl Command for SAddCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let value = ctx.store.get_or_insert_with(&args[0], Value::empty_set);
        let set = match value.as_set_mut() {
            Some(set) => set,
            None => return RespValue::wrong_type(),
        };

        let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
        RespValue::integer(added as i64)
    }

    fn name(&self) -> &'static str {
        "SADD"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// SREM command - Remove one or more members from a set
///
/// Syntax: SREM key member [member ...]
pub struct SRemCommand;

impl Command for SRemCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let removed = match ctx.store.get_mut(&args[0]) {
            Some(value) => match value.as_set_mut() {
                Some(set) => args[1..].iter().filter(|m| set.remove(*m)).count(),
                None => return RespValue::wrong_type(),
            },
            None => 0,
        };

        ctx.store.remove_if_empty(&args[0]);
        RespValue::integer(removed as i64)
    }

    fn name(&self) -> &'static str {
        "SREM"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// SMEMBERS command - Get all members of a set
///
/// Syntax: SMEMBERS key
pub struct SMembersCommand;

impl Command for SMembersCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_set() {
                Some(set) => RespValue::array(
                    set.iter().map(|m| RespValue::bulk_string(m.clone())).collect(),
                ),
                None => RespValue::wrong_type(),
            },
            None => RespValue::array(vec![]),
        }
    }

    fn name(&self) -> &'static str {
        "SMEMBERS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// SCARD command - Get the number of members in a set
///
/// Syntax: SCARD key
pub struct SCardCommand;

impl Command for SCardCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_set() {
                Some(set) => RespValue::integer(set.len() as i64),
                None => RespValue::wrong_type(),
            },
            None => RespValue::integer(0),
        }
    }

    fn name(&self) -> &'static str {
        "SCARD"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::record;
    use crate::store::MemoryStore;

    #[test]
    fn test_sadd_scard() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);

        let result = SAddCommand.execute(&mut ctx, &record(["s", "a", "b", "a"]));
        assert_eq!(result, RespValue::integer(2));
        assert_eq!(SCardCommand.execute(&mut ctx, &record(["s"])), RespValue::integer(2));
    }

    #[test]
    fn test_srem_removes_empty_set() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        SAddCommand.execute(&mut ctx, &record(["s", "a"]));

        assert_eq!(SRemCommand.execute(&mut ctx, &record(["s", "a", "z"])), RespValue::integer(1));
        assert!(!ctx.store.exists(&Bytes::from("s")));
        assert_eq!(SRemCommand.execute(&mut ctx, &record(["s", "a"])), RespValue::integer(0));
    }

    #[test]
    fn test_smembers() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        SAddCommand.execute(&mut ctx, &record(["s", "only"]));

        let result = SMembersCommand.execute(&mut ctx, &record(["s"]));
        assert_eq!(result, RespValue::array(vec![RespValue::bulk_string("only")]));
    }
}
