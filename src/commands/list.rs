//! List commands (LPUSH, RPUSH, LRANGE, LLEN)

use super::{Command, CommandContext, parse_integer};
use crate::protocol::RespValue;
use crate::store::Value;
use bytes::Bytes;

/// Which end of the list a push targets
#[derive(Clone, Copy)]
enum End {
    Head,
    Tail,
}

fn push(ctx: &mut CommandContext<'_>, args: &[Bytes], end: End) -> RespValue {
    let value = ctx.store.get_or_insert_with(&args[0], Value::empty_list);
    let list = match value.as_list_mut() {
        Some(list) => list,
        None => return RespValue::wrong_type(),
    };

    for item in &args[1..] {
        match end {
            End::Head => list.push_front(item.clone()),
            End::Tail => list.push_back(item.clone()),
        }
    }

    RespValue::integer(list.len() as i64)
}

/// LPUSH command - Prepend one or multiple values to a list
///
/// Syntax: LPUSH key value [value ...]
pub struct LPushCommand;

impl Command for LPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        push(ctx, args, End::Head)
    }

    fn name(&self) -> &'static str {
        "LPUSH"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// RPUSH command - Append one or multiple values to a list
///
/// Syntax: RPUSH key value [value ...]
pub struct RPushCommand;

impl Command for RPushCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        push(ctx, args, End::Tail)
    }

    fn name(&self) -> &'static str {
        "RPUSH"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// LRANGE command - Get a range of elements from a list
///
/// Syntax: LRANGE key start stop
pub struct LRangeCommand;

impl Command for LRangeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let (start, stop) = match (parse_integer(&args[1]), parse_integer(&args[2])) {
            (Ok(start), Ok(stop)) => (start, stop),
            (Err(e), _) | (_, Err(e)) => return RespValue::error(format!("ERR {}", e)),
        };

        let list = match ctx.store.get(&args[0]) {
            Some(value) => match value.as_list() {
                Some(list) => list,
                None => return RespValue::wrong_type(),
            },
            None => return RespValue::array(vec![]),
        };

        let len = list.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return RespValue::array(vec![]);
        }

        let items = list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|item| RespValue::bulk_string(item.clone()))
            .collect();
        RespValue::array(items)
    }

    fn name(&self) -> &'static str {
        "LRANGE"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }
}

/// LLEN command - Get the length of a list
///
/// Syntax: LLEN key
pub struct LLenCommand;

impl Command for LLenCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_list() {
                Some(list) => RespValue::integer(list.len() as i64),
                None => RespValue::wrong_type(),
            },
            None => RespValue::integer(0),
        }
    }

    fn name(&self) -> &'static str {
        "LLEN"
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
    fn test_push_order() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);

        RPushCommand.execute(&mut ctx, &record(["l", "b", "c"]));
        let result = LPushCommand.execute(&mut ctx, &record(["l", "a"]));
        assert_eq!(result, RespValue::integer(3));

        let result = LRangeCommand.execute(&mut ctx, &record(["l", "0", "-1"]));
        assert_eq!(
            result,
            RespValue::array(vec![
                RespValue::bulk_string("a"),
                RespValue::bulk_string("b"),
                RespValue::bulk_string("c"),
            ])
        );
    }

    #[test]
    fn test_lrange_bounds() {
        let mut store = MemoryStore::new();
        let mut ctx = CommandContext::new(&mut store);
        RPushCommand.execute(&mut ctx, &record(["l", "a", "b", "c", "d"]));

        let result = LRangeCommand.execute(&mut ctx, &record(["l", "-2", "100"]));
        assert_eq!(
            result,
            RespValue::array(vec![RespValue::bulk_string("c"), RespValue::bulk_string("d")])
        );
        let result = LRangeCommand.execute(&mut ctx, &record(["l", "3", "1"]));
        assert_eq!(result, RespValue::array(vec![]));
        let result = LRangeCommand.execute(&mut ctx, &record(["missing", "0", "-1"]));
        assert_eq!(result, RespValue::array(vec![]));
    }

    #[test]
    fn test_llen_and_wrong_type() {
        let mut store = MemoryStore::new();
        store.set("s", crate::store::Value::string("x"));
        let mut ctx = CommandContext::new(&mut store);

        RPushCommand.execute(&mut ctx, &record(["l", "a", "b"]));
        assert_eq!(LLenCommand.execute(&mut ctx, &record(["l"])), RespValue::integer(2));
        assert!(RPushCommand.execute(&mut ctx, &record(["s", "a"])).is_error());
        assert!(LLenCommand.execute(&mut ctx, &record(["s"])).is_error());
    }
}
