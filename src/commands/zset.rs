//! Sorted set commands (ZADD, ZREM, ZSCORE, ZCARD)

use super::{Command, CommandContext, parse_score};
use crate::protocol::RespValue;
use crate::store::Value;
use bytes::Bytes;

/// Render a score so that parsing it back yields the identical bit pattern
pub(crate) fn format_score(score: f64) -> String {
    score.to_string()
}

/// ZADD command - Add members with scores, updating existing scores
///
/// Syntax: ZADD key score member [score member ...]
pub struct ZAddCommand;

impl Command for ZAddCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        if (args.len() - 1) % 2 != 0 {
            return RespValue::error("ERR syntax error");
        }

        // Validate every score before touching the keyspace
        let mut pairs = Vec::with_capacity((args.len() - 1) / 2);
        for pair in args[1..].chunks_exact(2) {
            match parse_score(&pair[0]) {
                Ok(score) => pairs.push((pair[1].clone(), score)),
                Err(e) => return RespValue::error(format!("ERR {}", e)),
            }
        }

        let value = ctx.store.get_or_insert_with(&args[0], Value::empty_sorted_set);
        let zset = match value.as_sorted_set_mut() {
            Some(zset) => zset,
            None => return RespValue::wrong_type(),
        };

        let added = pairs
            .into_iter()
            .filter(|(member, score)| zset.insert(member.clone(), *score).is_none())
            .count();
        RespValue::integer(added as i64)
    }

    fn name(&self) -> &'static str {
        "ZADD"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// ZREM command - Remove members from a sorted set
///
/// Syntax: ZREM key member [member ...]
pub struct ZRemCommand;

impl Command for ZRemCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let removed = match ctx.store.get_mut(&args[0]) {
            Some(value) => match value.as_sorted_set_mut() {
                Some(zset) => args[1..].iter().filter(|m| zset.remove(*m).is_some()).count(),
                None => return RespValue::wrong_type(),
            },
            None => 0,
        };

        ctx.store.remove_if_empty(&args[0]);
        RespValue::integer(removed as i64)
    }

    fn name(&self) -> &'static str {
        "ZREM"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// ZSCORE command - Get the score of a member
///
/// Syntax: ZSCORE key member
pub struct ZScoreCommand;

impl Command for ZScoreCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_sorted_set() {
                Some(zset) => zset.get(&args[1]).map_or(RespValue::null(), |score| {
                    RespValue::bulk_string(format_score(*score))
                }),
                None => RespValue::wrong_type(),
            },
            None => RespValue::null(),
        }
    }

    fn name(&self) -> &'static str {
        "ZSCORE"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// ZCARD command - Get the number of members of a sorted set
///
/// Syntax: ZCARD key
pub struct ZCardCommand;

impl Command for ZCardCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        match ctx.store.get(&args[0]) {
            Some(value) => match value.as_sorted_set() {
                Some(zset) => RespValue::integer(zset.len() as i64),
                None => RespValue::wrong_type(),
            },
            None => RespValue::integer(0),
        }
    }

    fn name(&self) -> &'static str {
        "ZCARD"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}
