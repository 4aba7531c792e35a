//! Expiry commands (EXPIRE, PEXPIREAT, TTL, PERSIST)
//!
//! Expiry is stored as an absolute epoch-millisecond timestamp. The journal
//! only ever sees PEXPIREAT so that replay later in time lands on the same
//! instant.

use super::{Command, CommandContext, parse_integer};
use crate::protocol::RespValue;
use crate::store::now_ms;
use bytes::Bytes;

/// EXPIRE command - Set a timeout on a key
///
/// Syntax: EXPIRE key seconds
pub struct ExpireCommand;

impl Command for ExpireCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let seconds = match parse_integer(&args[1]) {
            Ok(s) => s,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        let at = (now_ms() as i64).saturating_add(seconds.saturating_mul(1000));
        RespValue::integer(ctx.store.expire_at(&args[0], at.max(0) as u64) as i64)
    }

    fn name(&self) -> &'static str {
        "EXPIRE"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// PEXPIREAT command - Set an absolute expiry in epoch milliseconds
///
/// Syntax: PEXPIREAT key milliseconds-timestamp
pub struct PExpireAtCommand;

impl Command for PExpireAtCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let at = match parse_integer(&args[1]) {
            Ok(ms) => ms.max(0) as u64,
            Err(e) => return RespValue::error(format!("ERR {}", e)),
        };

        RespValue::integer(ctx.store.expire_at(&args[0], at) as i64)
    }

    fn name(&self) -> &'static str {
        "PEXPIREAT"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// TTL command - Get the time to live for a key
///
/// Syntax: TTL key
///
/// Returns:
/// - The TTL in seconds
/// - -1 if the key exists but has no expiration
/// - -2 if the key does not exist
pub struct TtlCommand;

impl Command for TtlCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        let ttl = ctx.store.ttl_millis(&args[0]);
        if ttl < 0 {
            RespValue::integer(ttl)
        } else {
            RespValue::integer((ttl + 500) / 1000)
        }
    }

    fn name(&self) -> &'static str {
        "TTL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// PERSIST command - Remove the expiry of a key
///
/// Syntax: PERSIST key
pub struct PersistCommand;

impl Command for PersistCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue {
        RespValue::integer(ctx.store.persist(&args[0]) as i64)
    }

    fn name(&self) -> &'static str {
        "PERSIST"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn is_write(&self) -> bool {
        true
    }
}
