//! Admin commands (FLUSHDB, DBSIZE)

use super::{Command, CommandContext};
use crate::protocol::RespValue;
use bytes::Bytes;

/// FLUSHDB command - Remove all keys from the current database
///
/// Syntax: FLUSHDB
pub struct FlushDbCommand;

impl Command for FlushDbCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> RespValue {
        ctx.store.clear();
        RespValue::ok()
    }

    fn name(&self) -> &'static str {
        "FLUSHDB"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn is_write(&self) -> bool {
        true
    }
}

/// DBSIZE command - Number of keys in the current database
///
/// Syntax: DBSIZE
pub struct DbSizeCommand;

impl Command for DbSizeCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>, _args: &[Bytes]) -> RespValue {
        ctx.store.cleanup_expired();
        RespValue::integer(ctx.store.len() as i64)
    }

    fn name(&self) -> &'static str {
        "DBSIZE"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }
}
