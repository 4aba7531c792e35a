//! Command execution module
//!
//! Provides a unified interface for all commands through the Command trait.
//! Each command family lives in its own file. These are the commands the
//! journal replays and the compactor emits, plus their read counterparts.

mod context;
mod registry;

mod string;
mod key;
mod ttl;
mod list;
mod hash;
mod set;
mod zset;
mod admin;

pub use context::CommandContext;
pub use registry::CommandRegistry;
pub(crate) use zset::format_score;

use crate::protocol::RespValue;
use bytes::Bytes;

/// Command execution trait
///
/// All commands implement this trait with a single execute method.
/// This provides loose coupling between command implementations and the dispatcher.
pub trait Command: Send + Sync {
    /// Execute the command with the given context and arguments
    ///
    /// `args` excludes the command name itself. Arity has already been
    /// checked against `min_args`/`max_args` by the registry.
    fn execute(&self, ctx: &mut CommandContext<'_>, args: &[Bytes]) -> RespValue;

    /// Get the command name (for debugging/logging)
    fn name(&self) -> &'static str;

    /// Get the minimum number of arguments required
    fn min_args(&self) -> usize {
        0
    }

    /// Get the maximum number of arguments (None = unlimited)
    fn max_args(&self) -> Option<usize> {
        None
    }

    /// Whether a successful execution must be journaled
    fn is_write(&self) -> bool {
        false
    }
}

/// Parse a base-10 signed integer argument
pub(crate) fn parse_integer(arg: &Bytes) -> Result<i64, &'static str> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or("value is not an integer or out of range")
}

/// Parse a sorted-set score argument
pub(crate) fn parse_score(arg: &Bytes) -> Result<f64, &'static str> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|score| !score.is_nan())
        .ok_or("value is not a valid float")
}
