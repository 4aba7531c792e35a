//! Entry structure for stored values

use super::value::Value;

/// A stored value together with its optional absolute expiry
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The value
    pub value: Value,

    /// Expiry as Unix epoch milliseconds
    pub expire_at: Option<u64>,
}

impl Entry {
    /// Create a new entry without expiration
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expire_at: None,
        }
    }

    /// Create a new entry expiring at `expire_at` (epoch ms)
    pub fn with_expire_at(value: Value, expire_at: Option<u64>) -> Self {
        Entry { value, expire_at }
    }

    /// Check if the entry has expired at `now` (epoch ms)
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.expire_at, Some(at) if at <= now)
    }

    /// Remaining time to live in milliseconds
    ///
    /// Returns -1 when the entry never expires and -2 when it already has.
    pub fn ttl_millis(&self, now: u64) -> i64 {
        match self.expire_at {
            Some(at) if at > now => (at - now) as i64,
            Some(_) => -2,
            None => -1,
        }
    }
}
