//! Value types for the key-value store
//!
//! This is the single tagged type shared by the live store, the snapshot
//! codec and the journal compactor; every consumer switches on it exhaustively.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// Represents the different types of values that can be stored
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value (binary-safe)
    String(Bytes),

    /// List of values (insertion ordered)
    List(VecDeque<Bytes>),

    /// Hash map (field -> value)
    Hash(HashMap<Bytes, Bytes>),

    /// Set of unique members
    Set(HashSet<Bytes>),

    /// Sorted set (member -> score)
    SortedSet(HashMap<Bytes, f64>),
}

impl Value {
    /// Create a string value
    pub fn string(bytes: impl Into<Bytes>) -> Self {
        Value::String(bytes.into())
    }

    pub fn empty_list() -> Self {
        Value::List(VecDeque::new())
    }

    pub fn empty_hash() -> Self {
        Value::Hash(HashMap::new())
    }

    pub fn empty_set() -> Self {
        Value::Set(HashSet::new())
    }

    pub fn empty_sorted_set() -> Self {
        Value::SortedSet(HashMap::new())
    }

    /// Number of elements held (1 for strings)
    pub fn cardinality(&self) -> usize {
        match self {
            Value::String(_) => 1,
            Value::List(list) => list.len(),
            Value::Hash(hash) => hash.len(),
            Value::Set(set) => set.len(),
            Value::SortedSet(zset) => zset.len(),
        }
    }

    /// Collections with no elements must not stay in the keyspace
    pub fn is_empty_collection(&self) -> bool {
        !matches!(self, Value::String(_)) && self.cardinality() == 0
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&HashMap<Bytes, f64>> {
        match self {
            Value::SortedSet(zset) => Some(zset),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut HashMap<Bytes, f64>> {
        match self {
            Value::SortedSet(zset) => Some(zset),
            _ => None,
        }
    }
}
