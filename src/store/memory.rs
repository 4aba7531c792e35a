//! In-memory storage for a single logical database

use super::entry::Entry;
use super::now_ms;
use super::value::Value;
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use siphasher::sip::SipHasher13;

/// Type alias for our hash map with SipHasher
type StoreMap = HashMap<Bytes, Entry, BuildHasherDefault<SipHasher13>>;

/// One logical database
///
/// Expired keys are removed lazily when touched, or in bulk through
/// `cleanup_expired`. Until then they still count towards `len` and are
/// visited by `iter`, which keeps snapshot counts and records in agreement.
#[derive(Debug, Default)]
pub struct MemoryStore {
    store: StoreMap,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemoryStore {
            store: HashMap::with_capacity_and_hasher(
                capacity,
                BuildHasherDefault::<SipHasher13>::default(),
            ),
        }
    }

    /// Set a key to a value, clearing any expiry. Returns true if the key is new
    pub fn set(&mut self, key: impl Into<Bytes>, value: Value) -> bool {
        self.store.insert(key.into(), Entry::new(value)).is_none()
    }

    /// Insert a complete entry, expiry included
    pub fn insert(&mut self, key: impl Into<Bytes>, entry: Entry) {
        self.store.insert(key.into(), entry);
    }

    /// Get a value by key, returns None if not found or expired
    pub fn get(&mut self, key: &Bytes) -> Option<&Value> {
        self.reap(key);
        self.store.get(key).map(|entry| &entry.value)
    }

    /// Get a mutable reference to a value by key
    pub fn get_mut(&mut self, key: &Bytes) -> Option<&mut Value> {
        self.reap(key);
        self.store.get_mut(key).map(|entry| &mut entry.value)
    }

    /// Get the value at `key`, creating it with `make` if absent
    pub fn get_or_insert_with(&mut self, key: &Bytes, make: impl FnOnce() -> Value) -> &mut Value {
        self.reap(key);
        &mut self
            .store
            .entry(key.clone())
            .or_insert_with(|| Entry::new(make()))
            .value
    }

    /// Delete the key if it holds an empty collection
    pub fn remove_if_empty(&mut self, key: &Bytes) {
        if matches!(self.store.get(key), Some(entry) if entry.value.is_empty_collection()) {
            self.store.remove(key);
        }
    }

    /// Delete a key, returns true if a live key was removed
    pub fn delete(&mut self, key: &Bytes) -> bool {
        self.reap(key);
        self.store.remove(key).is_some()
    }

    /// Check if a key exists (and is not expired)
    pub fn exists(&mut self, key: &Bytes) -> bool {
        self.reap(key);
        self.store.contains_key(key)
    }

    /// Set an absolute expiry (epoch ms) on a key
    ///
    /// A timestamp that is already in the past deletes the key. Returns false
    /// when the key does not exist.
    pub fn expire_at(&mut self, key: &Bytes, at_ms: u64) -> bool {
        self.reap(key);
        if !self.store.contains_key(key) {
            return false;
        }
        if at_ms <= now_ms() {
            self.store.remove(key);
        } else if let Some(entry) = self.store.get_mut(key) {
            entry.expire_at = Some(at_ms);
        }
        true
    }

    /// Remove the expiry of a key, returns true if one was removed
    pub fn persist(&mut self, key: &Bytes) -> bool {
        self.reap(key);
        match self.store.get_mut(key) {
            Some(entry) => entry.expire_at.take().is_some(),
            None => false,
        }
    }

    /// Remaining TTL in milliseconds (-1 no expiry, -2 missing)
    pub fn ttl_millis(&mut self, key: &Bytes) -> i64 {
        self.reap(key);
        match self.store.get(key) {
            Some(entry) => entry.ttl_millis(now_ms()),
            None => -2,
        }
    }

    /// Get the entry for a key without triggering expiry
    pub fn get_entry(&self, key: &Bytes) -> Option<&Entry> {
        self.store.get(key)
    }

    /// Remove all keys
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Number of stored entries, including expired ones not yet reaped
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Iterate every stored entry, including expired ones not yet reaped
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.store.iter()
    }

    /// Remove every expired entry, returns how many were dropped
    pub fn cleanup_expired(&mut self) -> usize {
        let now = now_ms();
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired_at(now));
        before - self.store.len()
    }

    fn reap(&mut self, key: &Bytes) {
        let now = now_ms();
        if matches!(self.store.get(key), Some(entry) if entry.is_expired_at(now)) {
            self.store.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_set_get() {
        let mut store = MemoryStore::new();
        assert!(store.set("key1", Value::string("value1")));
        assert!(!store.set("key1", Value::string("value2")));

        let value = store.get(&Bytes::from("key1")).unwrap();
        assert_eq!(value.as_string().unwrap(), &Bytes::from("value2"));
    }

    #[test]
    fn test_delete() {
        let mut store = MemoryStore::new();
        store.set("key1", Value::string("value1"));

        assert!(store.delete(&Bytes::from("key1")));
        assert!(!store.exists(&Bytes::from("key1")));
        assert!(!store.delete(&Bytes::from("key1")));
    }

    #[test]
    fn test_past_expiry_deletes() {
        let mut store = MemoryStore::new();
        store.set("key1", Value::string("value1"));

        assert!(store.expire_at(&Bytes::from("key1"), now_ms() - 1));
        assert!(!store.exists(&Bytes::from("key1")));
        assert!(!store.expire_at(&Bytes::from("missing"), now_ms() + 1000));
    }

    #[test]
    fn test_expired_entries_count_until_reaped() {
        let mut store = MemoryStore::new();
        store.insert("old", Entry::with_expire_at(Value::string("v"), Some(now_ms() - 10)));
        store.set("live", Value::string("v"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.iter().count(), 2);
        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ttl_and_persist() {
        let mut store = MemoryStore::new();
        let key = Bytes::from("key1");
        store.set(key.clone(), Value::string("value1"));
        assert_eq!(store.ttl_millis(&key), -1);

        store.expire_at(&key, now_ms() + 100_000);
        let ttl = store.ttl_millis(&key);
        assert!(ttl > 99_000 && ttl <= 100_000);

        assert!(store.persist(&key));
        assert_eq!(store.ttl_millis(&key), -1);
        assert_eq!(store.ttl_millis(&Bytes::from("nope")), -2);
    }

    #[test]
    fn test_remove_if_empty() {
        let mut store = MemoryStore::new();
        let key = Bytes::from("list");
        store.get_or_insert_with(&key, Value::empty_list);
        assert!(store.exists(&key));

        store.remove_if_empty(&key);
        assert!(!store.exists(&key));
    }
}
