//! Stored values and access to them.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A string.
    Str(Bytes),
    /// A hash of fields.
    Hash(BTreeMap<Bytes, Bytes>),
    /// A list.
    List(VecDeque<Bytes>),
    /// A set.
    Set(BTreeSet<Bytes>),
}

impl Entry {
    /// True for a collection with no members. Such entries are removed.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Entry::Str(_) => false,
            Entry::Hash(h) => h.is_empty(),
            Entry::List(l) => l.is_empty(),
            Entry::Set(s) => s.is_empty(),
        }
    }
}

/// Mutable access to a set of keys. Commands run against this, either on
/// the store itself or on a script's pending writes.
pub trait KeyAccess {
    /// The entry under `key`, if any.
    fn entry(&mut self, key: &[u8]) -> Option<&mut Entry>;

    /// Stores `entry` under `key`, replacing what was there.
    fn insert(&mut self, key: Bytes, entry: Entry);

    /// Removes `key`, returning true if it existed.
    fn remove(&mut self, key: &[u8]) -> bool;

    /// Removes every key.
    fn flush(&mut self);
}

/// The committed contents of a store.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: HashMap<Bytes, Entry>,
}

impl Keyspace {
    /// An empty keyspace.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyAccess for Keyspace {
    fn entry(&mut self, key: &[u8]) -> Option<&mut Entry> {
        self.entries.get_mut(key)
    }

    fn insert(&mut self, key: Bytes, entry: Entry) {
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        self.entries.remove(key).is_some()
    }

    fn flush(&mut self) {
        self.entries.clear();
    }
}
