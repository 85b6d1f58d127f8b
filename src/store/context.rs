//! Pending writes of a running script.
//!
//! A script sees the committed keyspace through an overlay. Every key it
//! touches is copied into the overlay on first access, so later commands in
//! the same script read their own writes. The overlay is applied to the
//! keyspace when the script finishes successfully and dropped otherwise.

use super::commands::dispatch;
use super::keyspace::{Entry, KeyAccess};
use super::reply::Reply;
use super::{time_reply, Inner};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Commands a script may not issue.
const FORBIDDEN: &[&str] = &["eval", "evalsha", "flushall", "script"];

/// Pending writes of one running script. Reads see them, and
/// [`commit`](Self::commit) publishes them.
pub struct ScriptContext {
    inner: Arc<Inner>,
    /// Touched keys. `None` marks a key that is absent or deleted.
    writes: HashMap<Bytes, Option<Entry>>,
    flushed: bool,
}

impl ScriptContext {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            writes: HashMap::new(),
            flushed: false,
        }
    }

    /// Runs a command issued from the script through `redis.call`.
    pub fn execute(&mut self, args: &[Bytes]) -> Reply {
        let Some(name) = args.first() else {
            return Reply::error("ERR Please specify at least one argument for this redis lib call");
        };
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        if FORBIDDEN.contains(&name.as_str()) {
            return Reply::error("ERR This Redis command is not allowed from script");
        }
        match name.as_str() {
            "publish" if args.len() == 3 => Reply::Integer(self.inner.publish(&args[1], &args[2]) as i64),
            "time" => time_reply(),
            _ => dispatch(self, args),
        }
    }

    /// Number of keys touched so far.
    pub fn operation_count(&self) -> usize {
        self.writes.len()
    }

    /// True if the script has touched no keys.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && !self.flushed
    }

    /// Applies the pending writes to the keyspace.
    pub fn commit(&mut self) {
        if self.is_empty() {
            return;
        }
        let mut keyspace = self.inner.keyspace.lock();
        if self.flushed {
            keyspace.flush();
        }
        for (key, entry) in self.writes.drain() {
            match entry {
                Some(entry) => keyspace.insert(key, entry),
                None => {
                    keyspace.remove(&key);
                }
            }
        }
        self.flushed = false;
    }

    /// Commits a context shared with the script's Lua callbacks.
    pub fn commit_from_mutex(context: &Mutex<ScriptContext>) {
        context.lock().commit();
    }

    /// Discards the pending writes.
    pub fn rollback(self) {
        drop(self);
    }
}

impl KeyAccess for ScriptContext {
    fn entry(&mut self, key: &[u8]) -> Option<&mut Entry> {
        if !self.writes.contains_key(key) {
            let base = if self.flushed {
                None
            } else {
                self.inner.keyspace.lock().get(key).cloned()
            };
            self.writes.insert(Bytes::copy_from_slice(key), base);
        }
        self.writes.get_mut(key).and_then(Option::as_mut)
    }

    fn insert(&mut self, key: Bytes, entry: Entry) {
        self.writes.insert(key, Some(entry));
    }

    fn remove(&mut self, key: &[u8]) -> bool {
        let existed = self.entry(key).is_some();
        self.writes.insert(Bytes::copy_from_slice(key), None);
        existed
    }

    fn flush(&mut self) {
        self.writes.clear();
        self.flushed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::args;
    use crate::store::MemoryStore;

    fn get(store: &MemoryStore, key: &str) -> Reply {
        store.execute_command(&args(["GET", key]))
    }

    #[test]
    fn test_read_your_writes() {
        let store = MemoryStore::new();
        store.execute_command(&args(["SET", "k", "old"]));

        let mut ctx = ScriptContext::new(Arc::clone(&store.inner));
        assert_eq!(ctx.execute(&args(["SET", "k", "new"])), Reply::ok());
        assert_eq!(ctx.execute(&args(["GET", "k"])), Reply::bulk("new"));
        assert_eq!(get(&store, "k"), Reply::bulk("old"));

        ctx.commit();
        assert_eq!(get(&store, "k"), Reply::bulk("new"));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        store.execute_command(&args(["SET", "a", "1"]));

        let mut ctx = ScriptContext::new(Arc::clone(&store.inner));
        ctx.execute(&args(["DEL", "a"]));
        ctx.execute(&args(["RPUSH", "l", "x"]));
        assert_eq!(ctx.execute(&args(["EXISTS", "a"])), Reply::Integer(0));
        assert_eq!(ctx.operation_count(), 2);
        ctx.rollback();

        assert_eq!(get(&store, "a"), Reply::bulk("1"));
        assert_eq!(store.execute_command(&args(["EXISTS", "l"])), Reply::Integer(0));
    }

    #[test]
    fn test_delete_is_committed() {
        let store = MemoryStore::new();
        store.execute_command(&args(["SET", "a", "1"]));

        let mut ctx = ScriptContext::new(Arc::clone(&store.inner));
        assert_eq!(ctx.execute(&args(["DEL", "a"])), Reply::Integer(1));
        ctx.commit();
        assert_eq!(get(&store, "a"), Reply::Nil);
    }

    #[test]
    fn test_forbidden_commands() {
        let store = MemoryStore::new();
        let mut ctx = ScriptContext::new(Arc::clone(&store.inner));
        assert!(ctx.execute(&args(["EVAL", "return 1", "0"])).is_error());
        assert!(ctx.execute(&args(["script", "flush"])).is_error());
        assert!(ctx.is_empty());
    }
}
