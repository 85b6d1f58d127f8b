//! An in-process key-value store with Lua scripting.
//!
//! `MemoryStore` speaks the subset of the Redis command set that generated
//! scripts use, and runs scripts the way Redis does: atomically, with `KEYS`
//! and `ARGV`, the `redis` and `cjson` libraries, and the same reply
//! conversion rules.
//!
//! # Architecture
//!
//! - **Keyspace**: committed entries behind a mutex
//! - **ScriptContext**: a script's pending writes, committed on success
//! - **LuaExecutor**: runs one script in a fresh Lua state
//! - **Pipeline**: a connection that queues commands for a batch
//!
//! One execution lock is held for every top-level command and for the whole
//! of every script, so scripts never interleave with other commands.
//!
//! # Example
//!
//! ```rust
//! use luaship::connection::args;
//! use luaship::{MemoryStore, Reply};
//!
//! let store = MemoryStore::new();
//! let reply = store.execute_command(&args(["EVAL", "return redis.call('incr', KEYS[1])", "1", "n"]));
//! assert_eq!(reply, Reply::Integer(1));
//! ```

pub mod cjson;
pub mod commands;
pub mod context;
pub mod keyspace;
pub mod lua_executor;
pub mod pipeline;
pub mod reply;

pub use context::ScriptContext;
pub use keyspace::{Entry, KeyAccess, Keyspace};
pub use lua_executor::LuaExecutor;
pub use pipeline::Pipeline;
pub use reply::Reply;

use crate::config::StoreOptions;
use crate::connection::{Connection, ConnectionId};
use crate::error::Result;
use crate::registry::script_hash;
use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};
use mlua::Lua;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Counters reported by [`MemoryStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Commands executed, including those issued by scripts.
    pub commands: u64,
    /// `SCRIPT LOAD` commands.
    pub script_loads: u64,
    /// Scripts evaluated.
    pub script_runs: u64,
}

pub(crate) struct Inner {
    id: ConnectionId,
    options: StoreOptions,
    pub(crate) keyspace: Mutex<Keyspace>,
    scripts: Mutex<HashMap<String, Arc<str>>>,
    subscribers: Mutex<HashMap<Bytes, Vec<Sender<Bytes>>>>,
    exec_lock: Mutex<()>,
    commands: AtomicU64,
    script_loads: AtomicU64,
    script_runs: AtomicU64,
}

impl Inner {
    /// Delivers `message` to the subscribers of `channel`, returning how many
    /// received it.
    pub(crate) fn publish(&self, channel: &[u8], message: &[u8]) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(channel) else {
            return 0;
        };
        let message = Bytes::copy_from_slice(message);
        senders.retain(|tx| tx.send(message.clone()).is_ok());
        senders.len()
    }
}

/// A thread-safe in-process store. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// An empty store with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    /// An empty store.
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                options,
                keyspace: Mutex::new(Keyspace::new()),
                scripts: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(HashMap::new()),
                exec_lock: Mutex::new(()),
                commands: AtomicU64::new(0),
                script_loads: AtomicU64::new(0),
                script_runs: AtomicU64::new(0),
            }),
        }
    }

    /// Identity shared by every clone and pipeline of this store.
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Runs one command atomically.
    pub fn execute_command(&self, args: &[Bytes]) -> Reply {
        let _guard = self.inner.exec_lock.lock();
        self.run(args)
    }

    /// Runs several commands as one atomic batch.
    pub fn execute_batch(&self, commands: &[Vec<Bytes>]) -> Vec<Reply> {
        let _guard = self.inner.exec_lock.lock();
        commands.iter().map(|args| self.run(args)).collect()
    }

    /// A connection that queues commands on this store.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self)
    }

    /// Receives every message published on `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> Receiver<Bytes> {
        let (tx, rx) = unbounded();
        self.inner
            .subscribers
            .lock()
            .entry(Bytes::copy_from_slice(channel.as_bytes()))
            .or_default()
            .push(tx);
        rx
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commands: self.inner.commands.load(Ordering::Relaxed),
            script_loads: self.inner.script_loads.load(Ordering::Relaxed),
            script_runs: self.inner.script_runs.load(Ordering::Relaxed),
        }
    }

    /// Number of committed keys.
    pub fn key_count(&self) -> usize {
        self.inner.keyspace.lock().len()
    }

    /// Runs a command with the execution lock held.
    fn run(&self, args: &[Bytes]) -> Reply {
        self.inner.commands.fetch_add(1, Ordering::Relaxed);
        let Some(name) = args.first() else {
            return Reply::error("ERR empty command");
        };
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        match name.as_str() {
            "publish" => {
                if args.len() != 3 {
                    return wrong_arity(&name);
                }
                Reply::Integer(self.inner.publish(&args[1], &args[2]) as i64)
            }
            "time" => time_reply(),
            "flushall" => {
                self.inner.keyspace.lock().flush();
                Reply::ok()
            }
            "script" => self.script_command(&args[1..]),
            "eval" => {
                if args.len() < 3 {
                    return wrong_arity(&name);
                }
                let text = String::from_utf8_lossy(&args[1]).into_owned();
                self.eval(&text, &args[2..])
            }
            "evalsha" => {
                if args.len() < 3 {
                    return wrong_arity(&name);
                }
                let sha = String::from_utf8_lossy(&args[1]).to_ascii_lowercase();
                let text = self.inner.scripts.lock().get(&sha).cloned();
                match text {
                    Some(text) => self.eval(&text, &args[2..]),
                    None => Reply::error("NOSCRIPT No matching script. Please use EVAL."),
                }
            }
            _ => commands::dispatch(&mut *self.inner.keyspace.lock(), args),
        }
    }

    /// `numkeys key... arg...` after the script.
    fn eval(&self, text: &str, rest: &[Bytes]) -> Reply {
        let numkeys = match std::str::from_utf8(&rest[0]).ok().and_then(|s| s.parse::<usize>().ok()) {
            Some(n) => n,
            None => return Reply::error("ERR value is not an integer or out of range"),
        };
        let rest = &rest[1..];
        if numkeys > rest.len() {
            return Reply::error("ERR Number of keys can't be greater than number of args");
        }
        self.inner.script_runs.fetch_add(1, Ordering::Relaxed);
        let executor = LuaExecutor::new(Arc::clone(&self.inner), self.inner.options.script_timeout);
        executor.execute(text, &rest[..numkeys], &rest[numkeys..])
    }

    fn script_command(&self, args: &[Bytes]) -> Reply {
        let Some(sub) = args.first() else {
            return wrong_arity("script");
        };
        match String::from_utf8_lossy(sub).to_ascii_lowercase().as_str() {
            "load" if args.len() == 2 => {
                let text = String::from_utf8_lossy(&args[1]).into_owned();
                self.load_script(text)
            }
            "exists" if args.len() >= 2 => {
                let scripts = self.inner.scripts.lock();
                Reply::Array(
                    args[1..]
                        .iter()
                        .map(|sha| {
                            let sha = String::from_utf8_lossy(sha).to_ascii_lowercase();
                            Reply::Integer(i64::from(scripts.contains_key(&sha)))
                        })
                        .collect(),
                )
            }
            "flush" => {
                self.inner.scripts.lock().clear();
                Reply::ok()
            }
            other => Reply::error(format!("ERR unknown subcommand or wrong number of arguments for '{}'", other)),
        }
    }

    fn load_script(&self, text: String) -> Reply {
        if let Err(e) = Lua::new().load(text.as_str()).into_function() {
            return Reply::error(format!("ERR Error compiling script (new function): {}", e));
        }
        let sha = script_hash(&text);
        let mut scripts = self.inner.scripts.lock();
        if !scripts.contains_key(&sha) {
            let max = self.inner.options.max_scripts;
            if max > 0 && scripts.len() >= max {
                return Reply::error("ERR script cache is full");
            }
            scripts.insert(sha.clone(), Arc::from(text));
        }
        self.inner.script_loads.fetch_add(1, Ordering::Relaxed);
        log::debug!("loaded script {}", sha);
        Reply::bulk(sha)
    }
}

impl Connection for MemoryStore {
    fn id(&self) -> ConnectionId {
        self.inner.id
    }

    fn query(&self, args: &[Bytes]) -> Result<Reply> {
        Ok(self.execute_command(args))
    }
}

fn wrong_arity(name: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", name))
}

/// Server time as `[seconds, microseconds]`.
pub(crate) fn time_reply() -> Reply {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Reply::Array(vec![
        Reply::bulk(now.as_secs().to_string()),
        Reply::bulk(now.subsec_micros().to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::args;
    use std::time::Duration;

    #[test]
    fn test_eval_and_evalsha() {
        let store = MemoryStore::new();
        let sha = store.execute_command(&args(["SCRIPT", "LOAD", "return ARGV[1] .. KEYS[1]"]));
        let sha = sha.as_str().unwrap().to_string();
        assert_eq!(sha.len(), 64);
        assert_eq!(
            store.execute_command(&args(["SCRIPT", "EXISTS", sha.as_str(), "nope"])),
            Reply::Array(vec![Reply::Integer(1), Reply::Integer(0)])
        );
        assert_eq!(
            store.execute_command(&args(["EVALSHA", sha.as_str(), "1", "k", "a"])),
            Reply::bulk("ak")
        );
        assert_eq!(
            store.execute_command(&args(["EVAL", "return #ARGV", "0", "x", "y"])),
            Reply::Integer(2)
        );

        store.execute_command(&args(["SCRIPT", "FLUSH"]));
        let reply = store.execute_command(&args(["EVALSHA", sha.as_str(), "0"]));
        assert!(matches!(reply, Reply::Error(ref e) if e.starts_with("NOSCRIPT")));
    }

    #[test]
    fn test_script_load_rejects_bad_syntax() {
        let store = MemoryStore::new();
        let reply = store.execute_command(&args(["SCRIPT", "LOAD", "return ("]));
        assert!(matches!(reply, Reply::Error(ref e) if e.contains("Error compiling script")));
    }

    #[test]
    fn test_script_cache_limit() {
        let store = MemoryStore::with_options(StoreOptions {
            max_scripts: 1,
            ..StoreOptions::default()
        });
        assert!(!store.execute_command(&args(["SCRIPT", "LOAD", "return 1"])).is_error());
        assert!(!store.execute_command(&args(["SCRIPT", "LOAD", "return 1"])).is_error());
        assert!(store.execute_command(&args(["SCRIPT", "LOAD", "return 2"])).is_error());
        assert_eq!(store.stats().script_loads, 2);
    }

    #[test]
    fn test_publish_reaches_subscribers() {
        let store = MemoryStore::new();
        let rx = store.subscribe("news");
        assert_eq!(store.execute_command(&args(["PUBLISH", "news", "hello"])), Reply::Integer(1));
        assert_eq!(store.execute_command(&args(["PUBLISH", "other", "x"])), Reply::Integer(0));
        store.execute_command(&args(["EVAL", "redis.call('publish', 'news', 'from lua')", "0"]));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Bytes::from_static(b"from lua"));
    }

    #[test]
    fn test_time_and_flushall() {
        let store = MemoryStore::new();
        let Reply::Array(parts) = store.execute_command(&args(["TIME"])) else {
            panic!("expected array");
        };
        assert_eq!(parts.len(), 2);
        store.execute_command(&args(["SET", "a", "1"]));
        assert_eq!(store.key_count(), 1);
        store.execute_command(&args(["FLUSHALL"]));
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_stats() {
        let store = MemoryStore::new();
        store.execute_command(&args(["PING"]));
        store.execute_command(&args(["EVAL", "return 1", "0"]));
        let stats = store.stats();
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.script_runs, 1);
    }

    #[test]
    fn test_concurrent_scripts_are_atomic() {
        let store = MemoryStore::new();
        let script = "local v = tonumber(redis.call('get', 'n') or '0') redis.call('set', 'n', v + 1)";
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.execute_command(&args(["EVAL", script, "0"]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.execute_command(&args(["GET", "n"])), Reply::bulk("100"));
    }
}
