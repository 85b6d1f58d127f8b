//! Content-addressed script registration and invocation.
//!
//! Scripts are identified by the SHA-256 of their text, so registering the
//! same text twice yields the same id and loads it on each connection at
//! most once. Invocation sends `EVALSHA` and decodes the JSON envelope the
//! generated script returns. A store that has forgotten the script answers
//! `NOSCRIPT`, which triggers a single reload and retry.

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::marshal::encode_args;
use crate::store::Reply;
use crate::value::Value;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hex SHA-256 of a script's text.
pub fn script_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Identifier of a registered script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(String);

impl ScriptId {
    /// The id of `text`: its SHA-256 digest in lowercase hex.
    pub fn for_text(text: &str) -> Self {
        ScriptId(script_hash(text))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of invoking a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The function executed a `return`.
    Returned(Value),
    /// Execution fell off the end of the translated code. `live_out` holds
    /// the names a partial fragment hands back to the code after it.
    NoReturn {
        /// Live names by value, empty for a whole function.
        live_out: BTreeMap<String, Value>,
    },
}

impl Outcome {
    /// True if the function executed a `return`.
    pub fn returned(&self) -> bool {
        matches!(self, Outcome::Returned(_))
    }

    /// The returned value, `Value::None` when nothing was returned.
    pub fn value(&self) -> &Value {
        match self {
            Outcome::Returned(value) => value,
            Outcome::NoReturn { .. } => &Value::None,
        }
    }

    /// Consumes the outcome, yielding `Value::None` when nothing was returned.
    pub fn into_value(self) -> Value {
        match self {
            Outcome::Returned(value) => value,
            Outcome::NoReturn { .. } => Value::None,
        }
    }
}

/// Counters reported by [`ScriptRegistry::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Calls to [`ScriptRegistry::register`].
    pub registrations: u64,
    /// Registrations that found the script already loaded on the connection.
    pub cache_hits: u64,
    /// `SCRIPT LOAD` commands sent.
    pub loads: u64,
    /// Loads repeated after the store reported `NOSCRIPT`.
    pub reloads: u64,
    /// Scripts evaluated.
    pub invocations: u64,
}

#[derive(Default)]
struct RegistryState {
    scripts: HashMap<ScriptId, Arc<str>>,
    /// Handle the store returned when the script was loaded on a connection.
    loaded: HashMap<(ConnectionId, ScriptId), String>,
}

/// Registry of compiled scripts, shared by every proxy that uses it.
#[derive(Default)]
pub struct ScriptRegistry {
    state: Mutex<RegistryState>,
    registrations: AtomicU64,
    cache_hits: AtomicU64,
    loads: AtomicU64,
    reloads: AtomicU64,
    invocations: AtomicU64,
}

#[derive(Deserialize)]
struct Envelope {
    returned: Option<bool>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    live: Option<BTreeMap<String, Value>>,
}

impl ScriptRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `text` and makes sure `conn` has it loaded.
    pub fn register(&self, conn: &dyn Connection, text: &str) -> Result<ScriptId> {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        let id = ScriptId::for_text(text);
        let key = (conn.id(), id.clone());
        {
            let mut state = self.state.lock();
            if state.loaded.contains_key(&key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(id);
            }
            state
                .scripts
                .entry(id.clone())
                .or_insert_with(|| Arc::from(text));
        }
        self.load(conn, &id, text)?;
        Ok(id)
    }

    /// Runs a registered script with `args` and decodes its envelope.
    pub fn invoke(&self, conn: &dyn Connection, id: &ScriptId, args: &[Value]) -> Result<Outcome> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let encoded = encode_args(args)?;
        let handle = self.handle(conn, id)?;

        let reply = match self.evalsha(conn, &handle, &encoded)? {
            Reply::Error(msg) if msg.starts_with("NOSCRIPT") => {
                log::warn!("script {} missing on connection {}, reloading", id, conn.id());
                self.reloads.fetch_add(1, Ordering::Relaxed);
                let text = self
                    .script_text(id)
                    .ok_or_else(|| Error::invalid_argument(format!("unknown script {}", id)))?;
                let handle = self.load(conn, id, &text)?;
                self.evalsha(conn, &handle, &encoded)?
            }
            reply => reply,
        };
        decode_reply(reply)
    }

    /// Text of a registered script.
    pub fn script_text(&self, id: &ScriptId) -> Option<Arc<str>> {
        self.state.lock().scripts.get(id).cloned()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registrations: self.registrations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
        }
    }

    /// Store handle of `id` on `conn`, loading the script if needed.
    fn handle(&self, conn: &dyn Connection, id: &ScriptId) -> Result<String> {
        let (handle, text) = {
            let state = self.state.lock();
            let handle = state.loaded.get(&(conn.id(), id.clone())).cloned();
            (handle, state.scripts.get(id).cloned())
        };
        match (handle, text) {
            (Some(handle), _) => Ok(handle),
            (None, Some(text)) => self.load(conn, id, &text),
            (None, None) => Err(Error::invalid_argument(format!("unknown script {}", id))),
        }
    }

    fn load(&self, conn: &dyn Connection, id: &ScriptId, text: &str) -> Result<String> {
        let command = [
            Bytes::from_static(b"SCRIPT"),
            Bytes::from_static(b"LOAD"),
            Bytes::copy_from_slice(text.as_bytes()),
        ];
        let reply = if conn.is_pipelined() {
            conn.immediate_query(&command)?
        } else {
            conn.query(&command)?
        };
        let handle = match reply {
            Reply::Error(msg) => return Err(Error::remote(msg)),
            reply => reply
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::decoding(format!("unexpected reply to SCRIPT LOAD: {}", reply)))?,
        };
        self.loads.fetch_add(1, Ordering::Relaxed);
        log::debug!("loaded script {} on connection {}", id, conn.id());
        self.state
            .lock()
            .loaded
            .insert((conn.id(), id.clone()), handle.clone());
        Ok(handle)
    }

    fn evalsha(&self, conn: &dyn Connection, handle: &str, args: &[Bytes]) -> Result<Reply> {
        let mut command = Vec::with_capacity(args.len() + 3);
        command.push(Bytes::from_static(b"EVALSHA"));
        command.push(Bytes::copy_from_slice(handle.as_bytes()));
        command.push(Bytes::from_static(b"0"));
        command.extend_from_slice(args);
        if conn.is_pipelined() {
            conn.immediate_query(&command)
        } else {
            conn.query(&command)
        }
    }
}

/// Decodes the reply of a generated script.
pub fn decode_reply(reply: Reply) -> Result<Outcome> {
    match reply {
        Reply::Nil => Ok(Outcome::NoReturn {
            live_out: BTreeMap::new(),
        }),
        Reply::Bulk(data) => {
            let envelope: Envelope = serde_json::from_slice(&data)
                .map_err(|e| Error::decoding(format!("malformed envelope: {}", e)))?;
            let returned = envelope
                .returned
                .ok_or_else(|| Error::decoding("envelope has no `returned` flag"))?;
            if returned {
                Ok(Outcome::Returned(envelope.value.strip_markers()))
            } else {
                let live_out = envelope
                    .live
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(k, _)| k != crate::value::DICT_MARKER)
                    .map(|(k, v)| (k, v.strip_markers()))
                    .collect();
                Ok(Outcome::NoReturn { live_out })
            }
        }
        Reply::Error(msg) => Err(Error::remote(msg)),
        other => Err(Error::decoding(format!("unexpected reply: {}", other))),
    }
}
