//! The primitive command set over a [`KeyAccess`].

use super::keyspace::{Entry, KeyAccess};
use super::reply::Reply;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";

type CommandResult = std::result::Result<Reply, String>;

/// Runs one command. Errors come back as [`Reply::Error`].
pub fn dispatch<S: KeyAccess + ?Sized>(space: &mut S, args: &[Bytes]) -> Reply {
    let Some(name) = args.first() else {
        return Reply::error("ERR empty command");
    };
    let name = String::from_utf8_lossy(name).to_ascii_lowercase();
    let args = &args[1..];
    match run(space, &name, args) {
        Ok(reply) => reply,
        Err(msg) => Reply::Error(msg),
    }
}

fn run<S: KeyAccess + ?Sized>(space: &mut S, name: &str, args: &[Bytes]) -> CommandResult {
    match name {
        "ping" => {
            arity(name, args, 0, Some(1))?;
            Ok(match args.first() {
                Some(message) => Reply::Bulk(message.clone()),
                None => Reply::Status("PONG".to_string()),
            })
        }

        // Strings
        "get" => {
            arity(name, args, 1, Some(1))?;
            Ok(string(space, &args[0])?.map_or(Reply::Nil, Reply::Bulk))
        }
        "set" => {
            arity(name, args, 2, Some(3))?;
            let exists = space.entry(&args[0]).is_some();
            match args.get(2).map(|o| o.to_ascii_uppercase()) {
                Some(opt) if opt == b"NX" && exists => return Ok(Reply::Nil),
                Some(opt) if opt == b"XX" && !exists => return Ok(Reply::Nil),
                Some(opt) if opt != b"NX" && opt != b"XX" => return Err("ERR syntax error".into()),
                _ => {}
            }
            space.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Ok(Reply::ok())
        }
        "setnx" => {
            arity(name, args, 2, Some(2))?;
            if space.entry(&args[0]).is_some() {
                return Ok(Reply::Integer(0));
            }
            space.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Ok(Reply::Integer(1))
        }
        "getset" => {
            arity(name, args, 2, Some(2))?;
            let old = string(space, &args[0])?;
            space.insert(args[0].clone(), Entry::Str(args[1].clone()));
            Ok(old.map_or(Reply::Nil, Reply::Bulk))
        }
        "mget" => {
            arity(name, args, 1, None)?;
            Ok(Reply::Array(
                args.iter()
                    .map(|key| match space.entry(key) {
                        Some(Entry::Str(value)) => Reply::Bulk(value.clone()),
                        _ => Reply::Nil,
                    })
                    .collect(),
            ))
        }
        "mset" => {
            arity(name, args, 2, None)?;
            if args.len() % 2 != 0 {
                return Err(wrong_arity(name));
            }
            for pair in args.chunks(2) {
                space.insert(pair[0].clone(), Entry::Str(pair[1].clone()));
            }
            Ok(Reply::ok())
        }
        "incr" | "decr" => {
            arity(name, args, 1, Some(1))?;
            let delta = if name == "incr" { 1 } else { -1 };
            incr_by(space, &args[0], delta)
        }
        "incrby" | "decrby" => {
            arity(name, args, 2, Some(2))?;
            let delta = parse_int(&args[1])?;
            let delta = if name == "incrby" {
                delta
            } else {
                delta.checked_neg().ok_or_else(|| NOT_INTEGER.to_string())?
            };
            incr_by(space, &args[0], delta)
        }
        "append" => {
            arity(name, args, 2, Some(2))?;
            let mut value = string(space, &args[0])?.map(|b| b.to_vec()).unwrap_or_default();
            value.extend_from_slice(&args[1]);
            let len = value.len() as i64;
            space.insert(args[0].clone(), Entry::Str(Bytes::from(value)));
            Ok(Reply::Integer(len))
        }
        "strlen" => {
            arity(name, args, 1, Some(1))?;
            Ok(Reply::Integer(string(space, &args[0])?.map_or(0, |b| b.len() as i64)))
        }

        // Keys
        "del" => {
            arity(name, args, 1, None)?;
            Ok(Reply::Integer(args.iter().filter(|key| space.remove(key)).count() as i64))
        }
        "exists" => {
            arity(name, args, 1, None)?;
            Ok(Reply::Integer(
                args.iter().filter(|key| space.entry(key).is_some()).count() as i64,
            ))
        }

        // Hashes
        "hget" => {
            arity(name, args, 2, Some(2))?;
            Ok(hash(space, &args[0], false)?
                .and_then(|h| h.get(&args[1]).cloned())
                .map_or(Reply::Nil, Reply::Bulk))
        }
        "hset" | "hmset" => {
            arity(name, args, 3, None)?;
            if args.len() % 2 != 1 {
                return Err(wrong_arity(name));
            }
            let fields = hash(space, &args[0], true)?.ok_or_else(|| WRONGTYPE.to_string())?;
            let mut added = 0;
            for pair in args[1..].chunks(2) {
                if fields.insert(pair[0].clone(), pair[1].clone()).is_none() {
                    added += 1;
                }
            }
            Ok(if name == "hset" {
                Reply::Integer(added)
            } else {
                Reply::ok()
            })
        }
        "hsetnx" => {
            arity(name, args, 3, Some(3))?;
            let fields = hash(space, &args[0], true)?.ok_or_else(|| WRONGTYPE.to_string())?;
            if fields.contains_key(&args[1]) {
                return Ok(Reply::Integer(0));
            }
            fields.insert(args[1].clone(), args[2].clone());
            Ok(Reply::Integer(1))
        }
        "hmget" => {
            arity(name, args, 2, None)?;
            let fields = hash(space, &args[0], false)?;
            Ok(Reply::Array(
                args[1..]
                    .iter()
                    .map(|field| {
                        fields
                            .as_ref()
                            .and_then(|h| h.get(field).cloned())
                            .map_or(Reply::Nil, Reply::Bulk)
                    })
                    .collect(),
            ))
        }
        "hgetall" | "hkeys" | "hvals" => {
            arity(name, args, 1, Some(1))?;
            let Some(fields) = hash(space, &args[0], false)? else {
                return Ok(Reply::Array(Vec::new()));
            };
            let mut out = Vec::new();
            for (field, value) in fields.iter() {
                if name != "hvals" {
                    out.push(Reply::Bulk(field.clone()));
                }
                if name != "hkeys" {
                    out.push(Reply::Bulk(value.clone()));
                }
            }
            Ok(Reply::Array(out))
        }
        "hdel" => {
            arity(name, args, 2, None)?;
            let removed = match hash(space, &args[0], false)? {
                Some(fields) => args[1..].iter().filter(|f| fields.remove(*f).is_some()).count(),
                None => 0,
            };
            cleanup(space, &args[0]);
            Ok(Reply::Integer(removed as i64))
        }
        "hexists" => {
            arity(name, args, 2, Some(2))?;
            let exists = hash(space, &args[0], false)?.is_some_and(|h| h.contains_key(&args[1]));
            Ok(Reply::Integer(i64::from(exists)))
        }
        "hincrby" => {
            arity(name, args, 3, Some(3))?;
            let delta = parse_int(&args[2])?;
            let fields = hash(space, &args[0], true)?.ok_or_else(|| WRONGTYPE.to_string())?;
            let current = match fields.get(&args[1]) {
                Some(value) => parse_int(value).map_err(|_| "ERR hash value is not an integer".to_string())?,
                None => 0,
            };
            let next = current
                .checked_add(delta)
                .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
            fields.insert(args[1].clone(), Bytes::from(next.to_string()));
            Ok(Reply::Integer(next))
        }
        "hlen" => {
            arity(name, args, 1, Some(1))?;
            Ok(Reply::Integer(hash(space, &args[0], false)?.map_or(0, |h| h.len() as i64)))
        }

        // Lists
        "lpush" | "rpush" => {
            arity(name, args, 2, None)?;
            let items = list(space, &args[0], true)?.ok_or_else(|| WRONGTYPE.to_string())?;
            for value in &args[1..] {
                if name == "lpush" {
                    items.push_front(value.clone());
                } else {
                    items.push_back(value.clone());
                }
            }
            Ok(Reply::Integer(items.len() as i64))
        }
        "lpop" | "rpop" => {
            arity(name, args, 1, Some(1))?;
            let popped = match list(space, &args[0], false)? {
                Some(items) if name == "lpop" => items.pop_front(),
                Some(items) => items.pop_back(),
                None => None,
            };
            cleanup(space, &args[0]);
            Ok(popped.map_or(Reply::Nil, Reply::Bulk))
        }
        "llen" => {
            arity(name, args, 1, Some(1))?;
            Ok(Reply::Integer(list(space, &args[0], false)?.map_or(0, |l| l.len() as i64)))
        }
        "lrange" => {
            arity(name, args, 3, Some(3))?;
            let start = parse_int(&args[1])?;
            let stop = parse_int(&args[2])?;
            let Some(items) = list(space, &args[0], false)? else {
                return Ok(Reply::Array(Vec::new()));
            };
            let len = items.len() as i64;
            let start = if start < 0 { (len + start).max(0) } else { start };
            let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
            if start > stop || start >= len {
                return Ok(Reply::Array(Vec::new()));
            }
            Ok(Reply::Array(
                items
                    .iter()
                    .skip(start as usize)
                    .take((stop - start + 1) as usize)
                    .map(|v| Reply::Bulk(v.clone()))
                    .collect(),
            ))
        }
        "lindex" => {
            arity(name, args, 2, Some(2))?;
            let index = parse_int(&args[1])?;
            let value = list(space, &args[0], false)?
                .and_then(|items| list_position(items.len(), index).and_then(|i| items.get(i).cloned()));
            Ok(value.map_or(Reply::Nil, Reply::Bulk))
        }
        "lset" => {
            arity(name, args, 3, Some(3))?;
            let index = parse_int(&args[1])?;
            let items = list(space, &args[0], false)?.ok_or_else(|| "ERR no such key".to_string())?;
            let position = list_position(items.len(), index).ok_or_else(|| "ERR index out of range".to_string())?;
            items[position] = args[2].clone();
            Ok(Reply::ok())
        }

        // Sets
        "sadd" => {
            arity(name, args, 2, None)?;
            let members = set(space, &args[0], true)?.ok_or_else(|| WRONGTYPE.to_string())?;
            Ok(Reply::Integer(
                args[1..].iter().filter(|m| members.insert((*m).clone())).count() as i64,
            ))
        }
        "srem" => {
            arity(name, args, 2, None)?;
            let removed = match set(space, &args[0], false)? {
                Some(members) => args[1..].iter().filter(|m| members.remove(*m)).count(),
                None => 0,
            };
            cleanup(space, &args[0]);
            Ok(Reply::Integer(removed as i64))
        }
        "smembers" => {
            arity(name, args, 1, Some(1))?;
            Ok(Reply::Array(
                set(space, &args[0], false)?
                    .map(|members| members.iter().map(|m| Reply::Bulk(m.clone())).collect())
                    .unwrap_or_default(),
            ))
        }
        "sismember" => {
            arity(name, args, 2, Some(2))?;
            let member = set(space, &args[0], false)?.is_some_and(|s| s.contains(&args[1]));
            Ok(Reply::Integer(i64::from(member)))
        }
        "scard" => {
            arity(name, args, 1, Some(1))?;
            Ok(Reply::Integer(set(space, &args[0], false)?.map_or(0, |s| s.len() as i64)))
        }
        "srandmember" => {
            arity(name, args, 1, Some(1))?;
            Ok(set(space, &args[0], false)?
                .and_then(|s| s.iter().next().cloned())
                .map_or(Reply::Nil, Reply::Bulk))
        }
        "spop" => {
            arity(name, args, 1, Some(1))?;
            let popped = set(space, &args[0], false)?.and_then(|s| s.pop_first());
            cleanup(space, &args[0]);
            Ok(popped.map_or(Reply::Nil, Reply::Bulk))
        }

        _ => Err(format!("ERR unknown command '{}'", name)),
    }
}

fn wrong_arity(name: &str) -> String {
    format!("ERR wrong number of arguments for '{}' command", name)
}

fn arity(name: &str, args: &[Bytes], min: usize, max: Option<usize>) -> std::result::Result<(), String> {
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn parse_int(value: &[u8]) -> std::result::Result<i64, String> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NOT_INTEGER.to_string())
}

/// Zero-based position for a possibly negative list index.
fn list_position(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let position = if index < 0 { len + index } else { index };
    (0..len).contains(&position).then_some(position as usize)
}

fn string<S: KeyAccess + ?Sized>(space: &mut S, key: &[u8]) -> std::result::Result<Option<Bytes>, String> {
    match space.entry(key) {
        None => Ok(None),
        Some(Entry::Str(value)) => Ok(Some(value.clone())),
        Some(_) => Err(WRONGTYPE.to_string()),
    }
}

fn incr_by<S: KeyAccess + ?Sized>(space: &mut S, key: &Bytes, delta: i64) -> CommandResult {
    let current = match string(space, key)? {
        Some(value) => parse_int(&value)?,
        None => 0,
    };
    let next = current
        .checked_add(delta)
        .ok_or_else(|| "ERR increment or decrement would overflow".to_string())?;
    space.insert(key.clone(), Entry::Str(Bytes::from(next.to_string())));
    Ok(Reply::Integer(next))
}

/// Removes `key` if it holds an empty collection.
fn cleanup<S: KeyAccess + ?Sized>(space: &mut S, key: &[u8]) {
    if space.entry(key).is_some_and(|e| e.is_empty_collection()) {
        space.remove(key);
    }
}

macro_rules! typed_access {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// The collection at `key`, created empty when `create` is set.
        fn $name<'a, S: KeyAccess + ?Sized>(
            space: &'a mut S,
            key: &Bytes,
            create: bool,
        ) -> std::result::Result<Option<&'a mut $ty>, String> {
            if create && space.entry(key).is_none() {
                space.insert(key.clone(), Entry::$variant(Default::default()));
            }
            match space.entry(key) {
                None => Ok(None),
                Some(Entry::$variant(value)) => Ok(Some(value)),
                Some(_) => Err(WRONGTYPE.to_string()),
            }
        }
    };
}

typed_access!(hash, Hash, BTreeMap<Bytes, Bytes>);
typed_access!(list, List, VecDeque<Bytes>);
typed_access!(set, Set, BTreeSet<Bytes>);
