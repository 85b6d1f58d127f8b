//! Remote-object identification.
//!
//! A receiver is treated as a store client when enough of the methods called
//! on it are store primitives. Receivers are grouped by structural equality
//! of their expression, so `self.db` and `db` are distinct.

use crate::config::Options;
use crate::error::Result;
use crate::syntax::{parse_function, Arg, Expr, FunctionDef, Stmt, StmtKind};

/// Method names of store primitive operations, sorted for binary search.
pub const REMOTE_METHODS: &[&str] = &[
    "append", "blpop", "brpop", "brpoplpush", "decr", "delete", "execute", "exists", "expire",
    "expireat", "get", "getbit", "getset", "hdel", "hget", "hgetall", "hincrby", "hkeys",
    "hlen", "hmget", "hmset", "hset", "hsetnx", "hvals", "incr", "lindex", "linsert", "llen",
    "lpop", "lpush", "lpushnx", "lrange", "lrem", "lset", "ltrim", "mget", "move", "mset",
    "msetnx", "persist", "publish", "randomkey", "rename", "renamenx", "rpop", "rpoplpush",
    "rpush", "rpushx", "sadd", "scard", "sdiff", "sdiffstore", "set", "setbit", "setex",
    "setnx", "setrange", "sinter", "sinterstore", "sismember", "smembers", "smove", "sort",
    "spop", "srandmember", "srem", "strlen", "substr", "sunion", "sunionstore", "ttl", "zadd",
    "zcard", "zincrby", "zinterstore", "zrange", "zrangebyscore", "zrank", "zrem",
    "zremrangebyrank", "zrevrange", "zrevrangebyscore", "zrevrank", "zrevscore", "zunionstore",
];

/// Returns true if `name` is a recognized store primitive.
pub fn is_remote_method(name: &str) -> bool {
    REMOTE_METHODS.binary_search(&name).is_ok()
}

/// Call statistics for one receiver.
#[derive(Debug)]
struct ReceiverCalls {
    receiver: Expr,
    recognized: usize,
    total: usize,
}

/// Returns true if a receiver with these counts qualifies as a remote object.
pub fn accepts(recognized: usize, total: usize, options: &Options) -> bool {
    total > 0
        && recognized >= options.min_remote_calls
        && recognized as f64 / total as f64 >= options.min_remote_ratio
}

/// Returns the receivers of `def` that qualify as remote objects, in order
/// of first appearance.
pub fn identify(def: &FunctionDef, options: &Options) -> Vec<Expr> {
    let mut groups: Vec<ReceiverCalls> = Vec::new();
    visit_stmts(&def.body, &mut |expr| {
        let Expr::Call { func, .. } = expr else {
            return;
        };
        let Expr::Attribute { value, attr } = func.as_ref() else {
            return;
        };
        // Receivers that are not names or attribute chains are ignored.
        if value.dotted_path().is_none() {
            return;
        }

        let recognized = is_remote_method(attr);
        match groups.iter_mut().find(|g| g.receiver == **value) {
            Some(group) => {
                group.total += 1;
                group.recognized += usize::from(recognized);
            }
            None => groups.push(ReceiverCalls {
                receiver: value.as_ref().clone(),
                recognized: usize::from(recognized),
                total: 1,
            }),
        }
    });

    groups
        .into_iter()
        .filter(|g| accepts(g.recognized, g.total, options))
        .map(|g| {
            log::debug!(
                "`{}` identified as remote object in `{}` ({}/{} primitive calls)",
                g.receiver,
                def.name,
                g.recognized,
                g.total
            );
            g.receiver
        })
        .collect()
}

/// Classifies a set of named function sources.
///
/// Names starting with `_` are skipped. Returns the functions that have at
/// least one remote object, with their receivers.
pub fn identify_remote_functions<'a, I>(functions: I, options: &Options) -> Result<Vec<(String, Vec<Expr>)>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut found = Vec::new();
    for (name, source) in functions {
        if name.starts_with('_') {
            continue;
        }
        let def = parse_function(source)?;
        let receivers = identify(&def, options);
        if !receivers.is_empty() {
            found.push((name.to_string(), receivers));
        }
    }
    Ok(found)
}

/// Calls `f` on every expression in `stmts`, outermost first.
pub(crate) fn visit_stmts(stmts: &[Stmt], f: &mut impl FnMut(&Expr)) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, value } => {
                targets.iter().for_each(|t| visit_expr(t, f));
                visit_expr(value, f);
            }
            StmtKind::AugAssign { target, value, .. } => {
                visit_expr(target, f);
                visit_expr(value, f);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    visit_expr(value, f);
                }
            }
            StmtKind::If { test, body, orelse } => {
                visit_expr(test, f);
                visit_stmts(body, f);
                visit_stmts(orelse, f);
            }
            StmtKind::For { target, iter, body } => {
                visit_expr(target, f);
                visit_expr(iter, f);
                visit_stmts(body, f);
            }
            StmtKind::Expr(value) => visit_expr(value, f),
            StmtKind::Print(values) => values.iter().for_each(|v| visit_expr(v, f)),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }
}

pub(crate) fn visit_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::Name(_) | Expr::Literal(_) => {}
        Expr::List(items) | Expr::Tuple(items) => items.iter().for_each(|e| visit_expr(e, f)),
        Expr::Dict(pairs) => {
            for (key, value) in pairs {
                visit_expr(key, f);
                visit_expr(value, f);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            visit_expr(left, f);
            comparators.iter().for_each(|e| visit_expr(e, f));
        }
        Expr::BoolOp { values, .. } => values.iter().for_each(|e| visit_expr(e, f)),
        Expr::UnaryOp { operand, .. } => visit_expr(operand, f),
        Expr::BinOp { left, right, .. } => {
            visit_expr(left, f);
            visit_expr(right, f);
        }
        Expr::Call { func, args } => {
            visit_expr(func, f);
            for arg in args {
                match arg {
                    Arg::Positional(e) | Arg::Keyword(_, e) | Arg::Star(e) | Arg::DoubleStar(e) => {
                        visit_expr(e, f)
                    }
                }
            }
        }
        Expr::Attribute { value, .. } => visit_expr(value, f),
        Expr::Subscript { value, index } => {
            visit_expr(value, f);
            visit_expr(index, f);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                visit_expr(part, f);
            }
        }
    }
}
