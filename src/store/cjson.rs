//! The `cjson` library exposed to scripts.
//!
//! Tables carrying the `__DICT` marker encode as JSON objects (without the
//! marker), as do tables with keys that are not positive integers. Other
//! tables encode as arrays, with `null` filling holes. Decoded objects get
//! the marker so scripts can tell them from sequences.

use crate::value::DICT_MARKER;
use mlua::{Lua, Table, Value as LuaValue};
use serde_json::{Map, Number, Value as Json};

const MAX_DEPTH: usize = 1000;

/// Builds the `cjson` table.
pub fn create_table(lua: &Lua) -> mlua::Result<Table<'_>> {
    let table = lua.create_table()?;

    let encode = lua.create_function(|_, value: LuaValue<'_>| {
        let json = to_json(&value, 0)?;
        serde_json::to_string(&json).map_err(mlua::Error::external)
    })?;
    table.set("encode", encode)?;

    let decode = lua.create_function(|lua, text: mlua::String<'_>| {
        let json: Json = serde_json::from_slice(text.as_bytes()).map_err(mlua::Error::external)?;
        from_json(lua, &json)
    })?;
    table.set("decode", decode)?;

    Ok(table)
}

fn cannot_serialise(what: &str) -> mlua::Error {
    mlua::Error::RuntimeError(format!("Cannot serialise {}", what))
}

/// Converts a Lua value to JSON.
pub fn to_json(value: &LuaValue<'_>, depth: usize) -> mlua::Result<Json> {
    if depth > MAX_DEPTH {
        return Err(cannot_serialise("table: excessive nesting"));
    }
    Ok(match value {
        LuaValue::Nil => Json::Null,
        LuaValue::Boolean(b) => Json::Bool(*b),
        LuaValue::Integer(i) => Json::Number(Number::from(*i)),
        LuaValue::Number(x) => number(*x)?,
        LuaValue::String(s) => Json::String(s.to_string_lossy().into_owned()),
        LuaValue::Table(table) => table_to_json(table, depth)?,
        other => return Err(cannot_serialise(other.type_name())),
    })
}

fn number(x: f64) -> mlua::Result<Json> {
    if x.fract() == 0.0 && x.abs() < 9.007_199_254_740_992e15 {
        return Ok(Json::Number(Number::from(x as i64)));
    }
    Number::from_f64(x)
        .map(Json::Number)
        .ok_or_else(|| cannot_serialise("number: must not be NaN or Inf"))
}

fn table_to_json(table: &Table<'_>, depth: usize) -> mlua::Result<Json> {
    let mut entries: Vec<(LuaValue<'_>, LuaValue<'_>)> = Vec::new();
    for pair in table.clone().pairs::<LuaValue<'_>, LuaValue<'_>>() {
        entries.push(pair?);
    }

    let marked = table.contains_key(DICT_MARKER)?;
    let max_index = entries.iter().try_fold(0i64, |max, (key, _)| match key {
        LuaValue::Integer(i) if *i > 0 => Some(max.max(*i)),
        _ => None,
    });

    match max_index {
        Some(max) if !marked => {
            let mut items = vec![Json::Null; max as usize];
            for (key, value) in &entries {
                if let LuaValue::Integer(i) = key {
                    items[*i as usize - 1] = to_json(value, depth + 1)?;
                }
            }
            Ok(Json::Array(items))
        }
        _ => {
            let mut object = Map::new();
            for (key, value) in &entries {
                let key = match key {
                    LuaValue::String(s) => s.to_string_lossy().into_owned(),
                    LuaValue::Integer(i) => i.to_string(),
                    LuaValue::Number(x) => x.to_string(),
                    other => return Err(cannot_serialise(&format!("{} key", other.type_name()))),
                };
                if key == DICT_MARKER {
                    continue;
                }
                object.insert(key, to_json(value, depth + 1)?);
            }
            Ok(Json::Object(object))
        }
    }
}

/// Converts JSON to a Lua value. `null` becomes `nil`.
pub fn from_json<'lua>(lua: &'lua Lua, json: &Json) -> mlua::Result<LuaValue<'lua>> {
    Ok(match json {
        Json::Null => LuaValue::Nil,
        Json::Bool(b) => LuaValue::Boolean(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => LuaValue::String(lua.create_string(s)?),
        Json::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, from_json(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Json::Object(map) => {
            let table = lua.create_table()?;
            table.raw_set(DICT_MARKER, true)?;
            for (key, value) in map {
                table.raw_set(key.as_str(), from_json(lua, value)?)?;
            }
            LuaValue::Table(table)
        }
    })
}
